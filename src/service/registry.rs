//! Registry of every declared operation across services

use crate::error::HubError;
use crate::service::descriptor::{OperationDescriptor, ServiceDescriptor};
use crate::service::QueryService;
use crate::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Operation names are unique across all services so that a tool name
/// alone identifies the operation.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    services: Vec<ServiceDescriptor>,
    by_operation: HashMap<String, (usize, usize)>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. On conflict the registry is left unchanged.
    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<()> {
        if self.services.iter().any(|s| s.service() == descriptor.service()) {
            return Err(HubError::DuplicateName(descriptor.service().to_string()));
        }
        for op in descriptor.operations() {
            if self.by_operation.contains_key(&op.name) {
                return Err(HubError::DuplicateName(op.name.clone()));
            }
        }

        let service_index = self.services.len();
        for (op_index, op) in descriptor.operations().iter().enumerate() {
            self.by_operation
                .insert(op.name.clone(), (service_index, op_index));
        }

        info!(
            service = %descriptor.service(),
            operations = descriptor.len(),
            "Registered query service"
        );
        self.services.push(descriptor);
        Ok(())
    }

    pub fn register_service<S: QueryService>(&mut self, service: Arc<S>) -> Result<()> {
        let descriptor = service.collect()?;
        self.register(descriptor)
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// All operations, services in registration order
    pub fn operations(&self) -> impl Iterator<Item = (&ServiceDescriptor, &OperationDescriptor)> {
        self.services
            .iter()
            .flat_map(|s| s.operations().iter().map(move |op| (s, op)))
    }

    pub fn lookup(&self, operation: &str) -> Option<(&ServiceDescriptor, &OperationDescriptor)> {
        let &(s, o) = self.by_operation.get(operation)?;
        let service = &self.services[s];
        Some((service, &service.operations()[o]))
    }

    pub fn len(&self) -> usize {
        self.by_operation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_operation.is_empty()
    }

    /// Combined fingerprint of every registered declaration
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for service in &self.services {
            service.write_canonical(&mut hasher);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{CallArgs, OperationFn, ParameterSpec};
    use serde_json::json;

    fn noop() -> OperationFn {
        Arc::new(|_: CallArgs| Box::pin(async { Ok(json!(null)) }))
    }

    fn service(name: &str, ops: &[&str]) -> ServiceDescriptor {
        ops.iter()
            .fold(ServiceDescriptor::builder(name), |b, op| {
                b.operation(
                    OperationDescriptor::new(*op, "", noop())
                        .param(ParameterSpec::required("code", "str", "")),
                )
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_lookup_across_services() {
        let mut registry = OperationRegistry::new();
        registry.register(service("a", &["get_one", "get_two"])).unwrap();
        registry.register(service("b", &["get_three"])).unwrap();

        assert_eq!(registry.len(), 3);
        let (svc, op) = registry.lookup("get_three").unwrap();
        assert_eq!(svc.service(), "b");
        assert_eq!(op.name, "get_three");
        assert!(registry.lookup("get_four").is_none());

        let names: Vec<&str> = registry.operations().map(|(_, op)| op.name.as_str()).collect();
        assert_eq!(names, vec!["get_one", "get_two", "get_three"]);
    }

    #[test]
    fn test_operation_names_unique_across_services() {
        let mut registry = OperationRegistry::new();
        registry.register(service("a", &["get_one"])).unwrap();
        let before = registry.fingerprint();

        let err = registry.register(service("b", &["get_two", "get_one"])).unwrap_err();
        assert!(matches!(err, HubError::DuplicateName(name) if name == "get_one"));
        assert!(registry.lookup("get_two").is_none());
        assert_eq!(registry.services().len(), 1);
        assert_eq!(registry.fingerprint(), before);
    }

    #[test]
    fn test_duplicate_service_name() {
        let mut registry = OperationRegistry::new();
        registry.register(service("a", &["get_one"])).unwrap();
        assert!(registry.register(service("a", &["get_two"])).is_err());
    }
}
