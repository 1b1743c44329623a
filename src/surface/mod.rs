//! Access surfaces generated from the operation table
//!
//! The HTTP surface and the tool catalog are projections of the same
//! registry. `check_equivalence` verifies they expose the same operations
//! with the same required parameters.

use crate::error::HubError;
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};

pub mod http;
pub mod tools;

pub use http::{ApiResponse, HttpOperation, RequestShape};
pub use tools::{ToolCatalog, ToolDefinition, ToolOutput};

/// Fails with every discrepancy between the two projections
pub fn check_equivalence(http: &[HttpOperation], tools: &[ToolDefinition]) -> Result<()> {
    let http_ops: BTreeMap<&str, BTreeSet<&str>> = http
        .iter()
        .map(|op| {
            (
                op.operation.as_str(),
                op.request.required_fields().into_iter().collect(),
            )
        })
        .collect();
    let tool_ops: BTreeMap<&str, BTreeSet<&str>> = tools
        .iter()
        .map(|tool| (tool.name.as_str(), tool.required().into_iter().collect()))
        .collect();

    let mut problems = Vec::new();
    if http_ops.len() != http.len() {
        problems.push("HTTP surface lists an operation twice".to_string());
    }
    if tool_ops.len() != tools.len() {
        problems.push("tool catalog lists a tool twice".to_string());
    }

    for (name, required) in &http_ops {
        match tool_ops.get(name) {
            None => problems.push(format!("{} has no tool", name)),
            Some(tool_required) if tool_required != required => problems.push(format!(
                "{}: HTTP requires {:?}, tool requires {:?}",
                name, required, tool_required
            )),
            Some(_) => {}
        }
    }
    for name in tool_ops.keys() {
        if !http_ops.contains_key(name) {
            problems.push(format!("{} has no HTTP route", name));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(HubError::InvalidDescriptor(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{
        CallArgs, OperationDescriptor, OperationFn, OperationRegistry, ParamType, ParameterSpec,
        ServiceDescriptor,
    };
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn noop() -> OperationFn {
        Arc::new(|_: CallArgs| Box::pin(async { Ok(json!(null)) }))
    }

    fn param_type() -> impl Strategy<Value = ParamType> {
        prop_oneof![
            Just(ParamType::String),
            Just(ParamType::Integer),
            Just(ParamType::Number),
            Just(ParamType::Boolean),
            Just(ParamType::Array),
            Just(ParamType::Object),
        ]
    }

    /// Services with unique operation names and unique parameter names per operation
    fn registry_strategy() -> impl Strategy<Value = OperationRegistry> {
        let op = prop::collection::vec((param_type(), any::<bool>()), 0..6);
        prop::collection::vec(prop::collection::vec(op, 1..5), 1..4).prop_map(|services| {
            let mut registry = OperationRegistry::new();
            for (s, ops) in services.into_iter().enumerate() {
                let mut builder = ServiceDescriptor::builder(format!("svc{}", s));
                for (o, params) in ops.into_iter().enumerate() {
                    let mut op = OperationDescriptor::new(format!("op_{}_{}", s, o), "", noop());
                    for (p, (ty, required)) in params.into_iter().enumerate() {
                        let name = format!("p{}", p);
                        op = op.param(if required {
                            ParameterSpec::required(name, ty, "")
                        } else {
                            ParameterSpec::optional(name, ty, Value::Null, "")
                        });
                    }
                    builder = builder.operation(op);
                }
                if let Ok(descriptor) = builder.build() {
                    let _ = registry.register(descriptor);
                }
            }
            registry
        })
    }

    proptest! {
        #[test]
        fn prop_projections_are_equivalent(registry in registry_strategy()) {
            let http_ops = http::project_all(&registry);
            let tool_defs = tools::project_all(&registry);

            prop_assert_eq!(http_ops.len(), registry.len());
            prop_assert_eq!(tool_defs.len(), registry.len());
            prop_assert!(check_equivalence(&http_ops, &tool_defs).is_ok());

            for (h, t) in http_ops.iter().zip(&tool_defs) {
                prop_assert_eq!(&h.operation, &t.name);
                prop_assert_eq!(h.request.required_fields(), t.required());
            }
        }
    }

    #[test]
    fn test_detects_drift() {
        let service = ServiceDescriptor::builder("market")
            .operation(
                OperationDescriptor::new("get_x", "", noop())
                    .param(ParameterSpec::required("code", ParamType::String, ""))
                    .param(ParameterSpec::optional("limit", ParamType::Integer, 10, "")),
            )
            .build()
            .unwrap();
        let http_ops = http::project(&service);
        let mut tool_defs = tools::project(&service);
        assert!(check_equivalence(&http_ops, &tool_defs).is_ok());

        tool_defs[0].input_schema["required"] = json!(["code", "limit"]);
        let err = check_equivalence(&http_ops, &tool_defs).unwrap_err();
        assert!(err.to_string().contains("get_x"));

        assert!(check_equivalence(&http_ops, &[]).is_err());
    }
}
