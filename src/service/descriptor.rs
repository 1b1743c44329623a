//! Declarative operation metadata
//!
//! A service declares its operations once, as data. Both access surfaces
//! and the dispatcher read the same table, so there is nothing to keep in
//! sync by hand.

use crate::error::HubError;
use crate::service::args::CallArgs;
use crate::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;

/// Value type of a declared parameter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// JSON-schema type keyword
    pub fn json_type(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Map a free-form type hint (`"Optional[int]"`, `"float"`, `"List[str]"`)
    /// onto a parameter type. Unrecognised hints are strings.
    pub fn from_hint(hint: &str) -> Self {
        let lowered = hint.trim().to_ascii_lowercase();

        // Optional[T] / T | None only affect requiredness
        let unwrapped = lowered
            .strip_prefix("optional[")
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(&lowered);
        let head = unwrapped
            .split('|')
            .map(str::trim)
            .find(|part| *part != "none")
            .unwrap_or(unwrapped);

        let base = head.split('[').next().unwrap_or_default().trim();
        match base {
            "int" | "integer" | "i32" | "i64" | "u32" | "u64" | "usize" => ParamType::Integer,
            "float" | "number" | "decimal" | "f32" | "f64" => ParamType::Number,
            "bool" | "boolean" => ParamType::Boolean,
            "list" | "sequence" | "tuple" | "set" | "array" | "vec" => ParamType::Array,
            "dict" | "map" | "mapping" | "object" | "hashmap" => ParamType::Object,
            _ => ParamType::String,
        }
    }

    /// Whether a non-null JSON value is acceptable for this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().map_or(false, |f| f.is_finite() && f.fract() == 0.0)
            }
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

impl From<&str> for ParamType {
    fn from(hint: &str) -> Self {
        ParamType::from_hint(hint)
    }
}

/// One declared parameter. `default` is present exactly when the
/// parameter is optional; a `null` default means "no value".
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub description: String,
}

impl ParameterSpec {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<ParamType>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: true,
            default: None,
            description: description.into(),
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<ParamType>,
        default: impl Into<Value>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: false,
            default: Some(default.into()),
            description: description.into(),
        }
    }
}

/// Bound handler behind an operation
pub type OperationFn = Arc<dyn Fn(CallArgs) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Bind an async method of `service` as an operation handler
pub fn bind<S, F, Fut>(service: Arc<S>, f: F) -> OperationFn
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, CallArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |args: CallArgs| -> BoxFuture<'static, Result<Value>> {
        Box::pin(f(service.clone(), args))
    })
}

/// One callable operation: name, description, ordered parameters and handler
#[derive(Clone)]
pub struct OperationDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParameterSpec>,
    pub handler: OperationFn,
}

impl OperationDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, handler: OperationFn) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            handler,
        }
    }

    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn get_param(&self, name: &str) -> Option<&ParameterSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Required parameter names in declaration order
    pub fn required_params(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }
}

impl std::fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("params", &self.params)
            .finish()
    }
}

/// All operations of one service, in declaration order
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    service: String,
    operations: Vec<OperationDescriptor>,
    index: HashMap<String, usize>,
}

impl ServiceDescriptor {
    pub fn builder(service: impl Into<String>) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            service: service.into(),
            operations: Vec::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn operations(&self) -> &[OperationDescriptor] {
        &self.operations
    }

    pub fn get(&self, operation: &str) -> Option<&OperationDescriptor> {
        self.index.get(operation).map(|&i| &self.operations[i])
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// SHA-256 over the declaration (names, descriptions, parameters).
    /// Handlers do not take part.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        self.write_canonical(&mut hasher);
        hex::encode(hasher.finalize())
    }

    pub(crate) fn write_canonical(&self, hasher: &mut Sha256) {
        let canonical = serde_json::json!({
            "service": self.service,
            "operations": self
                .operations
                .iter()
                .map(|op| serde_json::json!({
                    "name": op.name,
                    "description": op.description,
                    "params": op.params,
                }))
                .collect::<Vec<_>>(),
        });

        // Writing into a hasher cannot fail
        let _ = serde_json::to_writer(&mut HashWriter(hasher), &canonical);
    }
}

pub struct ServiceDescriptorBuilder {
    service: String,
    operations: Vec<OperationDescriptor>,
}

impl ServiceDescriptorBuilder {
    pub fn operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn build(self) -> Result<ServiceDescriptor> {
        if self.service.trim().is_empty() {
            return Err(HubError::InvalidDescriptor("service name is empty".into()));
        }

        let mut index = HashMap::new();
        for (i, op) in self.operations.iter().enumerate() {
            if op.name.trim().is_empty() {
                return Err(HubError::InvalidDescriptor(format!(
                    "{}: operation name is empty",
                    self.service
                )));
            }
            if index.insert(op.name.clone(), i).is_some() {
                return Err(HubError::DuplicateName(format!("{}.{}", self.service, op.name)));
            }

            let mut seen = HashSet::new();
            for param in &op.params {
                if !seen.insert(param.name.as_str()) {
                    return Err(HubError::InvalidDescriptor(format!(
                        "{}.{}: parameter '{}' declared twice",
                        self.service, op.name, param.name
                    )));
                }
                if param.required == param.default.is_some() {
                    return Err(HubError::InvalidDescriptor(format!(
                        "{}.{}: parameter '{}' must be either required or carry a default",
                        self.service, op.name, param.name
                    )));
                }
            }
        }

        Ok(ServiceDescriptor {
            service: self.service,
            operations: self.operations,
            index,
        })
    }
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a>(&'a mut Sha256);

impl<'a> Write for HashWriter<'a> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
