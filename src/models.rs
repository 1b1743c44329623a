//! Core data models for the data hub

use crate::dispatch::DispatchError;
use crate::error::{HubError, Result};
use crate::plugin::lifecycle::LifecycleState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PluginCategory {
    Reference,
    Fundamental,
    Index,
    Market,
    HkStock,
    Fund,
    Macro,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PluginRole {
    Primary,
    Auxiliary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Success,
    NoData,
    Failed,
}

/// Which surface a call arrived through
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallOrigin {
    Http,
    Tool,
}

//
// ================= Plugin =================
//

/// Static metadata of one plugin, fixed at registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub category: PluginCategory,
    pub role: PluginRole,
    /// Calls per minute against the external source
    pub rate_limit: u32,
    pub dependencies: Vec<String>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, category: PluginCategory, role: PluginRole) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            category,
            role,
            rate_limit: 60,
            dependencies: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Add a dependency, keeping first-declared order and dropping repeats
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Reject descriptors that can never run
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HubError::InvalidDescriptor(
                "plugin name must not be empty".to_string(),
            ));
        }
        if self.rate_limit == 0 {
            return Err(HubError::InvalidDescriptor(format!(
                "plugin {} declares rate_limit 0; calls per minute must be positive",
                self.name
            )));
        }
        if self.dependencies.iter().any(|d| d == &self.name) {
            return Err(HubError::CyclicDependency(vec![
                self.name.clone(),
                self.name.clone(),
            ]));
        }
        Ok(())
    }
}

//
// ================= Run Outcomes =================
//

/// Terminal value of one plugin run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadOutcome {
    pub status: LoadStatus,
    pub loaded_records: usize,
    pub error: Option<String>,
}

impl LoadOutcome {
    pub fn success(loaded_records: usize) -> Self {
        Self {
            status: LoadStatus::Success,
            loaded_records,
            error: None,
        }
    }

    pub fn no_data() -> Self {
        Self {
            status: LoadStatus::NoData,
            loaded_records: 0,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: LoadStatus::Failed,
            loaded_records: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LoadStatus::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub plugin: String,
    pub outcome: LoadOutcome,
    pub final_state: LifecycleState,
    pub elapsed_ms: u64,
    /// Attempts spent inside the extraction retry loop
    pub attempts: u32,
}

//
// ================= Calls =================
//

/// Surface-agnostic call into the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub operation: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    pub origin: CallOrigin,
}

impl CallEnvelope {
    pub fn new(operation: impl Into<String>, arguments: Map<String, Value>, origin: CallOrigin) -> Self {
        Self {
            operation: operation.into(),
            arguments,
            origin,
        }
    }

    /// Build from an arbitrary JSON value. Null means no arguments; any other
    /// non-object payload is rejected.
    pub fn from_value(
        operation: impl Into<String>,
        arguments: Value,
        origin: CallOrigin,
    ) -> std::result::Result<Self, DispatchError> {
        let operation = operation.into();
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(DispatchError::InvalidArgument {
                    operation,
                    reason: format!("arguments must be a JSON object, got {}", json_kind(&other)),
                })
            }
        };
        Ok(Self::new(operation, arguments, origin))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for CallOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallOrigin::Http => "http",
            CallOrigin::Tool => "tool",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStatus::Success => "success",
            LoadStatus::NoData => "no_data",
            LoadStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_are_deduplicated_in_order() {
        let desc = PluginDescriptor::new("c", PluginCategory::Market, PluginRole::Primary)
            .depends_on("a")
            .depends_on("b")
            .depends_on("a");
        assert_eq!(desc.dependencies, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let desc = PluginDescriptor::new("x", PluginCategory::Index, PluginRole::Auxiliary)
            .with_rate_limit(0);
        assert!(matches!(desc.validate(), Err(HubError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let desc = PluginDescriptor::new("x", PluginCategory::Index, PluginRole::Primary)
            .depends_on("x");
        assert!(matches!(desc.validate(), Err(HubError::CyclicDependency(_))));
    }

    #[test]
    fn test_failed_outcome_carries_error() {
        let ok = LoadOutcome::success(3);
        assert!(ok.error.is_none());
        assert_eq!(ok.loaded_records, 3);

        let failed = LoadOutcome::failed("boom");
        assert_eq!(failed.status, LoadStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let v = serde_json::to_value(PluginCategory::HkStock).unwrap();
        assert_eq!(v, serde_json::json!("hk_stock"));
    }

    #[test]
    fn test_envelope_from_null_has_no_arguments() {
        let env = CallEnvelope::from_value("op", Value::Null, CallOrigin::Tool).unwrap();
        assert!(env.arguments.is_empty());
    }

    #[test]
    fn test_envelope_rejects_non_object_arguments() {
        let err = CallEnvelope::from_value("op", serde_json::json!([1, 2]), CallOrigin::Tool)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        assert_eq!(err.to_string(), "invalid argument: arguments must be a JSON object, got array");

        let err = CallEnvelope::from_value("op", serde_json::json!("limit=5"), CallOrigin::Http)
            .unwrap_err();
        assert_eq!(err.operation(), "op");
    }
}
