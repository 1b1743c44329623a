//! Tool-catalog projection of the operation table
//!
//! Every operation is also a callable tool described by a JSON schema.
//! Calls go through the same dispatcher as the HTTP surface.

use crate::dispatch::Dispatcher;
use crate::models::{CallEnvelope, CallOrigin};
use crate::service::{OperationDescriptor, OperationRegistry, ServiceDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Required parameter names as listed in the schema
    pub fn required(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Result of a tool invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

fn input_schema(op: &OperationDescriptor) -> Value {
    let mut properties = Map::new();
    for param in &op.params {
        let mut property = Map::new();
        property.insert("type".into(), json!(param.param_type.json_type()));
        property.insert("description".into(), json!(param.description));
        if let Some(default) = param.default.as_ref().filter(|d| !d.is_null()) {
            property.insert("default".into(), default.clone());
        }
        properties.insert(param.name.clone(), Value::Object(property));
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": op.required_params(),
    })
}

/// Tool definitions of one service, in declaration order
pub fn project(service: &ServiceDescriptor) -> Vec<ToolDefinition> {
    service
        .operations()
        .iter()
        .map(|op| ToolDefinition {
            name: op.name.clone(),
            description: op.description.clone(),
            input_schema: input_schema(op),
        })
        .collect()
}

pub fn project_all(registry: &OperationRegistry) -> Vec<ToolDefinition> {
    registry.services().iter().flat_map(project).collect()
}

/// Tool catalog over a dispatcher
pub struct ToolCatalog {
    dispatcher: Dispatcher,
    tools: Vec<ToolDefinition>,
}

impl ToolCatalog {
    pub fn new(dispatcher: Dispatcher) -> Self {
        let tools = project_all(dispatcher.registry());
        info!(tools = tools.len(), "Tool catalog ready");
        Self { dispatcher, tools }
    }

    pub fn list_tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Invoke a tool. Failures come back as an unsuccessful output.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ToolOutput {
        debug!(tool = %name, "Calling tool");
        let outcome = match CallEnvelope::from_value(name, arguments, CallOrigin::Tool) {
            Ok(envelope) => self.dispatcher.dispatch(envelope).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(data) => ToolOutput {
                success: true,
                data,
                error: None,
            },
            Err(e) => ToolOutput {
                success: false,
                data: Value::Null,
                error: Some(e.render(CallOrigin::Tool)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{CallArgs, OperationFn, ParamType, ParameterSpec};
    use std::sync::Arc;

    fn catalog() -> ToolCatalog {
        let echo: OperationFn =
            Arc::new(|args: CallArgs| Box::pin(async move { Ok(args.to_value()) }));
        let service = ServiceDescriptor::builder("market")
            .operation(
                OperationDescriptor::new("get_x", "Fetch x", echo)
                    .param(ParameterSpec::required("code", ParamType::String, "Code"))
                    .param(ParameterSpec::optional("limit", ParamType::Integer, 10, "Limit"))
                    .param(ParameterSpec::optional("adjust", "Optional[str]", Value::Null, "")),
            )
            .build()
            .unwrap();
        let mut registry = OperationRegistry::new();
        registry.register(service).unwrap();
        ToolCatalog::new(Dispatcher::new(Arc::new(registry)))
    }

    #[test]
    fn test_get_x_schema() {
        let catalog = catalog();
        let tool = catalog.get("get_x").unwrap();
        assert_eq!(tool.required(), vec!["code"]);
        assert_eq!(
            tool.input_schema,
            json!({
                "type": "object",
                "properties": {
                    "code": {"type": "string", "description": "Code"},
                    "limit": {"type": "integer", "description": "Limit", "default": 10},
                    "adjust": {"type": "string", "description": ""}
                },
                "required": ["code"]
            })
        );

        let keys: Vec<&String> = tool.input_schema["properties"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(keys, vec!["code", "limit", "adjust"]);
    }

    #[tokio::test]
    async fn test_call_tool() {
        let catalog = catalog();
        let out = catalog.call_tool("get_x", json!({"code": "000001.SZ"})).await;
        assert!(out.success);
        assert_eq!(out.data, json!({"code": "000001.SZ", "limit": 10, "adjust": null}));

        let out = catalog.call_tool("get_x", json!({})).await;
        assert!(!out.success);
        assert_eq!(
            out.error.as_deref(),
            Some("Error executing tool get_x: missing required argument(s): code")
        );

        let out = catalog.call_tool("get_y", json!({})).await;
        assert!(!out.success);
        assert_eq!(out.data, Value::Null);
    }

    #[tokio::test]
    async fn test_call_tool_rejects_non_object_arguments() {
        let catalog = catalog();
        for arguments in [json!([5]), json!("limit=5"), json!(5)] {
            let out = catalog.call_tool("get_x", arguments).await;
            assert!(!out.success);
            assert_eq!(out.data, Value::Null);
            assert!(out
                .error
                .unwrap()
                .starts_with("Error executing tool get_x: invalid argument: arguments must be a JSON object"));
        }

        let out = catalog.call_tool("get_x", Value::Null).await;
        assert!(!out.success);
        assert_eq!(
            out.error.as_deref(),
            Some("Error executing tool get_x: missing required argument(s): code")
        );
    }
}
