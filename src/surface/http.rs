//! HTTP projection of the operation table
//!
//! Each operation becomes `POST /<service>/<operation>` with a JSON body
//! shaped after its parameters. Routing itself lives in `crate::api`.

use crate::service::{OperationDescriptor, OperationRegistry, ParamType, ServiceDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One body field of a generated request shape
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestShape {
    pub fields: Vec<RequestField>,
}

impl RequestShape {
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HttpOperation {
    pub service: String,
    pub operation: String,
    pub method: &'static str,
    pub path: String,
    pub description: String,
    pub request: RequestShape,
}

/// Uniform response envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    pub status: ResponseStatus,
    pub data: Option<Value>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: serde_json::to_value(data).ok(),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            message: Some(message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

pub fn route_path(service: &str, operation: &str) -> String {
    format!("/{}/{}", service, operation)
}

fn project_operation(service: &str, op: &OperationDescriptor) -> HttpOperation {
    let fields = op
        .params
        .iter()
        .map(|p| RequestField {
            name: p.name.clone(),
            field_type: p.param_type,
            required: p.required,
            default: if p.required { None } else { p.default.clone() },
            description: p.description.clone(),
        })
        .collect();

    HttpOperation {
        service: service.to_string(),
        operation: op.name.clone(),
        method: "POST",
        path: route_path(service, &op.name),
        description: op.description.clone(),
        request: RequestShape { fields },
    }
}

/// HTTP operations of one service, in declaration order
pub fn project(service: &ServiceDescriptor) -> Vec<HttpOperation> {
    service
        .operations()
        .iter()
        .map(|op| project_operation(service.service(), op))
        .collect()
}

pub fn project_all(registry: &OperationRegistry) -> Vec<HttpOperation> {
    registry.services().iter().flat_map(project).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{CallArgs, OperationFn, ParameterSpec};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_get_x_projection() {
        let noop: OperationFn = Arc::new(|_: CallArgs| Box::pin(async { Ok(json!(null)) }));
        let service = ServiceDescriptor::builder("market")
            .operation(
                OperationDescriptor::new("get_x", "Fetch x", noop)
                    .param(ParameterSpec::required("code", ParamType::String, "Code"))
                    .param(ParameterSpec::optional("limit", ParamType::Integer, 10, "Limit")),
            )
            .build()
            .unwrap();

        let ops = project(&service);
        assert_eq!(ops.len(), 1);
        let op = &ops[0];
        assert_eq!(op.path, "/market/get_x");
        assert_eq!(op.method, "POST");
        assert_eq!(op.request.required_fields(), vec!["code"]);
        assert_eq!(op.request.fields[0].default, None);
        assert_eq!(op.request.fields[1].default, Some(json!(10)));

        let rendered = serde_json::to_value(&op.request).unwrap();
        assert_eq!(
            rendered,
            json!({"fields": [
                {"name": "code", "type": "string", "required": true, "description": "Code"},
                {"name": "limit", "type": "integer", "required": false, "default": 10, "description": "Limit"}
            ]})
        );
    }

    #[test]
    fn test_response_envelope() {
        let ok = serde_json::to_value(ApiResponse::success(json!([1, 2]))).unwrap();
        assert_eq!(ok, json!({"status": "success", "data": [1, 2], "message": null}));

        let err = serde_json::to_value(ApiResponse::error("get_x: boom".into())).unwrap();
        assert_eq!(err, json!({"status": "error", "data": null, "message": "get_x: boom"}));
    }
}
