//! Surface-agnostic dispatch of operation calls
//!
//! Both surfaces hand the dispatcher a `CallEnvelope`. Lookup, argument
//! binding and error shaping happen here exactly once.

use crate::error::HubError;
use crate::models::{CallEnvelope, CallOrigin};
use crate::service::{CallArgs, OperationDescriptor, OperationRegistry};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Who is at fault for a failed call
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Client,
    Internal,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("missing required argument(s): {}", missing.join(", "))]
    MissingArgument {
        operation: String,
        missing: Vec<String>,
    },

    #[error("invalid argument: {reason}")]
    InvalidArgument { operation: String, reason: String },

    #[error("{message}")]
    OperationFailed { operation: String, message: String },
}

impl DispatchError {
    pub fn operation(&self) -> &str {
        match self {
            DispatchError::UnknownOperation(operation)
            | DispatchError::MissingArgument { operation, .. }
            | DispatchError::InvalidArgument { operation, .. }
            | DispatchError::OperationFailed { operation, .. } => operation,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            DispatchError::OperationFailed { .. } => ErrorClass::Internal,
            _ => ErrorClass::Client,
        }
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::UnknownOperation(_) => "unknown_operation",
            DispatchError::MissingArgument { .. } => "missing_argument",
            DispatchError::InvalidArgument { .. } => "invalid_argument",
            DispatchError::OperationFailed { .. } => "operation_failed",
        }
    }

    /// Caller-visible message for the surface the call came from
    pub fn render(&self, origin: CallOrigin) -> String {
        match origin {
            CallOrigin::Http => format!("{}: {}", self.operation(), self),
            CallOrigin::Tool => format!("Error executing tool {}: {}", self.operation(), self),
        }
    }
}

/// Routes envelopes to the operation handlers of a registry
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, envelope: CallEnvelope) -> Result<Value, DispatchError> {
        let CallEnvelope {
            operation,
            arguments,
            origin,
        } = envelope;

        let Some((service, descriptor)) = self.registry.lookup(&operation) else {
            warn!(operation = %operation, origin = %origin, "Unknown operation");
            return Err(DispatchError::UnknownOperation(operation));
        };

        let args = bind_arguments(descriptor, &arguments)?;
        let handler = descriptor.handler.clone();

        debug!(
            service = %service.service(),
            operation = %operation,
            origin = %origin,
            "Dispatching operation"
        );

        let start = Instant::now();
        let outcome = AssertUnwindSafe(handler(args)).catch_unwind().await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(value)) => {
                info!(operation = %operation, origin = %origin, elapsed_ms, "Operation completed");
                Ok(value)
            }
            Ok(Err(HubError::InvalidArgument(reason))) => {
                warn!(operation = %operation, reason = %reason, "Operation rejected arguments");
                Err(DispatchError::InvalidArgument { operation, reason })
            }
            Ok(Err(e)) => {
                warn!(operation = %operation, error = %e, elapsed_ms, "Operation failed");
                Err(DispatchError::OperationFailed {
                    operation,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                warn!(operation = %operation, "Operation handler panicked");
                Err(DispatchError::OperationFailed {
                    operation,
                    message: "operation handler panicked".to_string(),
                })
            }
        }
    }
}

/// Bind supplied arguments to the declared parameters.
///
/// Every declared parameter ends up in the result: the supplied value, or
/// the default when it is absent or null. Undeclared keys are dropped.
pub fn bind_arguments(
    descriptor: &OperationDescriptor,
    supplied: &Map<String, Value>,
) -> Result<CallArgs, DispatchError> {
    let missing: Vec<String> = descriptor
        .params
        .iter()
        .filter(|p| p.required && supplied.get(&p.name).map_or(true, Value::is_null))
        .map(|p| p.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(DispatchError::MissingArgument {
            operation: descriptor.name.clone(),
            missing,
        });
    }

    let mut args = CallArgs::new();
    for param in &descriptor.params {
        let value = match supplied.get(&param.name) {
            Some(value) if !value.is_null() => value.clone(),
            _ => param.default.clone().unwrap_or(Value::Null),
        };

        if !value.is_null() && !param.param_type.accepts(&value) {
            return Err(DispatchError::InvalidArgument {
                operation: descriptor.name.clone(),
                reason: format!(
                    "'{}' expected {}, got {}",
                    param.name,
                    param.param_type.json_type(),
                    value
                ),
            });
        }
        args.push(param.name.clone(), value);
    }

    for key in supplied.keys() {
        if descriptor.get_param(key).is_none() {
            debug!(operation = %descriptor.name, argument = %key, "Ignoring undeclared argument");
        }
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{OperationFn, ParamType, ParameterSpec, ServiceDescriptor};
    use serde_json::json;

    fn echo() -> OperationFn {
        Arc::new(|args: CallArgs| Box::pin(async move { Ok(args.to_value()) }))
    }

    fn dispatcher() -> Dispatcher {
        let failing: OperationFn = Arc::new(|_: CallArgs| {
            Box::pin(async { Err::<Value, _>(HubError::Storage("disk on fire".into())) })
        });
        let rejecting: OperationFn = Arc::new(|_: CallArgs| {
            Box::pin(async { Err::<Value, _>(HubError::InvalidArgument("limit too big".into())) })
        });
        let panicking: OperationFn = Arc::new(|args: CallArgs| {
            Box::pin(async move {
                let code = args.get("code").cloned();
                Ok::<Value, HubError>(code.expect("boom"))
            })
        });

        let descriptor = ServiceDescriptor::builder("svc")
            .operation(
                OperationDescriptor::new("get_x", "Fetch x", echo())
                    .param(ParameterSpec::required("code", ParamType::String, ""))
                    .param(ParameterSpec::optional("limit", ParamType::Integer, 10, "")),
            )
            .operation(OperationDescriptor::new("explode", "", failing))
            .operation(OperationDescriptor::new("reject", "", rejecting))
            .operation(OperationDescriptor::new("panic", "", panicking))
            .build()
            .unwrap();

        let mut registry = OperationRegistry::new();
        registry.register(descriptor).unwrap();
        Dispatcher::new(Arc::new(registry))
    }

    fn call(operation: &str, arguments: Value) -> CallEnvelope {
        CallEnvelope::from_value(operation, arguments, CallOrigin::Http).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let d = dispatcher();
        let value = d.dispatch(call("get_x", json!({"code": "A"}))).await.unwrap();
        assert_eq!(value, json!({"code": "A", "limit": 10}));

        let value = d
            .dispatch(call("get_x", json!({"code": "A", "limit": null})))
            .await
            .unwrap();
        assert_eq!(value["limit"], json!(10));
    }

    #[tokio::test]
    async fn test_extra_arguments_ignored() {
        let d = dispatcher();
        let value = d
            .dispatch(call("get_x", json!({"code": "A", "limit": 5, "verbose": true})))
            .await
            .unwrap();
        assert_eq!(value, json!({"code": "A", "limit": 5}));
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let err = dispatcher()
            .dispatch(call("get_y", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::UnknownOperation("get_y".into()));
        assert_eq!(err.class(), ErrorClass::Client);
        assert_eq!(err.render(CallOrigin::Http), "get_y: unknown operation 'get_y'");
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let d = dispatcher();
        for args in [json!({"limit": 5}), json!({"code": null})] {
            let err = d.dispatch(call("get_x", args)).await.unwrap_err();
            assert_eq!(
                err,
                DispatchError::MissingArgument {
                    operation: "get_x".into(),
                    missing: vec!["code".into()],
                }
            );
        }
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let err = dispatcher()
            .dispatch(call("get_x", json!({"code": "A", "limit": "ten"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        assert!(err.to_string().contains("'limit' expected integer"));
    }

    #[tokio::test]
    async fn test_handler_failure_is_internal() {
        let err = dispatcher().dispatch(call("explode", json!({}))).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Internal);
        assert_eq!(err.render(CallOrigin::Http), "explode: Storage error: disk on fire");
        assert_eq!(
            err.render(CallOrigin::Tool),
            "Error executing tool explode: Storage error: disk on fire"
        );
    }

    #[tokio::test]
    async fn test_handler_argument_rejection_is_client_error() {
        let err = dispatcher().dispatch(call("reject", json!({}))).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Client);
        assert_eq!(err.render(CallOrigin::Http), "reject: invalid argument: limit too big");
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let err = dispatcher().dispatch(call("panic", json!({}))).await.unwrap_err();
        assert_eq!(err.kind(), "operation_failed");
    }
}
