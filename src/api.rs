//! REST API server for the data hub
//!
//! Mounts one POST route per declared operation plus catalog endpoints.
//! Every route answers with the uniform `{status, data, message}` envelope.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ErrorClassification;
use crate::dispatch::{DispatchError, Dispatcher, ErrorClass};
use crate::models::{CallEnvelope, CallOrigin, LoadStatus};
use crate::plugin::{ExtractParams, PluginRegistry};
use crate::service::OperationRegistry;
use crate::surface::{self, http, ApiResponse, HttpOperation, ToolCatalog, ToolOutput};
use crate::Result;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
pub struct PluginRunRequest {
    pub names: Vec<String>,
    #[serde(default)]
    pub params: ExtractParams,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Dispatcher,
    pub tools: Arc<ToolCatalog>,
    pub plugins: Arc<PluginRegistry>,
    pub operations: Arc<Vec<HttpOperation>>,
    pub classification: ErrorClassification,
    pub fingerprint: Arc<str>,
}

impl ApiState {
    /// Project both surfaces and refuse to start if they disagree
    pub fn new(
        registry: Arc<OperationRegistry>,
        plugins: Arc<PluginRegistry>,
        classification: ErrorClassification,
    ) -> Result<Self> {
        let fingerprint: Arc<str> = registry.fingerprint().into();
        let dispatcher = Dispatcher::new(registry);
        let operations = http::project_all(dispatcher.registry());
        let tools = ToolCatalog::new(dispatcher.clone());

        surface::check_equivalence(&operations, tools.list_tools())?;

        Ok(Self {
            dispatcher,
            tools: Arc::new(tools),
            plugins,
            operations: Arc::new(operations),
            classification,
            fingerprint,
        })
    }
}

/// =============================
/// Error Classification
/// =============================

pub fn status_for(classification: ErrorClassification, error: &DispatchError) -> StatusCode {
    match classification {
        ErrorClassification::Collapsed => StatusCode::BAD_REQUEST,
        ErrorClassification::Split => match (error, error.class()) {
            (DispatchError::UnknownOperation(_), _) => StatusCode::NOT_FOUND,
            (_, ErrorClass::Client) => StatusCode::BAD_REQUEST,
            (_, ErrorClass::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

/// =============================
/// Health & Catalog Endpoints
/// =============================

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "fingerprint": state.fingerprint.as_ref(),
        "operations": state.operations.len(),
        "plugins": state.plugins.len(),
    }))
}

async fn list_operations(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.operations.as_ref()))
}

async fn list_tools(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.tools.list_tools()))
}

async fn call_tool(
    State(state): State<ApiState>,
    Json(req): Json<ToolCallRequest>,
) -> Json<ToolOutput> {
    info!(tool = %req.name, "Tool call over HTTP");
    Json(state.tools.call_tool(&req.name, req.arguments).await)
}

async fn list_plugins(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.plugins.descriptors()))
}

/// =============================
/// Ingestion Endpoint
/// =============================

async fn run_plugins(
    State(state): State<ApiState>,
    Json(req): Json<PluginRunRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(plugins = ?req.names, params = ?req.params, "Ingestion batch over HTTP");

    match state.plugins.run_batch(&req.names, &req.params).await {
        Ok(results) => {
            let failed = results
                .iter()
                .filter(|r| r.outcome.status == LoadStatus::Failed)
                .count();
            if failed > 0 {
                warn!(failed, total = results.len(), "Ingestion batch finished with failures");
            }
            (StatusCode::OK, Json(ApiResponse::success(results)))
        }
        Err(e) => {
            warn!(error = %e, "Ingestion batch rejected");
            (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// =============================
/// Operation Endpoint
/// =============================

async fn call_operation(
    state: ApiState,
    operation: String,
    body: Bytes,
) -> (StatusCode, Json<ApiResponse>) {
    let arguments = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(operation = %operation, "Rejected non-object request body");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(format!(
                        "{}: request body must be a JSON object",
                        operation
                    ))),
                );
            }
        }
    };

    let envelope = CallEnvelope::new(operation, arguments, CallOrigin::Http);
    match state.dispatcher.dispatch(envelope).await {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => (
            status_for(state.classification, &e),
            Json(ApiResponse::error(e.render(CallOrigin::Http))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/operations", get(list_operations))
        .route("/tools", get(list_tools))
        .route("/tools/call", post(call_tool))
        .route("/plugins", get(list_plugins))
        .route("/plugins/run", post(run_plugins));

    let operations = state.operations.clone();
    for op in operations.iter() {
        let operation = op.operation.clone();
        router = router.route(
            &op.path,
            post(move |State(state): State<ApiState>, body: Bytes| {
                call_operation(state, operation.clone(), body)
            }),
        );
    }

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let routes = state.operations.len();
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(routes, "API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
