use fin_data_hub::{
    api::{start_server, ApiState},
    plugin::PluginRegistry,
    plugins::builtin_catalog,
    query::default_registry,
    storage::{InMemoryStorage, Storage},
    HubConfig,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = HubConfig::from_env()?;

    info!("Financial Data Hub - API Server");
    info!(
        port = config.port,
        classification = ?config.error_classification,
        provider = config.provider_base_url.as_deref().unwrap_or("<unset>"),
        "Configuration loaded"
    );

    // Create components
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());

    let mut plugins = PluginRegistry::new(storage.clone(), config.plugin_context()?, config.retry.clone());
    for err in plugins.discover(builtin_catalog()) {
        warn!(error = %err, "Plugin not registered");
    }
    info!(plugins = plugins.len(), "Plugin registry ready");

    let registry = default_registry(storage)?;
    let state = ApiState::new(Arc::new(registry), Arc::new(plugins), config.error_classification)?;

    info!(fingerprint = %state.fingerprint, "Operation surfaces generated");

    // Start API server
    start_server(state, config.port).await?;

    Ok(())
}
