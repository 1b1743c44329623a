//! hub-ingest: inspect and run ingestion plugins.
//!
//! Commands:
//! - `list`: registered plugins in declaration order
//! - `order <names...>`: execution order including dependencies
//! - `run <names...> [--param key=value]...`: run a batch, print results as JSON

use clap::{Parser, Subcommand};
use fin_data_hub::{
    models::LoadStatus,
    plugin::{ExtractParams, PluginRegistry},
    plugins::builtin_catalog,
    storage::InMemoryStorage,
    HubConfig,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hub-ingest", about = "Financial Data Hub ingestion runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered plugins.
    List,
    /// Print the resolved execution order for the named plugins.
    Order {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Run the named plugins (and their dependencies) once.
    Run {
        #[arg(required = true)]
        names: Vec<String>,

        /// Extraction parameter, e.g. --param trade_date=20240102
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = HubConfig::from_env()?;

    let storage = Arc::new(InMemoryStorage::new());
    let mut registry = PluginRegistry::new(storage, config.plugin_context()?, config.retry.clone());
    for err in registry.discover(builtin_catalog()) {
        warn!(error = %err, "Plugin not registered");
    }

    match cli.command {
        Commands::List => {
            for descriptor in registry.descriptors() {
                let deps = if descriptor.dependencies.is_empty() {
                    "-".to_string()
                } else {
                    descriptor.dependencies.join(",")
                };
                println!(
                    "{:<16} {:<8} {:<12} {:<10} {:>6}/min  deps: {}",
                    descriptor.name,
                    descriptor.version,
                    format!("{:?}", descriptor.category),
                    format!("{:?}", descriptor.role),
                    descriptor.rate_limit,
                    deps
                );
            }
        }
        Commands::Order { names } => {
            for (i, name) in registry.resolve_order(&names)?.iter().enumerate() {
                println!("{}. {}", i + 1, name);
            }
        }
        Commands::Run { names, params } => {
            let params: ExtractParams = params.into_iter().collect();
            info!(plugins = ?names, params = ?params, "Starting ingestion batch");

            let results = registry.run_batch(&names, &params).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);

            let failed = results
                .iter()
                .filter(|r| r.outcome.status == LoadStatus::Failed)
                .count();
            if failed > 0 {
                warn!(failed, total = results.len(), "Ingestion batch finished with failures");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
