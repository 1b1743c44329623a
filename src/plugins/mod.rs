//! Built-in plugin catalog
//!
//! Source-specific extractors shipped with the hub. Deployments add their
//! own factories next to these before calling `PluginRegistry::discover`.

use crate::error::HubError;
use crate::plugin::{Plugin, PluginContext, PluginFactory};
use crate::provider::ProviderClient;
use crate::Result;

pub mod daily_quote;
pub mod stock_basic;

pub use daily_quote::DailyQuotePlugin;
pub use stock_basic::StockBasicPlugin;

/// Every built-in factory, in declaration order
pub fn builtin_catalog() -> Vec<PluginFactory> {
    vec![
        PluginFactory::new(StockBasicPlugin::declared(), |ctx| {
            let client = require_provider(ctx, "stock_basic")?;
            Ok(Box::new(StockBasicPlugin::new(client)) as Box<dyn Plugin>)
        }),
        PluginFactory::new(DailyQuotePlugin::declared(), |ctx| {
            let client = require_provider(ctx, "daily_quote")?;
            Ok(Box::new(DailyQuotePlugin::new(client)) as Box<dyn Plugin>)
        }),
    ]
}

fn require_provider(ctx: &PluginContext, plugin: &str) -> Result<ProviderClient> {
    ctx.provider.clone().ok_or_else(|| {
        HubError::Config(format!(
            "{} needs DATA_PROVIDER_BASE_URL to be configured",
            plugin
        ))
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginRegistry, RetryPolicy};
    use crate::storage::InMemoryStorage;
    use std::sync::Arc;

    #[test]
    fn test_catalog_registers_cleanly() {
        let mut registry = PluginRegistry::new(
            Arc::new(InMemoryStorage::new()),
            PluginContext::default(),
            RetryPolicy::default(),
        );
        let failures = registry.discover(builtin_catalog());
        assert!(failures.is_empty());
        assert_eq!(
            registry.resolve_order(["daily_quote"]).unwrap(),
            vec!["stock_basic", "daily_quote"]
        );
    }

    #[tokio::test]
    async fn test_missing_provider_fails_only_that_plugin() {
        let mut registry = PluginRegistry::new(
            Arc::new(InMemoryStorage::new()),
            PluginContext::default(),
            RetryPolicy::default(),
        );
        registry.discover(builtin_catalog());

        let err = registry.get("stock_basic").await.err().unwrap();
        assert!(matches!(err, HubError::PluginInit { .. }));
        assert_eq!(registry.len(), 2);
    }
}
