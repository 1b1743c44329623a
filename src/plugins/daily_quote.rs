//! End-of-day quotes per security

use crate::models::{PluginCategory, PluginDescriptor, PluginRole};
use crate::plugin::{ExtractParams, Plugin};
use crate::provider::ProviderClient;
use crate::tabular::TabularResult;
use crate::Result;

const FIELDS: &[&str] = &[
    "ts_code", "trade_date", "open", "high", "low", "close", "pre_close", "change", "pct_chg",
    "vol", "amount",
];

const PRICE_COLUMNS: &[&str] = &[
    "open", "high", "low", "close", "pre_close", "change", "pct_chg", "vol", "amount",
];

pub struct DailyQuotePlugin {
    descriptor: PluginDescriptor,
    client: ProviderClient,
}

impl DailyQuotePlugin {
    pub fn new(client: ProviderClient) -> Self {
        Self {
            descriptor: Self::declared(),
            client,
        }
    }

    pub fn declared() -> PluginDescriptor {
        PluginDescriptor::new("daily_quote", PluginCategory::Market, PluginRole::Primary)
            .with_version("1.0.0")
            .with_rate_limit(500)
            .depends_on("stock_basic")
    }
}

#[async_trait::async_trait]
impl Plugin for DailyQuotePlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn target_table(&self) -> &str {
        "daily_quote"
    }

    fn required_columns(&self) -> &[&'static str] {
        &["ts_code", "trade_date", "close"]
    }

    fn key_columns(&self) -> &[&'static str] {
        &["ts_code", "trade_date"]
    }

    fn date_columns(&self) -> &[&'static str] {
        &["trade_date"]
    }

    fn numeric_columns(&self) -> &[&'static str] {
        PRICE_COLUMNS
    }

    async fn fetch(&self, params: &ExtractParams) -> Result<TabularResult> {
        self.client.query("daily", params, FIELDS).await
    }

    /// A batch where no row has a close price is a provider glitch, not data
    fn check(&self, data: &TabularResult) -> bool {
        match data.null_count("close") {
            Some(nulls) => nulls < data.height(),
            None => false,
        }
    }
}
