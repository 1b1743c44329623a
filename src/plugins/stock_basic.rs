//! Listed-security reference data

use crate::models::{PluginCategory, PluginDescriptor, PluginRole};
use crate::plugin::{ExtractParams, Plugin};
use crate::provider::ProviderClient;
use crate::tabular::TabularResult;
use crate::Result;
use std::collections::BTreeMap;

const FIELDS: &[&str] = &[
    "ts_code", "symbol", "name", "area", "industry", "market", "list_status", "list_date",
];

pub struct StockBasicPlugin {
    descriptor: PluginDescriptor,
    client: ProviderClient,
}

impl StockBasicPlugin {
    pub fn new(client: ProviderClient) -> Self {
        Self {
            descriptor: Self::declared(),
            client,
        }
    }

    pub fn declared() -> PluginDescriptor {
        PluginDescriptor::new("stock_basic", PluginCategory::Reference, PluginRole::Primary)
            .with_version("1.1.0")
            .with_rate_limit(200)
    }
}

#[async_trait::async_trait]
impl Plugin for StockBasicPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn target_table(&self) -> &str {
        "stock_basic"
    }

    fn required_columns(&self) -> &[&'static str] {
        &["ts_code", "symbol", "name"]
    }

    fn key_columns(&self) -> &[&'static str] {
        &["ts_code"]
    }

    fn date_columns(&self) -> &[&'static str] {
        &["list_date"]
    }

    async fn fetch(&self, params: &ExtractParams) -> Result<TabularResult> {
        // Default to currently listed securities
        let mut query: BTreeMap<String, String> = params.clone();
        query
            .entry("list_status".to_string())
            .or_insert_with(|| "L".to_string());
        self.client.query("stock_basic", &query, FIELDS).await
    }
}
