//! Storage collaborator
//!
//! The columnar store the hub loads into and queries from.
//! Production deployments plug in their own engine; the in-memory
//! implementation backs development and tests.

use crate::error::HubError;
use crate::tabular::TabularResult;
use crate::Result;
use polars::prelude::*;
use polars::sql::SQLContext;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Options passed alongside a bulk insert
#[derive(Debug, Clone)]
pub struct InsertSettings {
    /// Create the table from the frame's schema when it does not exist yet
    pub create_if_missing: bool,
}

impl Default for InsertSettings {
    fn default() -> Self {
        Self {
            create_if_missing: true,
        }
    }
}

/// Trait for the columnar store
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    async fn execute_query(&self, sql: &str) -> Result<TabularResult>;
    async fn insert_dataframe(
        &self,
        table: &str,
        data: &TabularResult,
        settings: Option<&InsertSettings>,
    ) -> Result<()>;
    async fn table_exists(&self, table: &str) -> Result<bool>;
}

/// In-memory store for development, queried through the polars SQL context
pub struct InMemoryStorage {
    tables: Arc<RwLock<HashMap<String, DataFrame>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of rows currently held by `table`
    pub async fn row_count(&self, table: &str) -> Option<usize> {
        let tables = self.tables.read().await;
        tables.get(table).map(|df| df.height())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Storage for InMemoryStorage {
    async fn execute_query(&self, sql: &str) -> Result<TabularResult> {
        debug!(sql = %sql, "Executing query");

        let snapshot: Vec<(String, DataFrame)> = {
            let tables = self.tables.read().await;
            tables
                .iter()
                .map(|(name, frame)| (name.clone(), frame.clone()))
                .collect()
        };

        let mut ctx = SQLContext::new();
        for (name, frame) in snapshot {
            ctx.register(&name, frame.lazy());
        }

        let frame = ctx
            .execute(sql)
            .and_then(|lf| lf.collect())
            .map_err(|e| HubError::Storage(format!("query failed: {}", e)))?;

        Ok(TabularResult::new(frame))
    }

    async fn insert_dataframe(
        &self,
        table: &str,
        data: &TabularResult,
        settings: Option<&InsertSettings>,
    ) -> Result<()> {
        let create_if_missing = settings.map(|s| s.create_if_missing).unwrap_or(true);

        let mut tables = self.tables.write().await;
        match tables.get_mut(table) {
            Some(existing) => {
                existing.vstack_mut(data.frame()).map_err(|e| {
                    HubError::Storage(format!("insert into {} rejected: {}", table, e))
                })?;
            }
            None if create_if_missing => {
                tables.insert(table.to_string(), data.frame().clone());
            }
            None => {
                return Err(HubError::Storage(format!("table {} does not exist", table)));
            }
        }

        debug!(table = %table, rows = data.height(), "Inserted rows");
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.contains_key(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(codes: &[&str], closes: &[f64]) -> TabularResult {
        TabularResult::new(df!("ts_code" => codes, "close" => closes).unwrap())
    }

    #[tokio::test]
    async fn test_insert_then_query() {
        let store = InMemoryStorage::new();
        store
            .insert_dataframe("daily", &sample(&["A", "B"], &[1.0, 2.0]), None)
            .await
            .unwrap();

        assert!(store.table_exists("daily").await.unwrap());
        let result = store
            .execute_query("SELECT ts_code FROM daily WHERE close > 1.5")
            .await
            .unwrap();
        assert_eq!(result.height(), 1);
    }

    #[tokio::test]
    async fn test_inserts_append() {
        let store = InMemoryStorage::new();
        store.insert_dataframe("t", &sample(&["A"], &[1.0]), None).await.unwrap();
        store.insert_dataframe("t", &sample(&["B"], &[2.0]), None).await.unwrap();
        assert_eq!(store.row_count("t").await, Some(2));
    }

    #[tokio::test]
    async fn test_schema_mismatch_rejected() {
        let store = InMemoryStorage::new();
        store.insert_dataframe("t", &sample(&["A"], &[1.0]), None).await.unwrap();

        let other = TabularResult::new(df!("other" => &[1i64]).unwrap());
        let err = store.insert_dataframe("t", &other, None).await.unwrap_err();
        assert!(matches!(err, HubError::Storage(_)));
    }

    #[tokio::test]
    async fn test_missing_table_without_create() {
        let store = InMemoryStorage::new();
        let settings = InsertSettings {
            create_if_missing: false,
        };
        let result = store
            .insert_dataframe("t", &sample(&["A"], &[1.0]), Some(&settings))
            .await;
        assert!(result.is_err());
        assert!(!store.table_exists("t").await.unwrap());
    }

    #[tokio::test]
    async fn test_bad_sql_is_storage_error() {
        let store = InMemoryStorage::new();
        let err = store.execute_query("SELECT * FROM nowhere").await.unwrap_err();
        assert!(matches!(err, HubError::Storage(_)));
    }
}
