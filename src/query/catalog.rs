//! Table catalog queries

use crate::error::HubError;
use crate::query::table_identifier;
use crate::service::{
    bind, CallArgs, OperationDescriptor, ParamType, ParameterSpec, QueryService, ServiceDescriptor,
};
use crate::storage::Storage;
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct CatalogService {
    storage: Arc<dyn Storage>,
}

impl CatalogService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn table_exists(&self, args: CallArgs) -> Result<Value> {
        let table = table_identifier(args.str("table")?)?;
        let exists = self.storage.table_exists(table).await?;
        Ok(json!({ "table": table, "exists": exists }))
    }

    async fn count_rows(&self, args: CallArgs) -> Result<Value> {
        let table = table_identifier(args.str("table")?)?;
        if !self.storage.table_exists(table).await? {
            return Err(HubError::InvalidArgument(format!("table '{}' does not exist", table)));
        }

        let result = self
            .storage
            .execute_query(&format!("SELECT COUNT(*) AS row_count FROM {}", table))
            .await?;
        let rows = result
            .to_json_rows()
            .first()
            .and_then(|row| row.get("row_count"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        Ok(json!({ "table": table, "rows": rows }))
    }
}

impl QueryService for CatalogService {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn collect(self: Arc<Self>) -> Result<ServiceDescriptor> {
        ServiceDescriptor::builder(self.name())
            .operation(
                OperationDescriptor::new(
                    "table_exists",
                    "Check whether a table has been loaded",
                    bind(self.clone(), |svc, args| async move { svc.table_exists(args).await }),
                )
                .param(ParameterSpec::required("table", ParamType::String, "Table name")),
            )
            .operation(
                OperationDescriptor::new(
                    "count_rows",
                    "Number of rows held by a table",
                    bind(self.clone(), |svc, args| async move { svc.count_rows(args).await }),
                )
                .param(ParameterSpec::required("table", ParamType::String, "Table name")),
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::tabular::TabularResult;
    use polars::prelude::*;

    async fn service_with_quotes() -> CatalogService {
        let storage = Arc::new(InMemoryStorage::new());
        let frame = df!("ts_code" => ["000001.SZ", "000002.SZ", "000004.SZ"]).unwrap();
        storage
            .insert_dataframe("daily_quote", &TabularResult::new(frame), None)
            .await
            .unwrap();
        CatalogService::new(storage)
    }

    #[tokio::test]
    async fn test_table_exists() {
        let svc = service_with_quotes().await;
        let found = svc
            .table_exists(CallArgs::new().with("table", "daily_quote"))
            .await
            .unwrap();
        assert_eq!(found, json!({"table": "daily_quote", "exists": true}));

        let missing = svc
            .table_exists(CallArgs::new().with("table", "fund_nav"))
            .await
            .unwrap();
        assert_eq!(missing["exists"], json!(false));
    }

    #[tokio::test]
    async fn test_count_rows() {
        let svc = service_with_quotes().await;
        let counted = svc
            .count_rows(CallArgs::new().with("table", "daily_quote"))
            .await
            .unwrap();
        assert_eq!(counted, json!({"table": "daily_quote", "rows": 3}));

        assert!(svc
            .count_rows(CallArgs::new().with("table", "fund_nav"))
            .await
            .is_err());
    }
}
