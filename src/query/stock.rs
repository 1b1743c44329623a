//! Security master and daily quote lookups

use crate::query::{query_date, row_limit, security_code};
use crate::service::{
    bind, CallArgs, OperationDescriptor, ParamType, ParameterSpec, QueryService, ServiceDescriptor,
};
use crate::storage::Storage;
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const STOCK_BASIC_TABLE: &str = "stock_basic";
const DAILY_QUOTE_TABLE: &str = "daily_quote";

pub struct StockService {
    storage: Arc<dyn Storage>,
}

impl StockService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn get_stock_basic(&self, args: CallArgs) -> Result<Value> {
        let code = args.opt_str("code")?.map(security_code).transpose()?;
        let limit = row_limit(args.i64("limit")?)?;
        self.rows(&stock_basic_sql(code, limit)).await
    }

    async fn get_daily_quotes(&self, args: CallArgs) -> Result<Value> {
        let code = security_code(args.str("code")?)?;
        let start = args.opt_str("start_date")?.map(query_date).transpose()?;
        let end = args.opt_str("end_date")?.map(query_date).transpose()?;
        let limit = row_limit(args.i64("limit")?)?;
        self.rows(&daily_quotes_sql(code, start, end, limit)).await
    }

    async fn rows(&self, sql: &str) -> Result<Value> {
        let result = self.storage.execute_query(sql).await?;
        debug!(rows = result.height(), "Query returned");
        Ok(Value::Array(result.to_json_rows()))
    }
}

impl QueryService for StockService {
    fn name(&self) -> &'static str {
        "stock"
    }

    fn collect(self: Arc<Self>) -> Result<ServiceDescriptor> {
        ServiceDescriptor::builder(self.name())
            .operation(
                OperationDescriptor::new(
                    "get_stock_basic",
                    "List listed securities, optionally filtered to one code",
                    bind(self.clone(), |svc, args| async move { svc.get_stock_basic(args).await }),
                )
                .param(ParameterSpec::optional(
                    "code",
                    ParamType::String,
                    Value::Null,
                    "Security code such as 000001.SZ",
                ))
                .param(ParameterSpec::optional(
                    "limit",
                    ParamType::Integer,
                    100,
                    "Maximum number of rows",
                )),
            )
            .operation(
                OperationDescriptor::new(
                    "get_daily_quotes",
                    "Daily OHLCV quotes for one security, newest first",
                    bind(self.clone(), |svc, args| async move { svc.get_daily_quotes(args).await }),
                )
                .param(ParameterSpec::required(
                    "code",
                    ParamType::String,
                    "Security code such as 000001.SZ",
                ))
                .param(ParameterSpec::optional(
                    "start_date",
                    ParamType::String,
                    Value::Null,
                    "First trade date, YYYYMMDD",
                ))
                .param(ParameterSpec::optional(
                    "end_date",
                    ParamType::String,
                    Value::Null,
                    "Last trade date, YYYYMMDD",
                ))
                .param(ParameterSpec::optional(
                    "limit",
                    ParamType::Integer,
                    10,
                    "Maximum number of rows",
                )),
            )
            .build()
    }
}

fn stock_basic_sql(code: Option<&str>, limit: usize) -> String {
    let mut sql = format!("SELECT * FROM {}", STOCK_BASIC_TABLE);
    if let Some(code) = code {
        sql.push_str(&format!(" WHERE ts_code = '{}'", code));
    }
    sql.push_str(&format!(" ORDER BY ts_code LIMIT {}", limit));
    sql
}

fn daily_quotes_sql(
    code: &str,
    start: Option<chrono::NaiveDate>,
    end: Option<chrono::NaiveDate>,
    limit: usize,
) -> String {
    let mut sql = format!("SELECT * FROM {} WHERE ts_code = '{}'", DAILY_QUOTE_TABLE, code);
    if let Some(start) = start {
        sql.push_str(&format!(" AND trade_date >= CAST('{}' AS DATE)", start.format("%Y-%m-%d")));
    }
    if let Some(end) = end {
        sql.push_str(&format!(" AND trade_date <= CAST('{}' AS DATE)", end.format("%Y-%m-%d")));
    }
    sql.push_str(&format!(" ORDER BY trade_date DESC LIMIT {}", limit));
    sql
}
