//! Built-in query services over the columnar store

use crate::error::HubError;
use crate::service::OperationRegistry;
use crate::storage::Storage;
use crate::Result;
use chrono::NaiveDate;
use std::sync::Arc;

pub mod catalog;
pub mod stock;

pub use catalog::CatalogService;
pub use stock::StockService;

/// Registry holding every built-in service
pub fn default_registry(storage: Arc<dyn Storage>) -> Result<OperationRegistry> {
    let mut registry = OperationRegistry::new();
    registry.register_service(Arc::new(StockService::new(storage.clone())))?;
    registry.register_service(Arc::new(CatalogService::new(storage)))?;
    Ok(registry)
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub(crate) fn table_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(HubError::InvalidArgument(format!("'{}' is not a valid table name", name)))
    }
}

/// Security codes look like `000001.SZ`
pub(crate) fn security_code(code: &str) -> Result<&str> {
    let valid = !code.is_empty()
        && code.len() <= 16
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
    if valid {
        Ok(code)
    } else {
        Err(HubError::InvalidArgument(format!("'{}' is not a valid security code", code)))
    }
}

/// Accepts `YYYYMMDD` or `YYYY-MM-DD`
pub(crate) fn query_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| HubError::InvalidArgument(format!("'{}' is not a date (YYYYMMDD)", raw)))
}

pub(crate) fn row_limit(limit: i64) -> Result<usize> {
    if limit <= 0 {
        return Err(HubError::InvalidArgument(format!(
            "limit must be positive, got {}",
            limit
        )));
    }
    Ok(limit as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[test]
    fn test_identifiers() {
        assert!(table_identifier("daily_quote").is_ok());
        assert!(table_identifier("_tmp1").is_ok());
        assert!(table_identifier("1table").is_err());
        assert!(table_identifier("quote; DROP").is_err());
        assert!(table_identifier("").is_err());
    }

    #[test]
    fn test_security_code() {
        assert!(security_code("000001.SZ").is_ok());
        assert!(security_code("000001.SZ' OR '1'='1").is_err());
    }

    #[test]
    fn test_query_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(query_date("20240102").unwrap(), expected);
        assert_eq!(query_date("2024-01-02").unwrap(), expected);
        assert!(query_date("2024/01/02").is_err());
    }

    #[test]
    fn test_default_registry() {
        let registry = default_registry(Arc::new(InMemoryStorage::new())).unwrap();
        let names: Vec<&str> = registry.operations().map(|(_, op)| op.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["get_stock_basic", "get_daily_quotes", "table_exists", "count_rows"]
        );
    }
}
