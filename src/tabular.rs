//! Columnar result type passed between lifecycle stages
//!
//! Thin wrapper over a polars DataFrame with the normalisations plugins
//! share: compact date parsing, numeric coercion and the system columns
//! appended at load time.

use crate::error::{HubError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use polars::prelude::*;
use serde_json::{Map, Value};

/// Column holding the integer epoch at load time
pub const VERSION_COLUMN: &str = "version";
/// Column holding the load timestamp
pub const INGESTED_AT_COLUMN: &str = "ingested_at";

/// Days between 0001-01-01 and 1970-01-01, the polars Date origin
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone)]
pub struct TabularResult {
    frame: DataFrame,
}

impl TabularResult {
    pub fn new(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn empty() -> Self {
        Self {
            frame: DataFrame::empty(),
        }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    /// Null count of a column, `None` if the column is absent
    pub fn null_count(&self, name: &str) -> Option<usize> {
        self.frame.column(name).ok().map(|c| c.null_count())
    }

    /// Build a frame from a provider's `fields` + row-major `items` payload.
    ///
    /// Column types are inferred per column from the non-null values:
    /// all integers → Int64, all numbers → Float64, all booleans → Boolean,
    /// anything else → String.
    pub fn from_rows(fields: &[String], items: &[Vec<Value>]) -> Result<Self> {
        if fields.is_empty() {
            return Ok(Self::empty());
        }

        let mut columns = Vec::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            let cells: Vec<&Value> = items
                .iter()
                .map(|row| row.get(idx).unwrap_or(&Value::Null))
                .collect();
            columns.push(infer_column(field, &cells));
        }

        let frame = DataFrame::new(columns)
            .map_err(|e| HubError::Provider(format!("malformed payload: {}", e)))?;
        Ok(Self { frame })
    }

    /// Parse `YYYYMMDD` values in `column` into calendar dates; bad values become null
    pub fn parse_compact_dates(mut self, column: &str) -> Result<Self> {
        let current = match self.frame.column(column) {
            Ok(c) => c,
            Err(_) => return Ok(self),
        };
        if current.dtype() == &DataType::Date {
            return Ok(self);
        }

        let as_text = current.cast(&DataType::String)?;
        let days: Vec<Option<i32>> = as_text
            .str()?
            .iter()
            .map(|v| v.and_then(parse_compact_date).map(days_since_epoch))
            .collect();

        let parsed = Column::new(column.into(), days).cast(&DataType::Date)?;
        self.frame.with_column(parsed)?;
        Ok(self)
    }

    /// Cast `column` to Float64; values that do not parse become null
    pub fn coerce_numeric(mut self, column: &str) -> Result<Self> {
        let current = match self.frame.column(column) {
            Ok(c) => c,
            Err(_) => return Ok(self),
        };
        if current.dtype() == &DataType::Float64 {
            return Ok(self);
        }

        let coerced = current.cast(&DataType::Float64)?;
        self.frame.with_column(coerced)?;
        Ok(self)
    }

    /// Append `version` and `ingested_at` to every row
    pub fn with_system_columns(mut self, ingested_at: DateTime<Utc>) -> Result<Self> {
        let height = self.frame.height();
        let version = Column::new(VERSION_COLUMN.into(), vec![ingested_at.timestamp(); height]);
        let stamp = Column::new(
            INGESTED_AT_COLUMN.into(),
            vec![ingested_at.timestamp_millis(); height],
        )
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;

        self.frame.with_column(version)?;
        self.frame.with_column(stamp)?;
        Ok(self)
    }

    /// Row-oriented JSON view for the query surfaces
    pub fn to_json_rows(&self) -> Vec<Value> {
        let columns = self.frame.get_columns();
        (0..self.frame.height())
            .map(|row| {
                let mut record = Map::with_capacity(columns.len());
                for column in columns {
                    let value = column
                        .as_materialized_series()
                        .get(row)
                        .map(any_value_to_json)
                        .unwrap_or(Value::Null);
                    record.insert(column.name().to_string(), value);
                }
                Value::Object(record)
            })
            .collect()
    }
}

impl From<DataFrame> for TabularResult {
    fn from(frame: DataFrame) -> Self {
        Self::new(frame)
    }
}

fn parse_compact_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

fn infer_column(name: &str, cells: &[&Value]) -> Column {
    let present = cells.iter().filter(|v| !v.is_null());

    let mut all_int = true;
    let mut all_num = true;
    let mut all_bool = true;
    for v in present {
        all_int &= v.is_i64();
        all_num &= v.is_number();
        all_bool &= v.is_boolean();
    }

    if all_bool && !all_num {
        let values: Vec<Option<bool>> = cells.iter().map(|v| v.as_bool()).collect();
        Column::new(name.into(), values)
    } else if all_int && all_num && !all_bool {
        let values: Vec<Option<i64>> = cells.iter().map(|v| v.as_i64()).collect();
        Column::new(name.into(), values)
    } else if all_num && !all_bool {
        let values: Vec<Option<f64>> = cells.iter().map(|v| v.as_f64()).collect();
        Column::new(name.into(), values)
    } else {
        let values: Vec<Option<String>> = cells
            .iter()
            .map(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        Column::new(name.into(), values)
    }
}

fn any_value_to_json(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::Int32(v) => Value::from(v),
        AnyValue::Int64(v) => Value::from(v),
        AnyValue::UInt32(v) => Value::from(v),
        AnyValue::UInt64(v) => Value::from(v),
        AnyValue::Float32(v) => Value::from(v),
        AnyValue::Float64(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_result() {
        let t = TabularResult::empty();
        assert!(t.is_empty());
        assert!(t.column_names().is_empty());
    }

    #[test]
    fn test_from_rows_infers_types() {
        let fields = vec!["ts_code".to_string(), "vol".to_string(), "close".to_string()];
        let items = vec![
            vec![json!("000001.SZ"), json!(100), json!(10.5)],
            vec![json!("000002.SZ"), json!(200), json!(11)],
        ];
        let t = TabularResult::from_rows(&fields, &items).unwrap();
        assert_eq!(t.height(), 2);
        assert_eq!(t.frame().column("ts_code").unwrap().dtype(), &DataType::String);
        assert_eq!(t.frame().column("vol").unwrap().dtype(), &DataType::Int64);
        assert_eq!(t.frame().column("close").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_from_rows_with_no_items_is_empty_but_typed() {
        let fields = vec!["ts_code".to_string()];
        let t = TabularResult::from_rows(&fields, &[]).unwrap();
        assert!(t.is_empty());
        assert!(t.has_column("ts_code"));
    }

    #[test]
    fn test_parse_compact_dates_nulls_bad_values() {
        let df = df!("trade_date" => &["20240102", "2024-01-03", "bogus"]).unwrap();
        let t = TabularResult::new(df).parse_compact_dates("trade_date").unwrap();
        let col = t.frame().column("trade_date").unwrap();
        assert_eq!(col.dtype(), &DataType::Date);
        assert_eq!(col.null_count(), 2);

        let days = col.date().unwrap().get(0).unwrap();
        let expected = days_since_epoch(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(days, expected);
    }

    #[test]
    fn test_parse_compact_dates_accepts_integer_column() {
        let df = df!("trade_date" => &[20240102i64]).unwrap();
        let t = TabularResult::new(df).parse_compact_dates("trade_date").unwrap();
        assert_eq!(t.null_count("trade_date"), Some(0));
    }

    #[test]
    fn test_coerce_numeric_invalid_becomes_null() {
        let df = df!("close" => &["10.5", "n/a", "12"]).unwrap();
        let t = TabularResult::new(df).coerce_numeric("close").unwrap();
        let col = t.frame().column("close").unwrap();
        assert_eq!(col.dtype(), &DataType::Float64);
        assert_eq!(col.null_count(), 1);
        assert_eq!(col.f64().unwrap().get(0), Some(10.5));
    }

    #[test]
    fn test_missing_column_is_left_alone() {
        let df = df!("a" => &[1i64]).unwrap();
        let t = TabularResult::new(df).coerce_numeric("missing").unwrap();
        assert_eq!(t.column_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_system_columns_appended() {
        let df = df!("a" => &[1i64, 2]).unwrap();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let t = TabularResult::new(df).with_system_columns(at).unwrap();
        assert_eq!(
            t.column_names(),
            vec!["a".to_string(), VERSION_COLUMN.to_string(), INGESTED_AT_COLUMN.to_string()]
        );
        let version = t.frame().column(VERSION_COLUMN).unwrap().i64().unwrap().get(1);
        assert_eq!(version, Some(1_700_000_000));
    }

    #[test]
    fn test_json_rows() {
        let df = df!("code" => &["A", "B"], "px" => &[1.5, 2.0]).unwrap();
        let rows = TabularResult::new(df).to_json_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], json!({"code": "A", "px": 1.5}));
    }
}
