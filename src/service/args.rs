//! Generic structured call arguments
//!
//! The dispatcher binds every declared parameter (supplied value or
//! default) in declaration order, so handlers never see a missing key.

use crate::error::HubError;
use crate::Result;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    values: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// String argument; `None` when absent or null
    pub fn opt_str(&self, name: &str) -> Result<Option<&str>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(type_error(name, "string", other)),
        }
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.opt_str(name)?.ok_or_else(|| missing(name))
    }

    /// Integer argument; integral floats are accepted
    pub fn opt_i64(&self, name: &str) -> Result<Option<i64>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_i64()
                .or_else(|| {
                    value
                        .as_f64()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                })
                .map(Some)
                .ok_or_else(|| type_error(name, "integer", value)),
        }
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        self.opt_i64(name)?.ok_or_else(|| missing(name))
    }

    pub fn opt_bool(&self, name: &str) -> Result<Option<bool>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(type_error(name, "boolean", other)),
        }
    }

    /// Arguments as a JSON object, keys in binding order
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self.values.iter().cloned().collect();
        Value::Object(map)
    }
}

fn missing(name: &str) -> HubError {
    HubError::InvalidArgument(format!("argument '{}' has no value", name))
}

fn type_error(name: &str, expected: &str, got: &Value) -> HubError {
    HubError::InvalidArgument(format!("argument '{}' expected {}, got {}", name, expected, got))
}
