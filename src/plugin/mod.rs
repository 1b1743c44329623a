//! Plugin trait and lifecycle machinery
//!
//! A plugin knows how to pull one dataset from one external source and
//! which table it lands in. Everything around that single call (rate
//! limiting, retries, system columns, the storage write, error capture)
//! belongs to the framework.

use crate::models::PluginDescriptor;
use crate::provider::ProviderClient;
use crate::tabular::TabularResult;
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod gate;
pub mod graph;
pub mod lifecycle;
pub mod registry;

pub use gate::{CallGate, RateLimiter, RetryPolicy};
pub use graph::DependencyGraph;
pub use lifecycle::{LifecycleState, PluginInstance};
pub use registry::{PluginHandle, PluginRegistry};

/// Parameters for one extraction (e.g. `trade_date`, `ts_code`)
pub type ExtractParams = BTreeMap<String, String>;

/// Trait for a source-specific extractor
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    /// Table the plugin loads into
    fn target_table(&self) -> &str;

    /// Columns that must be present for the data to be loadable
    fn required_columns(&self) -> &[&'static str] {
        &[]
    }

    /// Columns that must be present and contain no nulls
    fn key_columns(&self) -> &[&'static str] {
        &[]
    }

    /// Columns holding `YYYYMMDD` dates
    fn date_columns(&self) -> &[&'static str] {
        &[]
    }

    /// Columns coerced to floating point
    fn numeric_columns(&self) -> &[&'static str] {
        &[]
    }

    /// Plugins that must have run before this one is meaningful; ordering only
    fn get_dependencies(&self) -> Vec<String> {
        self.descriptor().dependencies.clone()
    }

    /// One call against the external source. Retries and pacing are applied by the caller.
    async fn fetch(&self, params: &ExtractParams) -> Result<TabularResult>;

    /// Normalise column types. Must not perform I/O.
    fn transform(&self, data: TabularResult) -> Result<TabularResult> {
        let mut data = data;
        for column in self.date_columns() {
            data = data.parse_compact_dates(column)?;
        }
        for column in self.numeric_columns() {
            data = data.coerce_numeric(column)?;
        }
        Ok(data)
    }

    fn validate(&self, data: &TabularResult) -> bool {
        validation_issues(self, data).is_empty() && self.check(data)
    }

    /// Extra read-only checks on top of the column rules
    fn check(&self, _data: &TabularResult) -> bool {
        true
    }
}

/// Column-rule violations for `data`, empty when the frame is loadable
pub fn validation_issues<P: Plugin + ?Sized>(plugin: &P, data: &TabularResult) -> Vec<String> {
    let mut issues = Vec::new();

    for column in plugin.required_columns() {
        if !data.has_column(column) {
            issues.push(format!("missing required column '{}'", column));
        }
    }

    for column in plugin.key_columns() {
        match data.null_count(column) {
            None => issues.push(format!("missing key column '{}'", column)),
            Some(0) => {}
            Some(n) => issues.push(format!("key column '{}' has {} null value(s)", column, n)),
        }
    }

    issues
}

/// Shared resources handed to plugin constructors
#[derive(Clone, Default)]
pub struct PluginContext {
    pub provider: Option<ProviderClient>,
}

pub type PluginConstructor =
    Arc<dyn Fn(&PluginContext) -> Result<Box<dyn Plugin>> + Send + Sync>;

/// Descriptor plus a way to build the plugin on first use
#[derive(Clone)]
pub struct PluginFactory {
    pub descriptor: PluginDescriptor,
    constructor: PluginConstructor,
}

impl PluginFactory {
    pub fn new<F>(descriptor: PluginDescriptor, constructor: F) -> Self
    where
        F: Fn(&PluginContext) -> Result<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            constructor: Arc::new(constructor),
        }
    }

    pub fn build(&self, context: &PluginContext) -> Result<Box<dyn Plugin>> {
        (self.constructor)(context)
    }
}

impl std::fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginFactory")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
