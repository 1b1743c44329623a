//! Error types for the data hub

use thiserror::Error;

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Error, Debug)]
pub enum HubError {

    // =============================
    // Plugin Lifecycle Errors
    // =============================

    #[error("Extraction failed for {plugin} after {attempts} attempt(s): {message}")]
    Extraction {
        plugin: String,
        attempts: u32,
        message: String,
    },

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Load rejected for table {table}: {message}")]
    Load { table: String, message: String },

    #[error("Data provider error: {0}")]
    Provider(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // =============================
    // Registration Errors
    // =============================

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Plugin not found: {0}")]
    UnknownPlugin(String),

    #[error("Plugin {plugin} depends on unregistered plugin {dependency}")]
    UnknownDependency { plugin: String, dependency: String },

    #[error("Plugin {plugin} failed to initialize: {message}")]
    PluginInit { plugin: String, message: String },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    // =============================
    // Operation Errors
    // =============================

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Polars error: {0}")]
    PolarsError(#[from] polars::prelude::PolarsError),
}
