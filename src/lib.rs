//! Financial Data Hub
//!
//! Ingests structured market data from external providers into a columnar
//! store and serves it through generated access surfaces:
//! - Plugins run extract → transform → validate → load with rate limiting,
//!   bounded retries and dependency-ordered batches
//! - Query services declare their operations once; the HTTP routes and the
//!   tool catalog are both projected from that declaration
//! - One dispatcher handles calls from either surface
//!
//! INGEST:
//! PROVIDER → EXTRACT → TRANSFORM → VALIDATE → LOAD → STORE
//!
//! QUERY:
//! HTTP | TOOL → ENVELOPE → DISPATCH → OPERATION → STORE

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod plugin;
pub mod plugins;
pub mod provider;
pub mod query;
pub mod service;
pub mod storage;
pub mod surface;
pub mod tabular;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use config::HubConfig;
pub use dispatch::{DispatchError, Dispatcher};
