//! Declarative query services
//!
//! A `QueryService` turns itself into a `ServiceDescriptor`; the
//! `OperationRegistry` collects descriptors from every service and is the
//! single table the dispatcher and both surfaces read.

use crate::Result;
use std::sync::Arc;

pub mod args;
pub mod descriptor;
pub mod registry;

pub use args::CallArgs;
pub use descriptor::{
    bind, OperationDescriptor, OperationFn, ParamType, ParameterSpec, ServiceDescriptor,
    ServiceDescriptorBuilder,
};
pub use registry::OperationRegistry;

/// A group of query operations over shared state
pub trait QueryService: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Declare the operations. Must be deterministic.
    fn collect(self: Arc<Self>) -> Result<ServiceDescriptor>;
}
