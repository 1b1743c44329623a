//! Plugin registry
//!
//! Built once at startup and shared by reference. Registration validates
//! names and the dependency graph; instances are built lazily and cached,
//! one per name.

use super::gate::RetryPolicy;
use super::graph::DependencyGraph;
use super::lifecycle::{LifecycleState, PluginInstance};
use super::{ExtractParams, PluginContext, PluginFactory};
use crate::error::HubError;
use crate::models::{LoadOutcome, PluginDescriptor, RunResult};
use crate::storage::Storage;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared handle to a cached instance; the mutex serialises runs
pub type PluginHandle = Arc<Mutex<PluginInstance>>;

pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
    graph: DependencyGraph,
    instances: RwLock<HashMap<String, PluginHandle>>,
    storage: Arc<dyn Storage>,
    context: PluginContext,
    retry: RetryPolicy,
}

impl PluginRegistry {
    pub fn new(storage: Arc<dyn Storage>, context: PluginContext, retry: RetryPolicy) -> Self {
        Self {
            factories: HashMap::new(),
            graph: DependencyGraph::new(),
            instances: RwLock::new(HashMap::new()),
            storage,
            context,
            retry,
        }
    }

    /// Register one factory. On error the registry is left untouched.
    pub fn register(&mut self, factory: PluginFactory) -> Result<()> {
        let descriptor = &factory.descriptor;
        descriptor.validate()?;

        if self.factories.contains_key(&descriptor.name) {
            return Err(HubError::DuplicateName(descriptor.name.clone()));
        }

        let mut candidate = self.graph.clone();
        candidate.add_node(descriptor.name.clone(), descriptor.dependencies.clone())?;
        if let Some(cycle) = candidate.find_cycle() {
            return Err(HubError::CyclicDependency(cycle));
        }

        info!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            category = ?descriptor.category,
            dependencies = ?descriptor.dependencies,
            "Registered plugin"
        );

        self.graph = candidate;
        self.factories.insert(descriptor.name.clone(), factory);
        Ok(())
    }

    /// Register a whole catalog; failures are collected per plugin, not fatal
    pub fn discover(&mut self, catalog: Vec<PluginFactory>) -> Vec<HubError> {
        let mut failures = Vec::new();
        for factory in catalog {
            let name = factory.descriptor.name.clone();
            if let Err(e) = self.register(factory) {
                error!(plugin = %name, error = %e, "Plugin registration rejected");
                failures.push(e);
            }
        }
        info!(
            registered = self.graph.len(),
            rejected = failures.len(),
            "Plugin discovery complete"
        );
        failures
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Registered descriptors in declaration order
    pub fn descriptors(&self) -> Vec<&PluginDescriptor> {
        self.graph
            .names()
            .iter()
            .filter_map(|name| self.factories.get(name))
            .map(|f| &f.descriptor)
            .collect()
    }

    pub fn descriptor(&self, name: &str) -> Option<&PluginDescriptor> {
        self.factories.get(name).map(|f| &f.descriptor)
    }

    /// Cached instance for `name`, built on first access.
    /// A failed build is not cached, so the next call tries again.
    pub async fn get(&self, name: &str) -> Result<PluginHandle> {
        {
            let instances = self.instances.read().await;
            if let Some(handle) = instances.get(name) {
                return Ok(handle.clone());
            }
        }

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| HubError::UnknownPlugin(name.to_string()))?;

        let mut instances = self.instances.write().await;
        if let Some(handle) = instances.get(name) {
            return Ok(handle.clone());
        }

        let plugin = factory.build(&self.context).map_err(|e| HubError::PluginInit {
            plugin: name.to_string(),
            message: e.to_string(),
        })?;

        let instance = PluginInstance::new(plugin, self.storage.clone(), self.retry.clone());
        let handle = Arc::new(Mutex::new(instance));
        instances.insert(name.to_string(), handle.clone());
        info!(plugin = %name, "Instantiated plugin");
        Ok(handle)
    }

    /// Execution order for `names` plus their transitive dependencies
    pub fn resolve_order<I, S>(&self, names: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: Vec<S> = names.into_iter().collect();
        self.graph.resolve(&requested)
    }

    /// Run one plugin; concurrent runs of the same name queue on its lock
    pub async fn run(&self, name: &str, params: &ExtractParams) -> RunResult {
        let handle = match self.get(name).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(plugin = %name, error = %e, "Plugin unavailable");
                return RunResult {
                    run_id: Uuid::new_v4(),
                    plugin: name.to_string(),
                    outcome: LoadOutcome::failed(e.to_string()),
                    final_state: LifecycleState::Idle,
                    elapsed_ms: 0,
                    attempts: 0,
                };
            }
        };

        let mut instance = handle.lock().await;
        instance.run(params).await
    }

    /// Resolve the order, then run each plugin in turn; one failure never stops the rest
    pub async fn run_batch<I, S>(&self, names: I, params: &ExtractParams) -> Result<Vec<RunResult>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let order = self.resolve_order(names)?;
        info!(order = ?order, "Running plugin batch");

        let mut results = Vec::with_capacity(order.len());
        for name in &order {
            results.push(self.run(name, params).await);
        }
        Ok(results)
    }
}
