//! Extract → transform → validate → load state machine
//!
//! One `PluginInstance` per registered plugin. The registry keeps it behind
//! a mutex, so the gate clock and the state field are never shared between
//! concurrent runs.

use super::gate::{Attempted, CallGate, RetryPolicy};
use super::{validation_issues, ExtractParams, Plugin};
use crate::error::HubError;
use crate::models::{LoadOutcome, PluginDescriptor, RunResult};
use crate::storage::{InsertSettings, Storage};
use crate::tabular::TabularResult;
use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Extracting,
    Empty,
    NonEmpty,
    Transforming,
    Transformed,
    Validating,
    Valid,
    Invalid,
    Loading,
    Loaded,
    Failed,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, Empty)
                | (Extracting, NonEmpty)
                | (Extracting, Failed)
                | (NonEmpty, Transforming)
                | (Transforming, Transformed)
                | (Transforming, Failed)
                | (Transformed, Validating)
                | (Validating, Valid)
                | (Validating, Invalid)
                | (Valid, Loading)
                | (Loading, Loaded)
                | (Loading, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Empty
                | LifecycleState::Invalid
                | LifecycleState::Loaded
                | LifecycleState::Failed
        )
    }
}

/// A plugin together with its gate and storage handle
pub struct PluginInstance {
    plugin: Box<dyn Plugin>,
    gate: CallGate,
    storage: Arc<dyn Storage>,
    state: LifecycleState,
}

impl PluginInstance {
    pub fn new(plugin: Box<dyn Plugin>, storage: Arc<dyn Storage>, policy: RetryPolicy) -> Self {
        let gate = CallGate::new(plugin.descriptor().rate_limit, policy);
        Self {
            plugin,
            gate,
            storage,
            state: LifecycleState::Idle,
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        self.plugin.descriptor()
    }

    pub fn name(&self) -> &str {
        &self.plugin.descriptor().name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn get_dependencies(&self) -> Vec<String> {
        self.plugin.get_dependencies()
    }

    fn advance(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(plugin = %self.name(), from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }

    /// Pull data through the gate; exhausted retries become `HubError::Extraction`
    pub async fn extract(&mut self, params: &ExtractParams) -> Attempted<TabularResult> {
        let plugin = &self.plugin;
        let name = plugin.descriptor().name.clone();
        let attempted = self.gate.call(&name, || plugin.fetch(params)).await;

        let attempts = attempted.attempts;
        let result = attempted.result.map_err(|e| HubError::Extraction {
            plugin: name,
            attempts,
            message: e.to_string(),
        });
        Attempted { result, attempts }
    }

    pub fn transform(&self, data: TabularResult) -> Result<TabularResult> {
        self.plugin
            .transform(data)
            .map_err(|e| HubError::Transform(format!("{}: {}", self.name(), e)))
    }

    pub fn validate(&self, data: &TabularResult) -> bool {
        self.plugin.validate(data)
    }

    /// Append system columns and write to the target table. Never returns an error:
    /// storage failures are logged and reported as a failed outcome.
    pub async fn load(&self, data: TabularResult) -> LoadOutcome {
        let table = self.plugin.target_table().to_string();
        let rows = data.height();

        let stamped = match data.with_system_columns(Utc::now()) {
            Ok(stamped) => stamped,
            Err(e) => {
                error!(plugin = %self.name(), table = %table, error = %e, "Failed to stamp system columns");
                return LoadOutcome::failed(
                    HubError::Load {
                        table,
                        message: e.to_string(),
                    }
                    .to_string(),
                );
            }
        };

        let settings = InsertSettings::default();
        match self
            .storage
            .insert_dataframe(&table, &stamped, Some(&settings))
            .await
        {
            Ok(()) => {
                info!(plugin = %self.name(), table = %table, rows, "Loaded records");
                LoadOutcome::success(rows)
            }
            Err(e) => {
                error!(plugin = %self.name(), table = %table, error = %e, "Storage rejected load");
                LoadOutcome::failed(
                    HubError::Load {
                        table,
                        message: e.to_string(),
                    }
                    .to_string(),
                )
            }
        }
    }

    /// Drive one full lifecycle. Always returns a result; nothing escapes.
    pub async fn run(&mut self, params: &ExtractParams) -> RunResult {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        self.state = LifecycleState::Idle;

        info!(plugin = %self.name(), %run_id, "Starting run");

        self.advance(LifecycleState::Extracting);
        let extracted = self.extract(params).await;
        let attempts = extracted.attempts;

        let outcome = match extracted.result {
            Err(e) => {
                warn!(plugin = %self.name(), error = %e, "Extraction failed");
                self.advance(LifecycleState::Failed);
                LoadOutcome::failed(e.to_string())
            }
            Ok(data) if data.is_empty() => {
                info!(plugin = %self.name(), "No data returned");
                self.advance(LifecycleState::Empty);
                LoadOutcome::no_data()
            }
            Ok(data) => {
                self.advance(LifecycleState::NonEmpty);
                self.process(data).await
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            plugin = %self.name(),
            %run_id,
            status = %outcome.status,
            records = outcome.loaded_records,
            elapsed_ms,
            attempts,
            "Run finished"
        );

        RunResult {
            run_id,
            plugin: self.name().to_string(),
            outcome,
            final_state: self.state,
            elapsed_ms,
            attempts,
        }
    }

    async fn process(&mut self, data: TabularResult) -> LoadOutcome {
        self.advance(LifecycleState::Transforming);
        let data = match self.transform(data) {
            Ok(data) => data,
            Err(e) => {
                warn!(plugin = %self.name(), error = %e, "Transform failed");
                self.advance(LifecycleState::Failed);
                return LoadOutcome::failed(e.to_string());
            }
        };
        self.advance(LifecycleState::Transformed);

        self.advance(LifecycleState::Validating);
        if !self.validate(&data) {
            let issues = validation_issues(self.plugin.as_ref(), &data);
            let message = if issues.is_empty() {
                format!("validation failed for {}: plugin checks rejected the data", self.name())
            } else {
                format!("validation failed for {}: {}", self.name(), issues.join("; "))
            };
            warn!(plugin = %self.name(), reason = %message, "Data rejected");
            self.advance(LifecycleState::Invalid);
            return LoadOutcome::failed(message);
        }
        self.advance(LifecycleState::Valid);

        self.advance(LifecycleState::Loading);
        let outcome = self.load(data).await;
        if outcome.is_success() {
            self.advance(LifecycleState::Loaded);
        } else {
            self.advance(LifecycleState::Failed);
        }
        outcome
    }
}
