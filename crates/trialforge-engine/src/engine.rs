//! Execution engine without any cross-trial optimization.

use std::sync::{Arc, Weak};

use crate::advisor::{Advisor, TrialEventHandler, TrialId};
use crate::compiler::{GraphScriptCompiler, ModelCompiler};
use crate::error::EngineError;
use crate::graph::{MetricData, Model, ModelStatus};
use crate::ledger::{Consumption, ResourceLedger};
use crate::listener::{GraphListener, ListenerBus};
use crate::payload::TrialPayload;
use crate::registry::ModelRegistry;

/// Submits models as trials and reports their outcomes.
pub trait ExecutionEngine: Send + Sync {
    /// Submit every model as one trial; returns the identifiers in input order.
    ///
    /// Submission stops at the first failing model. Models sent before it stay
    /// queued with the advisor and registered with the engine, so their trials
    /// still report through [`TrialEventHandler`]; use the engine's inspection
    /// helpers to recover their identifiers.
    fn submit_models(&self, models: &[Arc<Model>]) -> Result<Vec<TrialId>, EngineError>;

    /// Register a listener for trial outcomes.
    fn register_graph_listener(&self, listener: Arc<dyn GraphListener>);

    /// Resource units currently available for dispatch.
    fn query_available_resource(&self) -> i64;
}

/// Engine that ships each model as-is and mirrors the advisor's resources.
///
/// The engine subscribes itself to the advisor on construction. All state is
/// private to the engine and safe to touch from concurrent event handlers.
pub struct BaseExecutionEngine {
    advisor: Arc<dyn Advisor>,
    compiler: Box<dyn ModelCompiler>,
    models: ModelRegistry,
    ledger: ResourceLedger,
    listeners: ListenerBus,
}

impl BaseExecutionEngine {
    /// Engine that compiles models with [`GraphScriptCompiler`].
    pub fn new(advisor: Arc<dyn Advisor>) -> Arc<Self> {
        Self::with_compiler(advisor, GraphScriptCompiler)
    }

    /// Engine with a custom model compiler.
    pub fn with_compiler(
        advisor: Arc<dyn Advisor>,
        compiler: impl ModelCompiler + 'static,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            advisor,
            compiler: Box::new(compiler),
            models: ModelRegistry::new(),
            ledger: ResourceLedger::new(),
            listeners: ListenerBus::new(),
        });
        let weak: Weak<Self> = Arc::downgrade(&engine);
        let handler: Weak<dyn TrialEventHandler> = weak;
        engine.advisor.register_handler(handler);
        engine
    }

    /// Build the payload a runner needs for `model`.
    pub fn compile(&self, model: &Model) -> Result<TrialPayload, EngineError> {
        let script = self.compiler.compile(model).map_err(EngineError::Compile)?;
        let config = model.training_config();
        Ok(TrialPayload::new(
            script,
            config.module.clone(),
            config.kwargs.clone(),
        ))
    }

    /// Model trained by `trial_id`.
    pub fn model(&self, trial_id: TrialId) -> Result<Arc<Model>, EngineError> {
        self.models.get(trial_id)
    }

    /// Number of trials submitted so far.
    pub fn trial_count(&self) -> usize {
        self.models.len()
    }

    /// Identifiers of all submitted trials, ascending.
    pub fn trial_ids(&self) -> Vec<TrialId> {
        self.models.trial_ids()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of dispatches seen while no resource was available.
    pub fn resource_anomalies(&self) -> u64 {
        self.ledger.anomaly_count()
    }
}

impl ExecutionEngine for BaseExecutionEngine {
    fn submit_models(&self, models: &[Arc<Model>]) -> Result<Vec<TrialId>, EngineError> {
        let mut ids = Vec::with_capacity(models.len());
        for model in models {
            let parameters = self.compile(model)?.dump()?;
            let trial_id = self
                .advisor
                .send_trial(parameters)
                .map_err(EngineError::Advisor)?;
            self.models.insert(trial_id, model.clone())?;
            log::debug!("submitted model {} as trial {trial_id}", model.graph().name);
            ids.push(trial_id);
        }
        Ok(ids)
    }

    fn register_graph_listener(&self, listener: Arc<dyn GraphListener>) {
        self.listeners.register(listener);
    }

    fn query_available_resource(&self) -> i64 {
        self.ledger.available()
    }
}

impl TrialEventHandler for BaseExecutionEngine {
    fn on_request_trial_jobs(&self, num_trials: u32) {
        let available = self.ledger.grant(num_trials);
        log::info!("on_resource_available: {available}");
    }

    fn on_send_trial(&self, _parameters: &serde_json::Value) {
        let consumption = self.ledger.consume();
        if let Consumption::Overdrawn { .. } = consumption {
            log::warn!("There is no available resource, but trial is submitted.");
        }
        log::info!("on_resource_used: {}", consumption.remaining());
    }

    fn on_trial_end(&self, trial_id: TrialId, success: bool) -> Result<(), EngineError> {
        let model = self.models.get(trial_id)?;
        model.set_status(if success {
            ModelStatus::Trained
        } else {
            ModelStatus::Failed
        });
        self.listeners.training_end(&model, success)
    }

    fn on_intermediate_metric(
        &self,
        trial_id: TrialId,
        metric: MetricData,
    ) -> Result<(), EngineError> {
        let model = self.models.get(trial_id)?;
        model.push_intermediate_metric(metric.clone());
        self.listeners.intermediate_metric(&model, &metric)
    }

    fn on_final_metric(&self, trial_id: TrialId, metric: MetricData) -> Result<(), EngineError> {
        let model = self.models.get(trial_id)?;
        model.set_metric(metric.clone());
        self.listeners.metric(&model, &metric)
    }
}

impl std::fmt::Debug for BaseExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseExecutionEngine")
            .field("models", &self.models)
            .field("ledger", &self.ledger)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}
