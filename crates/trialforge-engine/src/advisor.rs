//! Boundary with the advisor that owns the search and dispatches trials.

use std::sync::Weak;

use serde::{Deserialize, Serialize};

use crate::error::{BoxError, EngineError};
use crate::graph::MetricData;

/// Identifier the advisor assigns to a submitted trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialId(u64);

impl TrialId {
    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TrialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events the advisor delivers to the execution engine.
///
/// The advisor decides the order and the thread each event arrives on.
pub trait TrialEventHandler: Send + Sync {
    /// `num_trials` more resource units are available for dispatch.
    fn on_request_trial_jobs(&self, num_trials: u32);

    /// A trial with `parameters` was dispatched, consuming one unit.
    fn on_send_trial(&self, parameters: &serde_json::Value);

    /// A dispatched trial finished.
    fn on_trial_end(&self, trial_id: TrialId, success: bool) -> Result<(), EngineError>;

    /// A trial reported an intermediate metric.
    fn on_intermediate_metric(
        &self,
        trial_id: TrialId,
        metric: MetricData,
    ) -> Result<(), EngineError>;

    /// A trial reported its final metric.
    fn on_final_metric(&self, trial_id: TrialId, metric: MetricData) -> Result<(), EngineError>;
}

/// Submission side of the advisor.
pub trait Advisor: Send + Sync {
    /// Queue a trial with the given serialized payload and return its identifier.
    fn send_trial(&self, parameters: serde_json::Value) -> Result<TrialId, BoxError>;

    /// Subscribe `handler` to trial events. The advisor must not keep the
    /// handler alive; events after the handler is dropped are discarded.
    fn register_handler(&self, handler: Weak<dyn TrialEventHandler>);
}

/// Execution-side source of the parameters of the trial being run.
pub trait TrialParameterSource {
    /// Parameters of the current trial, as passed to [`Advisor::send_trial`].
    fn receive_trial_parameters(&mut self) -> Result<serde_json::Value, BoxError>;
}

impl TrialParameterSource for serde_json::Value {
    fn receive_trial_parameters(&mut self) -> Result<serde_json::Value, BoxError> {
        Ok(std::mem::take(self))
    }
}
