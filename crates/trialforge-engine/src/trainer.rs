//! Trainers resolved by name on the runner side.

use std::collections::BTreeMap;

use crate::error::BoxError;
use crate::graph::{MetricData, ModelGraph, TrainingKwargs};

/// Sink for metrics produced while a trial runs.
pub trait MetricReporter {
    /// Report a metric for the epoch or step just finished.
    fn report_intermediate(&mut self, metric: MetricData);

    /// Report the metric the trial is judged by.
    fn report_final(&mut self, metric: MetricData);
}

/// Trains one model instance.
pub trait Trainer {
    /// Run training to completion.
    fn fit(&mut self, reporter: &mut dyn MetricReporter) -> Result<(), BoxError>;
}

/// Builds a trainer for a loaded model with the trial's kwargs.
pub type TrainerFactory = fn(ModelGraph, &TrainingKwargs) -> Result<Box<dyn Trainer>, BoxError>;

/// Name to trainer factory table.
#[derive(Debug, Clone, Default)]
pub struct TrainerRegistry {
    factories: BTreeMap<String, TrainerFactory>,
}

impl TrainerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `module`, replacing any previous entry.
    pub fn register(&mut self, module: impl Into<String>, factory: TrainerFactory) -> &mut Self {
        self.factories.insert(module.into(), factory);
        self
    }

    /// Factory registered under `module`.
    pub fn resolve(&self, module: &str) -> Option<TrainerFactory> {
        self.factories.get(module).copied()
    }

    /// Registered module names.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
