//! Models under trial and the graph they are compiled from.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Opaque metric value reported by a trainer. The engine never inspects it.
pub type MetricData = serde_json::Value;

/// Keyword arguments handed to a trainer.
pub type TrainingKwargs = serde_json::Map<String, serde_json::Value>;

/// Lifecycle of a model in the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Submitted, no outcome yet.
    #[default]
    Waiting,
    /// Picked up by a runner.
    Running,
    /// Trial finished successfully.
    Trained,
    /// Trial finished with an error.
    Failed,
}

impl ModelStatus {
    /// Whether the status is final for the trial.
    pub fn is_terminal(self) -> bool {
        matches!(self, ModelStatus::Trained | ModelStatus::Failed)
    }
}

/// One operation in a model graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique node name within the graph.
    pub name: String,
    /// Operation type, e.g. `linear` or `relu`.
    pub op: String,
    /// Operation attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

/// Computational graph of a model variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelGraph {
    /// Human readable model name.
    pub name: String,
    /// Nodes in definition order.
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Directed edges as `(from, to)` node names.
    #[serde(default)]
    pub edges: Vec<(String, String)>,
}

/// Which trainer runs the model and with which arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Trainer reference resolved by the runner.
    pub module: String,
    /// Arguments passed to the trainer.
    #[serde(default)]
    pub kwargs: TrainingKwargs,
}

#[derive(Debug, Default)]
struct ModelState {
    status: ModelStatus,
    intermediate_metrics: Vec<MetricData>,
    metric: Option<MetricData>,
}

/// A model being trialed.
///
/// Graph and training config are fixed at construction; status and metrics are
/// updated by the engine from trial events and may be read concurrently.
#[derive(Debug)]
pub struct Model {
    graph: ModelGraph,
    training_config: TrainingConfig,
    state: Mutex<ModelState>,
}

impl Model {
    /// Create a waiting model.
    pub fn new(graph: ModelGraph, training_config: TrainingConfig) -> Self {
        Self {
            graph,
            training_config,
            state: Mutex::new(ModelState::default()),
        }
    }

    /// The model graph.
    pub fn graph(&self) -> &ModelGraph {
        &self.graph
    }

    /// The training configuration.
    pub fn training_config(&self) -> &TrainingConfig {
        &self.training_config
    }

    /// Current status.
    pub fn status(&self) -> ModelStatus {
        self.state.lock().status
    }

    /// Snapshot of the intermediate metrics, oldest first.
    pub fn intermediate_metrics(&self) -> Vec<MetricData> {
        self.state.lock().intermediate_metrics.clone()
    }

    /// Latest final metric, if any.
    pub fn metric(&self) -> Option<MetricData> {
        self.state.lock().metric.clone()
    }

    pub(crate) fn set_status(&self, status: ModelStatus) {
        self.state.lock().status = status;
    }

    pub(crate) fn push_intermediate_metric(&self, metric: MetricData) {
        self.state.lock().intermediate_metrics.push(metric);
    }

    pub(crate) fn set_metric(&self, metric: MetricData) {
        self.state.lock().metric = Some(metric);
    }
}
