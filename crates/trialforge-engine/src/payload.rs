//! Serializable bundle that tells a runner what to execute for one trial.

use serde::{Deserialize, Serialize};

use crate::graph::TrainingKwargs;

/// Everything the out-of-process runner needs to execute one trial.
///
/// The wire form is a record with exactly three fields: `model_script`,
/// `training_module` and `training_kwargs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrialPayload {
    model_script: String,
    training_module: String,
    training_kwargs: TrainingKwargs,
}

impl TrialPayload {
    /// Bundle a compiled model script with its training configuration.
    pub fn new(
        model_script: impl Into<String>,
        training_module: impl Into<String>,
        training_kwargs: TrainingKwargs,
    ) -> Self {
        Self {
            model_script: model_script.into(),
            training_module: training_module.into(),
            training_kwargs,
        }
    }

    /// Generated model source.
    pub fn model_script(&self) -> &str {
        &self.model_script
    }

    /// Trainer reference.
    pub fn training_module(&self) -> &str {
        &self.training_module
    }

    /// Trainer arguments.
    pub fn training_kwargs(&self) -> &TrainingKwargs {
        &self.training_kwargs
    }

    /// Encode into the wire record.
    pub fn dump(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Decode from the wire record.
    pub fn load(data: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(data)
    }
}
