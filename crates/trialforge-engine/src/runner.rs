//! Runner-side entrypoint executed once per trial.

use std::path::Path;

use crate::advisor::TrialParameterSource;
use crate::artifact::GeneratedModule;
use crate::error::RunnerError;
use crate::payload::TrialPayload;
use crate::trainer::{MetricReporter, TrainerRegistry};

/// What a finished trial ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedTrial {
    /// Name of the generated module, unique per trial.
    pub module_name: String,
    /// Trainer that ran it.
    pub training_module: String,
    /// Name of the trained model graph.
    pub model_name: String,
}

/// Execute the trial whose parameters `source` provides.
///
/// The payload's model script is materialized in `workdir`, loaded, handed to
/// the trainer named by the payload and trained. Metrics go to `reporter`.
/// The generated artifact is removed before returning, on success and failure.
pub fn trial_execute_graph(
    source: &mut dyn TrialParameterSource,
    trainers: &TrainerRegistry,
    workdir: &Path,
    reporter: &mut dyn MetricReporter,
) -> Result<ExecutedTrial, RunnerError> {
    let parameters = source
        .receive_trial_parameters()
        .map_err(RunnerError::Payload)?;
    let payload = TrialPayload::load(parameters).map_err(|e| RunnerError::Payload(e.into()))?;

    let module = GeneratedModule::materialize(workdir, payload.model_script())?;
    let factory = trainers
        .resolve(payload.training_module())
        .ok_or_else(|| RunnerError::UnknownTrainer(payload.training_module().to_string()))?;
    let graph = module.load()?;
    let model_name = graph.name.clone();

    let mut trainer =
        factory(graph, payload.training_kwargs()).map_err(RunnerError::TrainerInit)?;
    trainer.fit(reporter).map_err(RunnerError::Training)?;

    Ok(ExecutedTrial {
        module_name: module.module_name().to_string(),
        training_module: payload.training_module().to_string(),
        model_name,
    })
}
