//! Error taxonomy for the engine and the trial runner.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::advisor::TrialId;

/// Boxed error produced by a collaborator (advisor, listener, trainer).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Listener callback that failed during fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEvent {
    /// `on_training_end`.
    TrainingEnd,
    /// `on_intermediate_metric`.
    IntermediateMetric,
    /// `on_metric`.
    Metric,
}

impl std::fmt::Display for ListenerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ListenerEvent::TrainingEnd => "on_training_end",
            ListenerEvent::IntermediateMetric => "on_intermediate_metric",
            ListenerEvent::Metric => "on_metric",
        })
    }
}

/// Errors surfaced by [`BaseExecutionEngine`](crate::BaseExecutionEngine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// An event referenced a trial that was never submitted.
    #[error("unknown trial {0}")]
    UnknownTrial(TrialId),

    /// The advisor handed out an identifier that is already registered.
    #[error("trial {0} is already registered")]
    DuplicateTrial(TrialId),

    /// The model could not be compiled into a trial payload.
    #[error("compile model: {0}")]
    Compile(#[source] BoxError),

    /// The advisor refused the trial.
    #[error("advisor rejected trial: {0}")]
    Advisor(#[source] BoxError),

    /// The payload could not be encoded or decoded.
    #[error("trial payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A listener callback failed; remaining listeners were not notified.
    #[error("listener failed in {event}: {source}")]
    Listener {
        /// Callback that failed.
        event: ListenerEvent,
        /// Error returned by the listener.
        #[source]
        source: BoxError,
    },
}

/// Errors raised while executing one trial on the runner side.
///
/// Every variant is fatal to the trial it came from and to nothing else.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The received parameters are not a valid trial payload.
    #[error("trial payload: {0}")]
    Payload(#[source] BoxError),

    /// Writing, reading or removing the generated artifact failed.
    #[error("generated artifact {}: {source}", path.display())]
    ArtifactIo {
        /// Artifact location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The generated artifact does not contain a loadable model.
    #[error("load model from {}: {reason}", path.display())]
    ModelLoad {
        /// Artifact location.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// No trainer is registered under the requested training module.
    #[error("unknown training module {0:?}")]
    UnknownTrainer(String),

    /// The trainer rejected the model or its kwargs.
    #[error("trainer init: {0}")]
    TrainerInit(#[source] BoxError),

    /// The trainer failed while fitting.
    #[error("training failed: {0}")]
    Training(#[source] BoxError),
}
