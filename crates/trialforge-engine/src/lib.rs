#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Trial execution engine: submits models to an advisor, mirrors its resource
//! budget, and fans trial outcomes out to listeners. Also hosts the runner-side
//! entrypoint that executes one trial.

mod advisor;
mod artifact;
mod compiler;
mod engine;
mod error;
mod graph;
mod ledger;
mod listener;
mod payload;
mod registry;
mod runner;
mod trainer;

pub use advisor::{Advisor, TrialEventHandler, TrialId, TrialParameterSource};
pub use artifact::GeneratedModule;
pub use compiler::{GRAPH_SCRIPT_FORMAT, GraphScriptCompiler, ModelCompiler, parse_graph_script};
pub use engine::{BaseExecutionEngine, ExecutionEngine};
pub use error::{BoxError, EngineError, ListenerEvent, RunnerError};
pub use graph::{
    GraphNode, MetricData, Model, ModelGraph, ModelStatus, TrainingConfig, TrainingKwargs,
};
pub use ledger::{Consumption, ResourceLedger};
pub use listener::{GraphListener, ListenerBus};
pub use payload::TrialPayload;
pub use registry::ModelRegistry;
pub use runner::{ExecutedTrial, trial_execute_graph};
pub use trainer::{MetricReporter, Trainer, TrainerFactory, TrainerRegistry};
