use std::time::Duration;

use serde_json::json;

use trialforge_engine::{
    BoxError, MetricReporter, ModelGraph, Trainer, TrainerRegistry, TrainingKwargs,
};

pub const SYNTHETIC: &str = "builtin.synthetic";
pub const FAILING: &str = "builtin.failing";
pub const CRASHING: &str = "builtin.crashing";
/// Exit status of a worker taken down by [`CRASHING`].
pub const CRASH_EXIT_CODE: i32 = 70;

pub fn builtin_trainers() -> TrainerRegistry {
    let mut registry = TrainerRegistry::new();
    registry
        .register(SYNTHETIC, SyntheticTrainer::build)
        .register(FAILING, FailingTrainer::build)
        .register(CRASHING, CrashingTrainer::build);
    registry
}

fn kwarg_u64(kwargs: &TrainingKwargs, key: &str, default: u64) -> Result<u64, BoxError> {
    match kwargs.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| format!("{key} must be a non-negative integer, got {v}").into()),
    }
}

fn kwarg_f64(kwargs: &TrainingKwargs, key: &str, default: f64) -> Result<f64, BoxError> {
    match kwargs.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| format!("{key} must be a number, got {v}").into()),
    }
}

/// Deterministic stand-in for real training: accuracy rises with epochs,
/// learning rate and graph width.
#[derive(Debug)]
pub struct SyntheticTrainer {
    capacity: f64,
    epochs: u64,
    learning_rate: f64,
    epoch_time: Duration,
}

impl SyntheticTrainer {
    fn build(graph: ModelGraph, kwargs: &TrainingKwargs) -> Result<Box<dyn Trainer>, BoxError> {
        if graph.nodes.is_empty() {
            return Err(format!("model {:?} has no nodes", graph.name).into());
        }
        let epochs = kwarg_u64(kwargs, "epochs", 3)?;
        if epochs == 0 {
            return Err("epochs must be >= 1".into());
        }
        let learning_rate = kwarg_f64(kwargs, "learning_rate", 0.1)?;
        if learning_rate.is_nan() || learning_rate <= 0.0 {
            return Err(format!("learning_rate must be > 0, got {learning_rate}").into());
        }
        let epoch_time = Duration::from_millis(kwarg_u64(kwargs, "epoch_ms", 0)?);

        Ok(Box::new(Self {
            capacity: graph_capacity(&graph),
            epochs,
            learning_rate,
            epoch_time,
        }))
    }

    fn accuracy_after(&self, epochs_done: u64) -> f64 {
        let progress = self.learning_rate * epochs_done as f64 * (1.0 + self.capacity).ln();
        1.0 - (-progress).exp()
    }
}

impl Trainer for SyntheticTrainer {
    fn fit(&mut self, reporter: &mut dyn MetricReporter) -> Result<(), BoxError> {
        let mut accuracy = 0.0;
        for epoch in 1..=self.epochs {
            if !self.epoch_time.is_zero() {
                std::thread::sleep(self.epoch_time);
            }
            accuracy = self.accuracy_after(epoch);
            reporter.report_intermediate(json!(accuracy));
        }
        reporter.report_final(json!(accuracy));
        Ok(())
    }
}

/// Width proxy: sum of the `out_features`/`units` attributes, one per node without them.
fn graph_capacity(graph: &ModelGraph) -> f64 {
    graph
        .nodes
        .iter()
        .map(|node| {
            node.attrs
                .get("out_features")
                .or_else(|| node.attrs.get("units"))
                .and_then(|v| v.as_f64())
                .unwrap_or(1.0)
        })
        .sum()
}

#[derive(Debug)]
pub struct FailingTrainer;

impl FailingTrainer {
    fn build(_graph: ModelGraph, _kwargs: &TrainingKwargs) -> Result<Box<dyn Trainer>, BoxError> {
        Ok(Box::new(Self))
    }
}

impl Trainer for FailingTrainer {
    fn fit(&mut self, _reporter: &mut dyn MetricReporter) -> Result<(), BoxError> {
        Err(format!("{FAILING} always fails").into())
    }
}

/// Takes the whole worker process down mid-trial without reporting back.
#[derive(Debug)]
pub struct CrashingTrainer;

impl CrashingTrainer {
    fn build(_graph: ModelGraph, _kwargs: &TrainingKwargs) -> Result<Box<dyn Trainer>, BoxError> {
        Ok(Box::new(Self))
    }
}

impl Trainer for CrashingTrainer {
    fn fit(&mut self, _reporter: &mut dyn MetricReporter) -> Result<(), BoxError> {
        eprintln!("{CRASHING}: exiting worker process");
        std::process::exit(CRASH_EXIT_CODE)
    }
}
