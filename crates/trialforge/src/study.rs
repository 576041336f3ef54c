use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use trialforge_engine::{MetricData, Model, ModelGraph, TrainingConfig};

use crate::format::metric_scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Maximize,
    Minimize,
}

impl Direction {
    /// Whether `candidate` beats `best`. Non-scalar metrics never win.
    pub fn improves(self, candidate: &MetricData, best: Option<&MetricData>) -> bool {
        let Some(candidate) = metric_scalar(candidate) else {
            return false;
        };
        let Some(best) = best.and_then(metric_scalar) else {
            return true;
        };
        match self {
            Direction::Maximize => candidate > best,
            Direction::Minimize => candidate < best,
        }
    }
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudyModel {
    pub graph: ModelGraph,
    pub training: TrainingConfig,
    #[serde(default = "one")]
    pub repeat: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Study {
    pub name: String,
    #[serde(default)]
    pub optimize: Direction,
    pub models: Vec<StudyModel>,
}

impl Study {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read study file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("study file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let study: Study = serde_json::from_str(raw).context("parse study")?;
        study.validate()?;
        Ok(study)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.models.is_empty() {
            anyhow::bail!("study {:?} has no models", self.name);
        }
        for (idx, model) in self.models.iter().enumerate() {
            if model.repeat == 0 {
                anyhow::bail!("model #{idx} ({}): repeat must be >= 1", model.graph.name);
            }
            if model.training.module.trim().is_empty() {
                anyhow::bail!(
                    "model #{idx} ({}): training module is empty",
                    model.graph.name
                );
            }
        }
        Ok(())
    }

    /// One independent model instance per requested trial.
    pub fn instantiate(&self) -> Vec<Arc<Model>> {
        self.models
            .iter()
            .flat_map(|m| {
                (0..m.repeat).map(|_| Arc::new(Model::new(m.graph.clone(), m.training.clone())))
            })
            .collect()
    }

    pub fn trial_count(&self) -> usize {
        self.models.iter().map(|m| m.repeat as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const STUDY: &str = r#"{
        "name": "mlp-width",
        "optimize": "minimize",
        "models": [
            {
                "graph": {
                    "name": "narrow",
                    "nodes": [{ "name": "fc", "op": "linear", "attrs": { "out_features": 16 } }]
                },
                "training": { "module": "builtin.synthetic", "kwargs": { "epochs": 2 } },
                "repeat": 2
            },
            {
                "graph": {
                    "name": "wide",
                    "nodes": [{ "name": "fc", "op": "linear", "attrs": { "out_features": 256 } }]
                },
                "training": { "module": "builtin.synthetic" }
            }
        ]
    }"#;

    #[test]
    fn parse_expands_repeats_into_distinct_models() {
        let study = Study::parse(STUDY).unwrap();
        assert_eq!(study.optimize, Direction::Minimize);
        assert_eq!(study.trial_count(), 3);

        let models = study.instantiate();
        assert_eq!(models.len(), 3);
        assert!(!Arc::ptr_eq(&models[0], &models[1]));
        assert_eq!(models[1].graph().name, "narrow");
        assert_eq!(models[2].graph().name, "wide");
        assert!(models[2].training_config().kwargs.is_empty());
    }

    #[test]
    fn validation_rejects_empty_and_zero_repeat() {
        let err = Study::parse(r#"{ "name": "x", "models": [] }"#).unwrap_err();
        assert!(format!("{err:#}").contains("no models"));

        let raw = r#"{ "name": "x", "models": [
            { "graph": { "name": "g" }, "training": { "module": "m" }, "repeat": 0 }
        ] }"#;
        let err = Study::parse(raw).unwrap_err();
        assert!(format!("{err:#}").contains("repeat"));

        let raw = r#"{ "name": "x", "models": [
            { "graph": { "name": "g" }, "training": { "module": " " } }
        ] }"#;
        assert!(Study::parse(raw).is_err());
    }

    #[test]
    fn direction_compares_scalars() {
        assert!(Direction::Maximize.improves(&json!(0.5), None));
        assert!(Direction::Maximize.improves(&json!(0.6), Some(&json!(0.5))));
        assert!(!Direction::Maximize.improves(&json!(0.4), Some(&json!(0.5))));
        assert!(Direction::Minimize.improves(&json!({ "default": 0.4 }), Some(&json!(0.5))));
        assert!(!Direction::Minimize.improves(&json!("n/a"), None));
    }
}
