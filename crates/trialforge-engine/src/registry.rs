//! Trial identifier to model mapping.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::advisor::TrialId;
use crate::error::EngineError;
use crate::graph::Model;

/// Maps every submitted trial to the model it trains.
///
/// Entries are only ever added. Removing finished trials is left to the owner
/// of the search.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<TrialId, Arc<Model>>>,
}

impl ModelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `model` under `trial_id`. Identifiers are never reassigned.
    pub fn insert(&self, trial_id: TrialId, model: Arc<Model>) -> Result<(), EngineError> {
        let mut models = self.models.write();
        if models.contains_key(&trial_id) {
            return Err(EngineError::DuplicateTrial(trial_id));
        }
        models.insert(trial_id, model);
        Ok(())
    }

    /// Model for `trial_id`.
    pub fn get(&self, trial_id: TrialId) -> Result<Arc<Model>, EngineError> {
        self.models
            .read()
            .get(&trial_id)
            .cloned()
            .ok_or(EngineError::UnknownTrial(trial_id))
    }

    /// Number of registered trials.
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// Whether no trial has been registered.
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }

    /// Registered identifiers in ascending order.
    pub fn trial_ids(&self) -> Vec<TrialId> {
        let mut ids: Vec<TrialId> = self.models.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
