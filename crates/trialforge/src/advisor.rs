use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use trialforge_engine::{Advisor, BoxError, TrialEventHandler, TrialId};

use crate::protocol::TrialSpec;

/// In-process advisor: queues submitted trials until the controller hands them
/// to a free worker, and relays worker outcomes to the subscribed engine.
#[derive(Default)]
pub struct LocalAdvisor {
    next_id: AtomicU64,
    pending: Mutex<VecDeque<TrialSpec>>,
    handler: Mutex<Option<Weak<dyn TrialEventHandler>>>,
}

impl LocalAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The subscribed engine, if it is still alive.
    pub fn handler(&self) -> Option<Arc<dyn TrialEventHandler>> {
        self.handler.lock().as_ref().and_then(Weak::upgrade)
    }

    pub fn next_pending(&self) -> Option<TrialSpec> {
        self.pending.lock().pop_front()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn clear_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }
}

impl Advisor for LocalAdvisor {
    fn send_trial(&self, parameters: serde_json::Value) -> Result<TrialId, BoxError> {
        let trial_id = TrialId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.lock().push_back(TrialSpec {
            trial_id,
            parameters,
        });
        Ok(trial_id)
    }

    fn register_handler(&self, handler: Weak<dyn TrialEventHandler>) {
        *self.handler.lock() = Some(handler);
    }
}
