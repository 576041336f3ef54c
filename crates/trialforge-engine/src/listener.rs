//! Observers of trial lifecycle and metric events.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{BoxError, EngineError, ListenerEvent};
use crate::graph::{MetricData, Model};

/// Receives trial outcomes from the engine.
///
/// Callbacks run synchronously on the thread that delivered the event and
/// should return quickly. Every method defaults to doing nothing.
pub trait GraphListener: Send + Sync {
    /// A trial of `model` finished.
    fn on_training_end(&self, model: &Model, success: bool) -> Result<(), BoxError> {
        let _ = (model, success);
        Ok(())
    }

    /// A trial of `model` reported an intermediate metric.
    fn on_intermediate_metric(&self, model: &Model, metric: &MetricData) -> Result<(), BoxError> {
        let _ = (model, metric);
        Ok(())
    }

    /// A trial of `model` reported its final metric.
    fn on_metric(&self, model: &Model, metric: &MetricData) -> Result<(), BoxError> {
        let _ = (model, metric);
        Ok(())
    }
}

/// Ordered, append-only set of listeners.
///
/// Fan-out visits listeners in registration order and stops at the first
/// failure, which is returned to the caller.
#[derive(Default)]
pub struct ListenerBus {
    listeners: RwLock<Vec<Arc<dyn GraphListener>>>,
}

impl ListenerBus {
    /// Bus without listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.
    pub fn register(&self, listener: Arc<dyn GraphListener>) {
        self.listeners.write().push(listener);
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Notify every listener that a trial of `model` ended.
    pub fn training_end(&self, model: &Model, success: bool) -> Result<(), EngineError> {
        self.fan_out(ListenerEvent::TrainingEnd, |l| {
            l.on_training_end(model, success)
        })
    }

    /// Notify every listener of an intermediate metric.
    pub fn intermediate_metric(
        &self,
        model: &Model,
        metric: &MetricData,
    ) -> Result<(), EngineError> {
        self.fan_out(ListenerEvent::IntermediateMetric, |l| {
            l.on_intermediate_metric(model, metric)
        })
    }

    /// Notify every listener of a final metric.
    pub fn metric(&self, model: &Model, metric: &MetricData) -> Result<(), EngineError> {
        self.fan_out(ListenerEvent::Metric, |l| l.on_metric(model, metric))
    }

    fn fan_out<F>(&self, event: ListenerEvent, mut notify: F) -> Result<(), EngineError>
    where
        F: FnMut(&dyn GraphListener) -> Result<(), BoxError>,
    {
        // Snapshot so a listener may register another listener without deadlocking.
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            notify(listener.as_ref()).map_err(|source| EngineError::Listener { event, source })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ListenerBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerBus")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::sample_model;
    use parking_lot::Mutex;

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl GraphListener for Tagged {
        fn on_training_end(&self, _model: &Model, _success: bool) -> Result<(), BoxError> {
            self.log.lock().push(self.tag);
            if self.fail {
                return Err(format!("{} failed", self.tag).into());
            }
            Ok(())
        }
    }

    fn tagged(
        tag: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    ) -> Arc<dyn GraphListener> {
        Arc::new(Tagged {
            tag,
            log: log.clone(),
            fail,
        })
    }

    #[test]
    fn fan_out_follows_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = ListenerBus::new();
        bus.register(tagged("l1", &log, false));
        bus.register(tagged("l2", &log, false));
        bus.register(tagged("l3", &log, false));

        bus.training_end(&sample_model("m"), true).unwrap();
        assert_eq!(*log.lock(), vec!["l1", "l2", "l3"]);
    }

    #[test]
    fn failure_stops_remaining_listeners() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = ListenerBus::new();
        bus.register(tagged("l1", &log, false));
        bus.register(tagged("l2", &log, true));
        bus.register(tagged("l3", &log, false));

        let err = bus.training_end(&sample_model("m"), false).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Listener {
                event: ListenerEvent::TrainingEnd,
                ..
            }
        ));
        assert_eq!(*log.lock(), vec!["l1", "l2"]);
    }

    #[test]
    fn default_callbacks_are_no_ops() {
        struct Silent;
        impl GraphListener for Silent {}

        let bus = ListenerBus::new();
        bus.register(Arc::new(Silent));
        let model = sample_model("m");
        let metric = serde_json::json!(0.5);
        bus.intermediate_metric(&model, &metric).unwrap();
        bus.metric(&model, &metric).unwrap();
        bus.training_end(&model, true).unwrap();
        assert_eq!(bus.len(), 1);
    }
}
