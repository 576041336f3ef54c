use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::json;

use trialforge_engine::{
    Advisor, BaseExecutionEngine, BoxError, EngineError, ExecutionEngine, GraphListener,
    GraphNode, MetricData, Model, ModelGraph, ModelStatus, TrainingConfig, TrainingKwargs,
    TrialEventHandler, TrialId, TrialPayload,
};

/// Advisor that hands out sequential ids and remembers what it was sent.
#[derive(Default)]
struct RecordingAdvisor {
    next_id: AtomicU64,
    sent: Mutex<Vec<(TrialId, serde_json::Value)>>,
    handler: Mutex<Option<Weak<dyn TrialEventHandler>>>,
}

impl RecordingAdvisor {
    fn handler(&self) -> Arc<dyn TrialEventHandler> {
        self.handler
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .expect("engine registered a live handler")
    }
}

impl Advisor for RecordingAdvisor {
    fn send_trial(&self, parameters: serde_json::Value) -> Result<TrialId, BoxError> {
        let id = TrialId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 100);
        self.sent.lock().push((id, parameters));
        Ok(id)
    }

    fn register_handler(&self, handler: Weak<dyn TrialEventHandler>) {
        *self.handler.lock() = Some(handler);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    End(&'static str, String, bool),
    Intermediate(&'static str, MetricData),
    Final(&'static str, MetricData),
}

struct Recorder {
    tag: &'static str,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl GraphListener for Recorder {
    fn on_training_end(&self, model: &Model, success: bool) -> Result<(), BoxError> {
        self.seen
            .lock()
            .push(Seen::End(self.tag, model.graph().name.clone(), success));
        Ok(())
    }

    fn on_intermediate_metric(&self, _model: &Model, metric: &MetricData) -> Result<(), BoxError> {
        self.seen
            .lock()
            .push(Seen::Intermediate(self.tag, metric.clone()));
        Ok(())
    }

    fn on_metric(&self, _model: &Model, metric: &MetricData) -> Result<(), BoxError> {
        self.seen.lock().push(Seen::Final(self.tag, metric.clone()));
        Ok(())
    }
}

fn model(name: &str) -> Arc<Model> {
    let graph = ModelGraph {
        name: name.to_string(),
        nodes: vec![GraphNode {
            name: "fc".to_string(),
            op: "linear".to_string(),
            attrs: Default::default(),
        }],
        edges: Vec::new(),
    };
    let mut kwargs = TrainingKwargs::new();
    kwargs.insert("epochs".to_string(), json!(3));
    Arc::new(Model::new(
        graph,
        TrainingConfig {
            module: "builtin.synthetic".to_string(),
            kwargs,
        },
    ))
}

fn setup() -> (Arc<RecordingAdvisor>, Arc<BaseExecutionEngine>) {
    let advisor = Arc::new(RecordingAdvisor::default());
    let engine = BaseExecutionEngine::new(advisor.clone());
    (advisor, engine)
}

#[test]
fn submitting_n_models_registers_n_trials() {
    let (advisor, engine) = setup();
    let models: Vec<_> = ["a", "b", "c"].into_iter().map(model).collect();

    let ids = engine.submit_models(&models).unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(engine.trial_count(), 3);

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 3);

    for (id, submitted) in ids.iter().zip(&models) {
        assert!(Arc::ptr_eq(&engine.model(*id).unwrap(), submitted));
    }

    let sent = advisor.sent.lock();
    assert_eq!(sent.len(), 3);
    let payload = TrialPayload::load(sent[1].1.clone()).unwrap();
    assert_eq!(payload.training_module(), "builtin.synthetic");
    assert!(payload.model_script().contains("\"b\""));
}

#[test]
fn duplicate_submission_shares_the_model() {
    let (_advisor, engine) = setup();
    let m = model("dup");
    let ids = engine.submit_models(&[m.clone(), m.clone()]).unwrap();
    assert_ne!(ids[0], ids[1]);
    assert!(Arc::ptr_eq(
        &engine.model(ids[0]).unwrap(),
        &engine.model(ids[1]).unwrap()
    ));
}

#[test]
fn resource_scenario_goes_negative_without_error() {
    let (advisor, engine) = setup();
    engine.submit_models(&[model("m")]).unwrap();
    let handler = advisor.handler();
    let params = json!({});

    handler.on_request_trial_jobs(2);
    handler.on_send_trial(&params);
    handler.on_send_trial(&params);
    assert_eq!(engine.query_available_resource(), 0);
    assert_eq!(engine.resource_anomalies(), 0);

    handler.on_send_trial(&params);
    assert_eq!(engine.query_available_resource(), -1);
    assert_eq!(engine.resource_anomalies(), 1);
}

#[test]
fn trial_end_updates_status_and_notifies_in_order() {
    let (advisor, engine) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    engine.register_graph_listener(Arc::new(Recorder {
        tag: "L1",
        seen: seen.clone(),
    }));
    engine.register_graph_listener(Arc::new(Recorder {
        tag: "L2",
        seen: seen.clone(),
    }));
    assert_eq!(engine.listener_count(), 2);

    let ids = engine.submit_models(&[model("ok"), model("bad")]).unwrap();
    let handler = advisor.handler();

    handler.on_trial_end(ids[0], true).unwrap();
    assert_eq!(engine.model(ids[0]).unwrap().status(), ModelStatus::Trained);
    handler.on_trial_end(ids[1], false).unwrap();
    assert_eq!(engine.model(ids[1]).unwrap().status(), ModelStatus::Failed);

    assert_eq!(
        *seen.lock(),
        vec![
            Seen::End("L1", "ok".to_string(), true),
            Seen::End("L2", "ok".to_string(), true),
            Seen::End("L1", "bad".to_string(), false),
            Seen::End("L2", "bad".to_string(), false),
        ]
    );
}

#[test]
fn metrics_append_and_overwrite() {
    let (advisor, engine) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    engine.register_graph_listener(Arc::new(Recorder {
        tag: "L",
        seen: seen.clone(),
    }));
    let ids = engine.submit_models(&[model("m")]).unwrap();
    let handler = advisor.handler();

    handler.on_intermediate_metric(ids[0], json!(0.1)).unwrap();
    handler
        .on_intermediate_metric(ids[0], json!({ "acc": 0.2, "loss": 1.5 }))
        .unwrap();
    handler.on_final_metric(ids[0], json!(0.3)).unwrap();
    handler.on_final_metric(ids[0], json!(0.4)).unwrap();

    let m = engine.model(ids[0]).unwrap();
    assert_eq!(
        m.intermediate_metrics(),
        vec![json!(0.1), json!({ "acc": 0.2, "loss": 1.5 })]
    );
    assert_eq!(m.metric(), Some(json!(0.4)));
    assert_eq!(seen.lock().len(), 4);
    assert_eq!(seen.lock()[3], Seen::Final("L", json!(0.4)));
}

#[test]
fn unknown_trial_mutates_nothing() {
    let (advisor, engine) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    engine.register_graph_listener(Arc::new(Recorder {
        tag: "L",
        seen: seen.clone(),
    }));
    let ids = engine.submit_models(&[model("m")]).unwrap();
    let handler = advisor.handler();
    handler.on_request_trial_jobs(1);

    let ghost = TrialId::new(9_999);
    assert!(matches!(
        handler.on_trial_end(ghost, true),
        Err(EngineError::UnknownTrial(id)) if id == ghost
    ));
    assert!(matches!(
        handler.on_intermediate_metric(ghost, json!(1)),
        Err(EngineError::UnknownTrial(_))
    ));
    assert!(matches!(
        handler.on_final_metric(ghost, json!(1)),
        Err(EngineError::UnknownTrial(_))
    ));

    assert!(seen.lock().is_empty());
    assert_eq!(engine.trial_count(), 1);
    assert_eq!(engine.query_available_resource(), 1);
    let m = engine.model(ids[0]).unwrap();
    assert_eq!(m.status(), ModelStatus::Waiting);
    assert!(m.intermediate_metrics().is_empty());
    assert!(m.metric().is_none());
}

#[test]
fn listener_failure_propagates_after_state_update() {
    struct Failing;
    impl GraphListener for Failing {
        fn on_training_end(&self, _model: &Model, _success: bool) -> Result<(), BoxError> {
            Err("listener exploded".into())
        }
    }

    let (advisor, engine) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    engine.register_graph_listener(Arc::new(Failing));
    engine.register_graph_listener(Arc::new(Recorder {
        tag: "after",
        seen: seen.clone(),
    }));
    let ids = engine.submit_models(&[model("m")]).unwrap();

    let err = advisor.handler().on_trial_end(ids[0], true).unwrap_err();
    assert!(matches!(err, EngineError::Listener { .. }));
    assert_eq!(engine.model(ids[0]).unwrap().status(), ModelStatus::Trained);
    assert!(seen.lock().is_empty());
}

#[test]
fn concurrent_grants_and_consumes_lose_no_updates() {
    let (advisor, engine) = setup();
    let handler = advisor.handler();
    let params = json!({});

    std::thread::scope(|s| {
        for _ in 0..8 {
            let handler = handler.clone();
            let params = &params;
            s.spawn(move || {
                for _ in 0..1_000 {
                    handler.on_request_trial_jobs(2);
                    handler.on_send_trial(params);
                    handler.on_send_trial(params);
                    handler.on_send_trial(params);
                }
            });
        }
        for _ in 0..4 {
            let engine = engine.clone();
            s.spawn(move || {
                for _ in 0..1_000 {
                    let _ = engine.query_available_resource();
                }
            });
        }
    });

    assert_eq!(engine.query_available_resource(), 8 * 1_000 * (2 - 3));
}

#[test]
fn concurrent_submissions_and_events() {
    let (advisor, engine) = setup();
    let handler = advisor.handler();

    let ids: Vec<TrialId> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let engine = engine.clone();
                let handler = handler.clone();
                s.spawn(move || {
                    let mut ids = Vec::new();
                    for i in 0..25 {
                        let id = engine.submit_models(&[model(&format!("t{t}-{i}"))]).unwrap()[0];
                        handler.on_intermediate_metric(id, json!(i)).unwrap();
                        handler.on_trial_end(id, i % 2 == 0).unwrap();
                        ids.push(id);
                    }
                    ids
                })
            })
            .collect();
        workers.into_iter().flat_map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(ids.len(), 100);
    assert_eq!(engine.trial_count(), 100);
    for id in ids {
        let m = engine.model(id).unwrap();
        assert!(m.status().is_terminal());
        assert_eq!(m.intermediate_metrics().len(), 1);
    }
}
