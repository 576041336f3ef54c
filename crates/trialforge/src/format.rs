use std::time::Duration;

use trialforge_engine::{MetricData, ModelStatus, TrialId};

pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        return format!("{ms}ms");
    }

    if ms < 60_000 {
        let seconds = ms / 1000;
        let millis = ms % 1000;
        return format!("{seconds}.{millis:03}s");
    }

    if ms < 3_600_000 {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        return format!("{minutes}m{seconds:02}s");
    }

    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    format!("{hours}h{minutes:02}m{seconds:02}s")
}

/// Scalar view of a metric: the number itself, or the `default` field of an object.
pub fn metric_scalar(metric: &MetricData) -> Option<f64> {
    match metric {
        MetricData::Number(n) => n.as_f64(),
        MetricData::Object(map) => map.get("default").and_then(|v| v.as_f64()),
        _ => None,
    }
}

pub fn format_metric(metric: Option<&MetricData>) -> String {
    let Some(metric) = metric else {
        return "-".to_string();
    };
    match metric_scalar(metric) {
        Some(v) => format!("{v:.4}"),
        None => metric.to_string(),
    }
}

pub fn status_label(status: ModelStatus) -> &'static str {
    match status {
        ModelStatus::Waiting => "Waiting",
        ModelStatus::Running => "Running",
        ModelStatus::Trained => "Trained",
        ModelStatus::Failed => "Failed",
    }
}

pub fn format_trial_done_line(
    trial_id: TrialId,
    model_name: &str,
    status: ModelStatus,
    metric: Option<&MetricData>,
    duration: Duration,
) -> String {
    format!(
        "Trial: {trial_id} ({model_name}), Status: {}, Metric: {}, Duration: {}",
        status_label(status),
        format_metric(metric),
        format_duration(duration)
    )
}
