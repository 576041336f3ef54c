use std::io::Write;

use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use trialforge_engine::{MetricData, TrialId};

#[derive(Debug, Clone, PartialEq)]
pub struct TrialSpec {
    pub trial_id: TrialId,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCommand {
    Trial(TrialSpec),
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerUpdate {
    Intermediate {
        trial_id: TrialId,
        metric: MetricData,
    },
    Final {
        trial_id: TrialId,
        metric: MetricData,
    },
    Done {
        trial_id: TrialId,
        success: bool,
        detail: String,
    },
}

impl WorkerCommand {
    pub fn to_line(&self) -> anyhow::Result<String> {
        match self {
            WorkerCommand::Trial(spec) => {
                // Payload scripts are multi-line; base64 keeps the command on one line.
                let json = serde_json::to_vec(&spec.parameters).context("encode parameters")?;
                Ok(format!("TRIAL {} {}\n", spec.trial_id, B64.encode(json)))
            }
            WorkerCommand::Stop => Ok("STOP\n".to_string()),
        }
    }

    pub fn parse_line(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        if line == "STOP" {
            return Ok(WorkerCommand::Stop);
        }
        if let Some(rest) = line.strip_prefix("TRIAL ") {
            return Ok(WorkerCommand::Trial(parse_trial_line(rest)?));
        }
        anyhow::bail!("invalid command line: {line}");
    }
}

impl WorkerUpdate {
    pub fn trial_id(&self) -> TrialId {
        match self {
            WorkerUpdate::Intermediate { trial_id, .. }
            | WorkerUpdate::Final { trial_id, .. }
            | WorkerUpdate::Done { trial_id, .. } => *trial_id,
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            WorkerUpdate::Intermediate { trial_id, metric } => {
                format!("INTERMEDIATE {trial_id} {metric}\n")
            }
            WorkerUpdate::Final { trial_id, metric } => format!("FINAL {trial_id} {metric}\n"),
            WorkerUpdate::Done {
                trial_id,
                success,
                detail,
            } => {
                let outcome = if *success { "ok" } else { "failed" };
                let detail = detail.replace(['\r', '\n'], " ");
                if detail.is_empty() {
                    format!("DONE {trial_id} {outcome}\n")
                } else {
                    format!("DONE {trial_id} {outcome} {detail}\n")
                }
            }
        }
    }

    pub fn parse_line(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("INTERMEDIATE ") {
            let (trial_id, metric) = parse_metric_line(rest).context("parse INTERMEDIATE")?;
            return Ok(WorkerUpdate::Intermediate { trial_id, metric });
        }
        if let Some(rest) = line.strip_prefix("FINAL ") {
            let (trial_id, metric) = parse_metric_line(rest).context("parse FINAL")?;
            return Ok(WorkerUpdate::Final { trial_id, metric });
        }
        if let Some(rest) = line.strip_prefix("DONE ") {
            let mut parts = rest.splitn(3, ' ');
            let trial_id = parse_trial_id(parts.next()).context("parse DONE")?;
            let success = match parts.next() {
                Some("ok") => true,
                Some("failed") => false,
                other => anyhow::bail!("parse DONE: invalid outcome {other:?}"),
            };
            let detail = parts.next().unwrap_or_default().trim().to_string();
            return Ok(WorkerUpdate::Done {
                trial_id,
                success,
                detail,
            });
        }
        anyhow::bail!("invalid update line: {line}")
    }
}

pub fn worker_send_update(update: WorkerUpdate) {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(update.to_line().as_bytes());
    let _ = out.flush();
}

fn parse_trial_id(field: Option<&str>) -> anyhow::Result<TrialId> {
    let raw = field.context("missing trial id")?;
    let raw = raw.parse::<u64>().context("parse trial id")?;
    Ok(TrialId::new(raw))
}

fn parse_trial_line(line: &str) -> anyhow::Result<TrialSpec> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 2 {
        anyhow::bail!("invalid TRIAL line (expected 2 fields, got {})", parts.len());
    }

    let trial_id = parse_trial_id(Some(parts[0]))?;
    let json = B64.decode(parts[1].as_bytes()).context("decode parameters")?;
    let parameters = serde_json::from_slice(&json).context("parse parameters")?;
    Ok(TrialSpec {
        trial_id,
        parameters,
    })
}

fn parse_metric_line(line: &str) -> anyhow::Result<(TrialId, MetricData)> {
    let (id, metric) = line
        .split_once(' ')
        .context("expected trial id and metric")?;
    let trial_id = parse_trial_id(Some(id))?;
    let metric = serde_json::from_str(metric.trim()).context("parse metric")?;
    Ok((trial_id, metric))
}
