use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use trialforge_engine::{MetricData, MetricReporter, TrainerRegistry, TrialId, trial_execute_graph};

use crate::format::format_duration;
use crate::protocol::{TrialSpec, WorkerCommand, WorkerUpdate, worker_send_update};
use crate::trainers::builtin_trainers;

/// Streams metrics to the controller as protocol lines.
struct StdoutReporter {
    trial_id: TrialId,
}

impl MetricReporter for StdoutReporter {
    fn report_intermediate(&mut self, metric: MetricData) {
        worker_send_update(WorkerUpdate::Intermediate {
            trial_id: self.trial_id,
            metric,
        });
    }

    fn report_final(&mut self, metric: MetricData) {
        worker_send_update(WorkerUpdate::Final {
            trial_id: self.trial_id,
            metric,
        });
    }
}

#[derive(Debug)]
struct TrialOutcome {
    trial_id: TrialId,
    success: bool,
    detail: String,
    duration: Duration,
}

impl TrialOutcome {
    fn into_update(self) -> WorkerUpdate {
        WorkerUpdate::Done {
            trial_id: self.trial_id,
            success: self.success,
            detail: self.detail,
        }
    }
}

struct WorkerRunner {
    trainers: Arc<TrainerRegistry>,
    workdir: PathBuf,
}

impl WorkerRunner {
    async fn handle_command(&self, cmd: WorkerCommand) -> Option<WorkerUpdate> {
        match cmd {
            WorkerCommand::Stop => None,
            WorkerCommand::Trial(spec) => {
                let outcome = self.run_trial(spec).await;
                log::debug!(
                    "trial {} finished in {}",
                    outcome.trial_id,
                    format_duration(outcome.duration)
                );
                Some(outcome.into_update())
            }
        }
    }

    async fn run_trial(&self, spec: TrialSpec) -> TrialOutcome {
        let started_at = Instant::now();
        let trial_id = spec.trial_id;
        let trainers = self.trainers.clone();
        let workdir = self.workdir.clone();

        let res = tokio::task::spawn_blocking(move || {
            let mut parameters = spec.parameters;
            let mut reporter = StdoutReporter { trial_id };
            trial_execute_graph(&mut parameters, &trainers, &workdir, &mut reporter)
        })
        .await;

        let (success, detail) = match res {
            Ok(Ok(trial)) => (true, trial.module_name),
            Ok(Err(err)) => {
                let err_msg = err.to_string();
                eprintln!(
                    "Trial {trial_id} error: {err_msg} (after {})",
                    format_duration(started_at.elapsed())
                );
                (false, err_msg)
            }
            Err(err) => {
                let err_msg = format!("trial task error: {err}");
                eprintln!("Trial {trial_id} {err_msg}");
                (false, err_msg)
            }
        };

        TrialOutcome {
            trial_id,
            success,
            detail,
            duration: started_at.elapsed(),
        }
    }
}

pub async fn run_worker(workdir: PathBuf) -> anyhow::Result<()> {
    std::fs::create_dir_all(&workdir)
        .with_context(|| format!("create workdir {}", workdir.display()))?;

    let runner = WorkerRunner {
        trainers: Arc::new(builtin_trainers()),
        workdir,
    };

    // The controller owns shutdown; swallow CTRL+C so running trials can finish.
    tokio::spawn(async { while tokio::signal::ctrl_c().await.is_ok() {} });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let cmd = match WorkerCommand::parse_line(line) {
            Ok(v) => v,
            Err(err) => {
                eprintln!("worker: parse command error: {err:#}");
                continue;
            }
        };

        let Some(update) = runner.handle_command(cmd).await else {
            break;
        };
        worker_send_update(update);
    }

    Ok(())
}
