use std::io::IsTerminal;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

use trialforge_engine::{BaseExecutionEngine, ExecutionEngine, TrialEventHandler, TrialId};

use crate::advisor::LocalAdvisor;
use crate::cli::Cli;
use crate::constants::{EXIT_INTERRUPTED, PROGRESS_BAR_STEPS, UI_TICK, WORKER_REAP_TIMEOUT};
use crate::format::{format_metric, format_trial_done_line};
use crate::listeners::{Leaderboard, TrialLog};
use crate::protocol::{TrialSpec, WorkerCommand, WorkerUpdate};
use crate::shutdown::{ShutdownController, ShutdownEvent, spawn_ctrl_c_handler};
use crate::study::Study;

#[derive(Debug)]
enum WorkerEvent {
    Update { worker_idx: usize, update: WorkerUpdate },
    Log { worker_idx: usize, line: String },
    Eof { worker_idx: usize },
}

#[derive(Debug, Clone, Copy)]
struct RunningTrial {
    trial_id: TrialId,
    started_at: Instant,
    epochs_done: u64,
}

#[derive(Debug)]
struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    trial: Option<RunningTrial>,
}

impl WorkerProcess {
    async fn spawn(
        worker_idx: usize,
        events_tx: mpsc::UnboundedSender<WorkerEvent>,
        workdir: &Path,
    ) -> anyhow::Result<Self> {
        let exe = std::env::current_exe().context("current_exe")?;
        let mut child = Command::new(exe)
            .arg("--worker")
            .arg("--workdir")
            .arg(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .context("spawn worker process")?;

        let stdin = child.stdin.take().context("worker stdin is not piped")?;
        let stdout = child.stdout.take().context("worker stdout is not piped")?;

        tokio::spawn(async move {
            let mut lines = tokio::io::BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let ev = match WorkerUpdate::parse_line(&line) {
                    Ok(update) => WorkerEvent::Update { worker_idx, update },
                    Err(_) => WorkerEvent::Log { worker_idx, line },
                };
                let _ = events_tx.send(ev);
            }

            let _ = events_tx.send(WorkerEvent::Eof { worker_idx });
        });

        Ok(Self {
            child,
            stdin,
            trial: None,
        })
    }

    fn is_idle(&self) -> bool {
        self.trial.is_none()
    }

    fn is_busy(&self) -> bool {
        self.trial.is_some()
    }

    async fn send(&mut self, cmd: WorkerCommand) -> anyhow::Result<()> {
        let line = cmd.to_line()?;
        self.stdin
            .write_all(line.as_bytes())
            .await
            .context("write worker command")?;
        self.stdin.flush().await.ok();
        Ok(())
    }

    fn assign_trial(&mut self, trial_id: TrialId) {
        self.trial = Some(RunningTrial {
            trial_id,
            started_at: Instant::now(),
            epochs_done: 0,
        });
    }

    fn apply_intermediate(&mut self, trial_id: TrialId) -> Option<RunningTrial> {
        let trial = self.trial.as_mut().filter(|t| t.trial_id == trial_id)?;
        trial.epochs_done += 1;
        Some(*trial)
    }

    fn finish_trial(&mut self, trial_id: TrialId) -> Option<RunningTrial> {
        if self.trial.is_some_and(|t| t.trial_id == trial_id) {
            self.trial.take()
        } else {
            None
        }
    }

    /// Reap a worker whose stdout closed; returns a description of how it exited.
    async fn reap(&mut self) -> String {
        match tokio::time::timeout(WORKER_REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => format!("worker process exited ({status})"),
            Ok(Err(err)) => format!("worker process lost: {err}"),
            Err(_) => {
                let _ = self.child.kill().await;
                "worker process closed its output and was killed".to_string()
            }
        }
    }
}

struct WorkerUiState {
    bar: ProgressBar,
    total_epochs: Option<u64>,
}

struct Ui {
    mp: MultiProgress,
    global_pb: ProgressBar,
    stop_pb: ProgressBar,
    worker_states: Vec<WorkerUiState>,
}

impl Ui {
    fn new(worker_count: usize) -> anyhow::Result<Self> {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stdout());
        mp.set_move_cursor(true);

        let msg_style = ProgressStyle::with_template("{msg}").context("progress style")?;
        let global_pb = mp.add(ProgressBar::new(0));
        global_pb.set_style(msg_style.clone());
        global_pb.set_message("Trials: 0 done");

        let worker_style = ProgressStyle::with_template("{prefix} {bar:20.cyan/blue} {msg}")
            .context("progress style")?
            .progress_chars("#--");

        let mut worker_states = Vec::with_capacity(worker_count);
        for idx in 0..worker_count {
            let pb = mp.add(ProgressBar::new(PROGRESS_BAR_STEPS));
            pb.set_style(worker_style.clone());
            pb.set_prefix(format!("W{}", idx + 1));
            pb.set_message("Idle");
            worker_states.push(WorkerUiState {
                bar: pb,
                total_epochs: None,
            });
        }

        let stop_pb = mp.add(ProgressBar::new(0));
        stop_pb.set_style(msg_style);
        stop_pb.set_message(" ");

        Ok(Self {
            mp,
            global_pb,
            stop_pb,
            worker_states,
        })
    }

    fn println(&self, msg: &str) {
        let _ = self.mp.println(msg);
    }

    fn set_worker_trial(
        &mut self,
        worker_idx: usize,
        trial_id: TrialId,
        model_name: &str,
        total_epochs: Option<u64>,
    ) {
        let Some(state) = self.worker_states.get_mut(worker_idx) else {
            return;
        };
        state.bar.set_length(PROGRESS_BAR_STEPS);
        state.bar.set_position(0);
        state.bar.set_message(format!("Trial {trial_id} ({model_name})"));
        state.total_epochs = total_epochs;
    }

    fn set_worker_progress(&mut self, worker_idx: usize, epochs_done: u64, metric: &str) {
        let Some(state) = self.worker_states.get_mut(worker_idx) else {
            return;
        };
        if let Some(total) = state.total_epochs {
            state.bar.set_position(calc_progress_step(total, epochs_done));
        }
        let msg = state.bar.message();
        let base = msg.split(" [").next().unwrap_or_default().to_string();
        state.bar.set_message(format!("{base} [epoch {epochs_done}: {metric}]"));
    }

    fn set_worker_idle(&mut self, worker_idx: usize) {
        let Some(state) = self.worker_states.get_mut(worker_idx) else {
            return;
        };
        state.bar.set_position(0);
        state.bar.set_message("Idle");
        state.total_epochs = None;
    }

    fn set_stop_message(&mut self, msg: &str) {
        self.stop_pb.set_message(msg.to_string());
    }

    fn tick_global(&self, done: usize, total: usize, busy: usize, workers: usize, resources: i64) {
        self.global_pb.set_message(format!(
            "Trials: {done}/{total} done (running {busy}/{workers}, resources {resources})"
        ));
    }

    fn freeze(&self) {
        self.mp.set_move_cursor(false);
        for worker in &self.worker_states {
            worker.bar.abandon();
        }
        self.global_pb.abandon();
        self.stop_pb.abandon();
        let _ = std::io::stdout().write_all(b"\n");
    }
}

#[derive(Debug)]
enum ControllerAction {
    Shutdown(ShutdownEvent),
    ShutdownClosed,
    Worker(WorkerEvent),
    WorkerClosed,
    Tick,
}

struct Controller {
    study: Study,
    parallel: usize,
    tui_enabled: bool,
    shutdown: Arc<ShutdownController>,
    shutdown_rx: mpsc::UnboundedReceiver<ShutdownEvent>,
    shutdown_open: bool,
    advisor: Arc<LocalAdvisor>,
    engine: Arc<BaseExecutionEngine>,
    handler: Arc<dyn TrialEventHandler>,
    leaderboard: Arc<Leaderboard>,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    workdir: PathBuf,
    workers: Vec<WorkerProcess>,
    finished: usize,
    ui: Option<Ui>,
    ticker: tokio::time::Interval,
    immediate_exit: bool,
    stop_requested_printed: bool,
}

impl Controller {
    async fn new(cli: Cli) -> anyhow::Result<Self> {
        if cli.parallel == 0 {
            anyhow::bail!("--parallel must be >= 1");
        }
        let study_path = cli.study.as_deref().context("--study is required")?;
        let study = Study::load(study_path)?;
        std::fs::create_dir_all(&cli.workdir)
            .with_context(|| format!("create workdir {}", cli.workdir.display()))?;

        let tui_enabled = !cli.no_tui && std::io::stdout().is_terminal();

        let shutdown = Arc::new(ShutdownController::new());
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel::<ShutdownEvent>();
        spawn_ctrl_c_handler(shutdown.clone(), shutdown_tx);

        let advisor = Arc::new(LocalAdvisor::new());
        let engine = BaseExecutionEngine::new(advisor.clone());
        let handler = advisor
            .handler()
            .context("engine did not subscribe to the advisor")?;
        let leaderboard = Arc::new(Leaderboard::new(study.optimize));
        engine.register_graph_listener(Arc::new(TrialLog));
        engine.register_graph_listener(leaderboard.clone());
        engine
            .submit_models(&study.instantiate())
            .context("submit study models")?;

        let (events_tx, events_rx) = mpsc::unbounded_channel::<WorkerEvent>();
        let ui = if tui_enabled {
            Some(Ui::new(cli.parallel)?)
        } else {
            None
        };

        let mut workers: Vec<WorkerProcess> = Vec::with_capacity(cli.parallel);
        for idx in 0..cli.parallel {
            workers.push(WorkerProcess::spawn(idx, events_tx.clone(), &cli.workdir).await?);
        }

        let startup = format!(
            "trialforge {} study={} trials={} parallel={} workdir={}",
            env!("CARGO_PKG_VERSION"),
            study.name,
            study.trial_count(),
            cli.parallel,
            cli.workdir.display()
        );
        let controller = Self {
            study,
            parallel: cli.parallel,
            tui_enabled,
            shutdown,
            shutdown_rx,
            shutdown_open: true,
            advisor,
            engine,
            handler,
            leaderboard,
            events_tx,
            events_rx,
            workdir: cli.workdir,
            workers,
            finished: 0,
            ui,
            ticker: tokio::time::interval(UI_TICK),
            immediate_exit: false,
            stop_requested_printed: false,
        };
        controller.print_info(&startup);
        controller
            .handler
            .on_request_trial_jobs(u32::try_from(controller.parallel).unwrap_or(u32::MAX));
        Ok(controller)
    }

    fn print_info(&self, msg: &str) {
        if let Some(ui) = &self.ui {
            ui.println(msg);
        } else {
            println!("{msg}");
        }
    }

    fn print_err(&self, msg: &str) {
        if let Some(ui) = &self.ui {
            ui.println(msg);
        } else {
            eprintln!("{msg}");
        }
    }

    fn print_worker_log(&self, worker_idx: usize, line: &str) {
        let msg = format!("W{}: {line}", worker_idx + 1);
        self.print_err(&msg);
    }

    fn apply_graceful_shutdown(&mut self) {
        if self.shutdown.should_exit_graceful() {
            let dropped = self.advisor.clear_pending();
            if dropped > 0 {
                log::info!("dropped {dropped} queued trials");
            }
        }
    }

    fn request_graceful_shutdown(&mut self) {
        self.apply_graceful_shutdown();
        if !self.stop_requested_printed {
            self.stop_requested_printed = true;
            self.set_stop_message(
                "Stop requested, finishing running trials before exiting \
                 (press CTRL+C again to exit immediately).",
            );
        }
    }

    fn request_immediate_shutdown(&mut self) {
        self.immediate_exit = true;
        let msg = "Stop requested again, exiting immediately.";
        self.set_stop_message(msg);
    }

    async fn run(mut self) -> anyhow::Result<i32> {
        loop {
            self.dispatch().await?;
            if self.workers_idle() && self.advisor.pending_count() == 0 {
                break;
            }

            match self.next_action().await {
                ControllerAction::Shutdown(ev) => {
                    self.handle_shutdown_event(ev);
                    if self.immediate_exit {
                        break;
                    }
                }
                ControllerAction::ShutdownClosed => {
                    self.shutdown_open = false;
                }
                ControllerAction::Worker(ev) => {
                    self.handle_worker_event(ev).await?;
                }
                ControllerAction::WorkerClosed => {
                    anyhow::bail!("worker events channel closed unexpectedly");
                }
                ControllerAction::Tick => {
                    self.tick_ui();
                }
            }
        }

        self.shutdown_workers().await;

        if let Some(ui) = &self.ui {
            ui.freeze();
        }
        for line in self.leaderboard.summary().lines(&self.study.name) {
            println!("{line}");
        }
        Ok(if self.immediate_exit { EXIT_INTERRUPTED } else { 0 })
    }

    async fn dispatch(&mut self) -> anyhow::Result<()> {
        self.apply_graceful_shutdown();
        if self.shutdown.should_exit_graceful() {
            return Ok(());
        }

        for (worker_idx, worker) in self.workers.iter_mut().enumerate() {
            if !worker.is_idle() {
                continue;
            }
            let Some(TrialSpec {
                trial_id,
                parameters,
            }) = self.advisor.next_pending()
            else {
                break;
            };

            let model = self.engine.model(trial_id)?;
            let total_epochs = model
                .training_config()
                .kwargs
                .get("epochs")
                .and_then(|v| v.as_u64());
            if let Some(ui) = &mut self.ui {
                ui.set_worker_trial(worker_idx, trial_id, &model.graph().name, total_epochs);
            }

            self.handler.on_send_trial(&parameters);
            worker
                .send(WorkerCommand::Trial(TrialSpec {
                    trial_id,
                    parameters,
                }))
                .await?;
            worker.assign_trial(trial_id);
        }

        Ok(())
    }

    async fn handle_worker_event(&mut self, ev: WorkerEvent) -> anyhow::Result<()> {
        match ev {
            WorkerEvent::Update { worker_idx, update } => self.handle_update(worker_idx, update),
            WorkerEvent::Log { worker_idx, line } => {
                self.print_worker_log(worker_idx, &line);
                Ok(())
            }
            WorkerEvent::Eof { worker_idx } => self.handle_worker_exit(worker_idx).await,
        }
    }

    /// A worker that dies mid-trial fails that trial and is replaced. A worker
    /// that dies while idle means workers cannot start, which ends the run.
    async fn handle_worker_exit(&mut self, worker_idx: usize) -> anyhow::Result<()> {
        let Some(worker) = self.workers.get_mut(worker_idx) else {
            return Ok(());
        };
        let running = worker.trial.take();
        let exit = worker.reap().await;
        let Some(running) = running else {
            anyhow::bail!("worker process {} exited unexpectedly: {exit}", worker_idx + 1);
        };

        self.print_worker_log(worker_idx, &exit);
        if let Some(ui) = &mut self.ui {
            ui.set_worker_idle(worker_idx);
        }
        self.report_trial_end(running.trial_id, false, &exit, Some(running))?;

        if !self.shutdown.should_exit_graceful() {
            let replacement =
                WorkerProcess::spawn(worker_idx, self.events_tx.clone(), &self.workdir).await?;
            self.workers[worker_idx] = replacement;
            log::info!("respawned worker {}", worker_idx + 1);
        }
        Ok(())
    }

    fn report_trial_end(
        &mut self,
        trial_id: TrialId,
        success: bool,
        detail: &str,
        running: Option<RunningTrial>,
    ) -> anyhow::Result<()> {
        self.handler
            .on_trial_end(trial_id, success)
            .with_context(|| format!("end of trial {trial_id}"))?;
        self.finished += 1;

        let model = self.engine.model(trial_id)?;
        let duration = running.map(|t| t.started_at.elapsed()).unwrap_or_default();
        let mut line = format_trial_done_line(
            trial_id,
            &model.graph().name,
            model.status(),
            model.metric().as_ref(),
            duration,
        );
        if success {
            log::debug!("trial {trial_id} ran {detail}");
        } else if !detail.is_empty() {
            line.push_str(&format!(" ({detail})"));
        }
        self.print_info(&line);

        self.handler.on_request_trial_jobs(1);
        Ok(())
    }

    fn handle_update(&mut self, worker_idx: usize, update: WorkerUpdate) -> anyhow::Result<()> {
        let trial_id = update.trial_id();
        match update {
            WorkerUpdate::Intermediate { metric, .. } => {
                let label = format_metric(Some(&metric));
                self.handler
                    .on_intermediate_metric(trial_id, metric)
                    .with_context(|| format!("intermediate metric of trial {trial_id}"))?;
                if let Some(worker) = self.workers.get_mut(worker_idx) {
                    if let Some(trial) = worker.apply_intermediate(trial_id) {
                        if let Some(ui) = &mut self.ui {
                            ui.set_worker_progress(worker_idx, trial.epochs_done, &label);
                        }
                    }
                }
            }
            WorkerUpdate::Final { metric, .. } => {
                self.handler
                    .on_final_metric(trial_id, metric)
                    .with_context(|| format!("final metric of trial {trial_id}"))?;
            }
            WorkerUpdate::Done {
                success, detail, ..
            } => {
                let running = self
                    .workers
                    .get_mut(worker_idx)
                    .and_then(|w| w.finish_trial(trial_id));
                if let Some(ui) = &mut self.ui {
                    ui.set_worker_idle(worker_idx);
                }
                self.report_trial_end(trial_id, success, &detail, running)?;
            }
        }
        Ok(())
    }

    fn tick_ui(&mut self) {
        if let Some(ui) = &self.ui {
            let busy = self.workers.iter().filter(|w| w.is_busy()).count();
            ui.tick_global(
                self.finished,
                self.engine.trial_count(),
                busy,
                self.parallel,
                self.engine.query_available_resource(),
            );
        }
    }

    fn handle_shutdown_event(&mut self, ev: ShutdownEvent) {
        match ev {
            ShutdownEvent::Graceful => self.request_graceful_shutdown(),
            ShutdownEvent::Immediate => self.request_immediate_shutdown(),
        }
    }

    fn set_stop_message(&mut self, msg: &str) {
        if let Some(ui) = &mut self.ui {
            ui.set_stop_message(msg);
        } else {
            self.print_err(msg);
        }
    }

    fn workers_idle(&self) -> bool {
        !self.workers.iter().any(|w| w.is_busy())
    }

    async fn next_action(&mut self) -> ControllerAction {
        tokio::select! {
            ev_opt = self.shutdown_rx.recv(), if self.shutdown_open => match ev_opt {
                Some(ev) => ControllerAction::Shutdown(ev),
                None => ControllerAction::ShutdownClosed,
            },
            ev_opt = self.events_rx.recv() => match ev_opt {
                Some(ev) => ControllerAction::Worker(ev),
                None => ControllerAction::WorkerClosed,
            },
            _ = self.ticker.tick(), if self.tui_enabled => ControllerAction::Tick,
        }
    }

    async fn shutdown_workers(&mut self) {
        for worker in self.workers.iter_mut() {
            let _ = worker.send(WorkerCommand::Stop).await;
            if self.immediate_exit {
                let _ = worker.child.kill().await;
            } else {
                let _ = tokio::time::timeout(WORKER_REAP_TIMEOUT, worker.child.wait()).await;
            }
        }
    }
}

fn calc_progress_step(total: u64, done: u64) -> u64 {
    let total = total.max(1);
    let done = done.min(total);
    ((done.saturating_mul(PROGRESS_BAR_STEPS)) / total).min(PROGRESS_BAR_STEPS)
}

pub async fn run_controller(cli: Cli) -> anyhow::Result<i32> {
    Controller::new(cli).await?.run().await
}
