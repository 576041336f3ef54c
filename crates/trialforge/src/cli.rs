use std::path::PathBuf;

use clap::Parser;

pub fn default_parallel_trials() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub fn default_workdir() -> PathBuf {
    std::env::temp_dir().join(crate::constants::GENERATED_WORKDIR)
}

#[derive(Debug, Clone, Parser)]
#[command(name = "trialforge", version, about = "Run a model study on local trial workers")]
pub struct Cli {
    /// Study file (JSON) listing the models to trial.
    #[arg(long, env = "TRIALFORGE_STUDY", required_unless_present = "worker")]
    pub study: Option<PathBuf>,

    /// Number of trials to run in parallel.
    #[arg(
        short = 'p',
        long,
        env = "TRIALFORGE_PARALLEL",
        default_value_t = default_parallel_trials()
    )]
    pub parallel: usize,

    /// Directory for generated model artifacts.
    #[arg(long, env = "TRIALFORGE_WORKDIR", default_value_os_t = default_workdir())]
    pub workdir: PathBuf,

    #[arg(long, env = "TRIALFORGE_NO_TUI", default_value_t = false)]
    pub no_tui: bool,

    /// Hidden: run as a child trial worker (controller spawns these).
    #[arg(long, hide = true)]
    pub worker: bool,
}
