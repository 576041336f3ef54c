mod advisor;
mod cli;
mod constants;
mod controller;
mod format;
mod listeners;
mod protocol;
mod shutdown;
mod study;
mod trainers;
mod worker;

use std::io::IsTerminal;

use clap::Parser;

use crate::cli::Cli;
use crate::controller::run_controller;
use crate::worker::run_worker;

fn init_logging(cli: &Cli) {
    // Progress bars own stdout in TUI mode; keep the log down to warnings there.
    let quiet = cli.worker || (!cli.no_tui && std::io::stdout().is_terminal());
    let default_filter = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    if cli.worker {
        return run_worker(cli.workdir).await;
    }

    let code = run_controller(cli).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
