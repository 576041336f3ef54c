use std::time::Duration;

pub const PROGRESS_BAR_STEPS: u64 = 20;
pub const UI_TICK: Duration = Duration::from_secs(1);
pub const EXIT_INTERRUPTED: i32 = 130;
pub const GENERATED_WORKDIR: &str = "trialforge";
pub const WORKER_REAP_TIMEOUT: Duration = Duration::from_secs(5);
