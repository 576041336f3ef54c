use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;

const RUNNING: u8 = 0;
const GRACEFUL: u8 = 1;
const IMMEDIATE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownEvent {
    Graceful,
    Immediate,
}

/// First stop request finishes running trials, the second one exits.
#[derive(Debug, Default)]
pub struct ShutdownController {
    state: AtomicU8,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) -> ShutdownEvent {
        let prev = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                Some((s + 1).min(IMMEDIATE))
            })
            .unwrap_or(IMMEDIATE);
        if prev == RUNNING {
            ShutdownEvent::Graceful
        } else {
            ShutdownEvent::Immediate
        }
    }

    pub fn should_exit_graceful(&self) -> bool {
        self.state.load(Ordering::Acquire) >= GRACEFUL
    }
}

pub fn spawn_ctrl_c_handler(
    shutdown: Arc<ShutdownController>,
    tx: mpsc::UnboundedSender<ShutdownEvent>,
) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(shutdown.request()).is_err() {
                break;
            }
        }
    });
}
