//! Keepalive watchdog.
//!
//! A timer task armed for the keepalive interval plus a margin. Every ping
//! re-arms it; if it ever runs out, the expiry callback fires once and the
//! timer stays idle until the next reset.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug)]
enum Command {
    Reset,
    Cancel,
}

/// Cloneable handle that can only re-arm the timer.
#[derive(Debug, Clone)]
pub struct WatchdogHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl WatchdogHandle {
    pub fn reset(&self) {
        // A stopped watchdog has nothing left to re-arm.
        let _ = self.tx.send(Command::Reset);
    }
}

/// Owner of the timer task. Dropping it stops the task.
#[derive(Debug)]
pub struct Watchdog {
    handle: WatchdogHandle,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Spawn an armed watchdog. Must be called inside a Tokio runtime.
    pub fn spawn<F>(timeout: Duration, on_expiry: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(timeout, rx, on_expiry));
        Self {
            handle: WatchdogHandle { tx },
            task,
        }
    }

    pub fn reset(&self) {
        self.handle.reset();
    }

    pub fn handle(&self) -> WatchdogHandle {
        self.handle.clone()
    }

    /// Stop the timer. It never fires afterwards.
    pub fn cancel(&self) {
        let _ = self.handle.tx.send(Command::Cancel);
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<F>(timeout: Duration, mut rx: mpsc::UnboundedReceiver<Command>, on_expiry: F)
where
    F: Fn(),
{
    let mut armed = true;
    loop {
        if armed {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(Command::Reset) => {}
                    Some(Command::Cancel) | None => break,
                },
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!(timeout_ms = timeout.as_millis() as u64, "keepalive watchdog expired");
                    on_expiry();
                    armed = false;
                }
            }
        } else {
            match rx.recv().await {
                Some(Command::Reset) => armed = true,
                Some(Command::Cancel) | None => break,
            }
        }
    }
}
