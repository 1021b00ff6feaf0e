//! Server clock offset learned from keepalive pings.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Shared clock offset between the access point and this host.
///
/// Cloning yields another handle onto the same offset.
#[derive(Debug, Clone, Default)]
pub struct TimeReference {
    offset_ms: Arc<AtomicI64>,
}

impl TimeReference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the server's wall clock, in milliseconds since the epoch.
    pub fn update(&self, server_ms: i64) {
        let offset = server_ms - local_ms();
        self.offset_ms.store(offset, Ordering::Relaxed);
        tracing::trace!(server_ms, offset, "server time updated");
    }

    /// Server time minus local time, in milliseconds.
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }

    /// Current server time, in milliseconds since the epoch.
    pub fn now_ms(&self) -> i64 {
        local_ms() + self.offset_ms()
    }
}

fn local_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
