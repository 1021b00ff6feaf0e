//! Session configuration.

use std::time::Duration;

use cadencetrust::ClientMetadata;
use serde::{Deserialize, Serialize};

use crate::error::{CadenceStreamError, Result};

/// Access point used when none is configured.
pub const DEFAULT_ACCESS_POINT: &str = "ap.spotify.com:443";

/// Reconnection after a lost connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Attempts before the session gives up and closes.
    pub max_attempts: u32,
    /// Delay before the first attempt; doubles after every failure.
    pub initial_backoff_ms: u64,
    /// Upper bound on the delay between attempts.
    pub max_backoff_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Access points (`host:port`), tried in order.
    pub access_points: Vec<String>,
    pub connect_timeout_ms: u64,
    /// Bound on each handshake read and on the reply to a login.
    pub handshake_timeout_ms: u64,
    /// How long the access point may take to reject a challenge response.
    pub status_timeout_ms: u64,
    /// Expected interval between server pings.
    pub keepalive_interval_ms: u64,
    /// Grace period on top of the keepalive interval.
    pub keepalive_margin_ms: u64,
    /// Bound on how long `send` waits for authentication. `None` waits forever.
    pub send_timeout_ms: Option<u64>,
    pub client: ClientMetadata,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_points: vec![DEFAULT_ACCESS_POINT.to_string()],
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 10_000,
            status_timeout_ms: 1_000,
            keepalive_interval_ms: 120_000,
            keepalive_margin_ms: 5_000,
            send_timeout_ms: None,
            client: ClientMetadata::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Load from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CadenceStreamError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_points.is_empty() {
            return Err(CadenceStreamError::Config("no access points configured".into()));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(CadenceStreamError::Config("handshake timeout must be positive".into()));
        }
        if self.keepalive_interval_ms == 0 {
            return Err(CadenceStreamError::Config("keepalive interval must be positive".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    /// Silence after which the watchdog forces a reconnection.
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms + self.keepalive_margin_ms)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = SessionConfig::default();
        assert_eq!(c.access_points, vec![DEFAULT_ACCESS_POINT.to_string()]);
        assert_eq!(c.watchdog_timeout(), Duration::from_secs(125));
        assert_eq!(c.status_timeout(), Duration::from_secs(1));
        assert_eq!(c.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(c.reconnect.max_attempts, 5);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(5), Duration::from_secs(16));
        assert_eq!(p.backoff(7), Duration::from_secs(60));
        assert_eq!(p.backoff(200), Duration::from_secs(60));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = SessionConfig::from_json(
            r#"{ "access_points": ["127.0.0.1:4070"], "reconnect": { "max_attempts": 2 } }"#,
        )
        .unwrap();
        assert_eq!(c.access_points, vec!["127.0.0.1:4070".to_string()]);
        assert_eq!(c.reconnect.max_attempts, 2);
        assert_eq!(c.reconnect.initial_backoff_ms, 1_000);
        assert_eq!(c.keepalive_interval_ms, 120_000);
    }

    #[test]
    fn empty_access_points_rejected() {
        let err = SessionConfig::from_json(r#"{ "access_points": [] }"#).unwrap_err();
        assert!(matches!(err, CadenceStreamError::Config(_)));
        assert!(SessionConfig::from_json("not json").is_err());
        let err = SessionConfig::from_json(r#"{ "handshake_timeout_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, CadenceStreamError::Config(_)));
    }
}
