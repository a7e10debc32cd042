//! Explicit, overridable configuration record.
//!
//! The original source loaded a singleton at class-load time (see spec §9); this is
//! re-architected as a plain record passed into [`crate::CastDeviceController::v2`].
//! Defaults come from the declarative table in spec §6.

use std::time::Duration;

const ENV_USE_TLS: &str = "CAST_CLIENT_USE_TLS";
const ENV_HEARTBEAT_INTERVAL_MS: &str = "CAST_CLIENT_HEARTBEAT_INTERVAL_MS";
const ENV_NB_MISSED_HEARTBEATS: &str = "CAST_CLIENT_NB_MISSED_HEARTBEATS";

/// Fingerprint of a Cast device's TLS certificate, pinned by the caller. When
/// present, `connect()` accepts only a certificate whose SHA-256 digest matches;
/// otherwise it falls back to the device's usual self-signed, CA-less trust model
/// (see spec §7, §9).
pub type CertFingerprint = [u8; 32];

#[derive(Clone, Debug)]
pub struct CastClientConfig {
    /// Whether the transport is TLS-wrapped TCP. Default `true`.
    pub use_tls: bool,
    /// PING period. Default 5s.
    pub heartbeat_interval: Duration,
    /// Liveness window multiplier: the channel is declared dead after
    /// `nb_missed_heartbeats * heartbeat_interval` of total silence. Default 2.
    pub nb_missed_heartbeats: u32,
    /// Optional pinned certificate fingerprint (see [`CertFingerprint`]).
    pub pinned_fingerprint: Option<CertFingerprint>,
}

impl Default for CastClientConfig {
    fn default() -> Self {
        CastClientConfig {
            use_tls: true,
            heartbeat_interval: Duration::from_millis(5000),
            nb_missed_heartbeats: 2,
            pinned_fingerprint: None,
        }
    }
}

impl CastClientConfig {
    /// Liveness window: `nb_missed_heartbeats * heartbeat_interval`.
    pub fn heartbeat_window(&self) -> Duration {
        self.heartbeat_interval * self.nb_missed_heartbeats
    }

    /// Starts from [`CastClientConfig::default`] and overrides individual fields
    /// from environment variables, so defaults remain overridable at process start
    /// without a config-file dependency.
    pub fn from_env() -> Self {
        let mut config = CastClientConfig::default();

        if let Ok(raw) = std::env::var(ENV_USE_TLS) {
            match raw.parse::<bool>() {
                Ok(v) => config.use_tls = v,
                Err(_) => log::warn!("ignoring invalid {ENV_USE_TLS}={raw:?}"),
            }
        }

        if let Ok(raw) = std::env::var(ENV_HEARTBEAT_INTERVAL_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => config.heartbeat_interval = Duration::from_millis(ms),
                Err(_) => log::warn!("ignoring invalid {ENV_HEARTBEAT_INTERVAL_MS}={raw:?}"),
            }
        }

        if let Ok(raw) = std::env::var(ENV_NB_MISSED_HEARTBEATS) {
            match raw.parse::<u32>() {
                Ok(n) => config.nb_missed_heartbeats = n,
                Err(_) => log::warn!("ignoring invalid {ENV_NB_MISSED_HEARTBEATS}={raw:?}"),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = CastClientConfig::default();
        assert!(config.use_tls);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(5000));
        assert_eq!(config.nb_missed_heartbeats, 2);
        assert_eq!(config.heartbeat_window(), Duration::from_millis(10000));
    }
}
