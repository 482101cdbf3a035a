//! Configuration loaded from environment variables

use std::time::Duration;

/// Runtime configuration for the instrument link and the sweep
#[derive(Debug, Clone)]
pub struct Config {
    /// SCPI control port on the instrument
    pub control_port: u16,

    /// VRT data port on the instrument
    pub data_port: u16,

    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Deadline for an IF data packet after a trigger, in milliseconds
    pub capture_timeout_ms: u64,

    /// Samples per packet (also the FFT size)
    pub samples_per_packet: u16,

    /// Extra attempts for a capture step that timed out (0 = no retry)
    pub capture_retries: u32,

    /// Pause between retry attempts in milliseconds
    pub retry_backoff_ms: u64,

    /// Reference level used when the instrument sends no digitizer context
    pub reference_level_dbm: f32,

    /// Minimum spacing between reported peaks in Hz (0 = off)
    pub min_peak_separation_hz: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_port: 37001,
            data_port: 37000,
            connect_timeout_ms: 5000,
            capture_timeout_ms: 5000,
            samples_per_packet: 1024,
            capture_retries: 0,
            retry_backoff_ms: 250,
            reference_level_dbm: 0.0,
            min_peak_separation_hz: 0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            control_port: env_or("WSA_CONTROL_PORT", defaults.control_port),
            data_port: env_or("WSA_DATA_PORT", defaults.data_port),
            connect_timeout_ms: env_or("WSA_CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms),
            capture_timeout_ms: env_or("WSA_CAPTURE_TIMEOUT_MS", defaults.capture_timeout_ms),
            samples_per_packet: env_or("WSA_SAMPLES_PER_PACKET", defaults.samples_per_packet),
            capture_retries: env_or("WSA_CAPTURE_RETRIES", defaults.capture_retries),
            retry_backoff_ms: env_or("WSA_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            reference_level_dbm: env_or("WSA_REFERENCE_LEVEL_DBM", defaults.reference_level_dbm),
            min_peak_separation_hz: env_or(
                "WSA_MIN_PEAK_SEPARATION_HZ",
                defaults.min_peak_separation_hz,
            ),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
