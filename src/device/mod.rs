//! Instrument control
//!
//! The sweep core only ever talks to the instrument through [`Device`]. The
//! handle is borrowed exclusively for a whole sweep; nothing here is global.

mod state;
mod tcp;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use thiserror::Error;

pub use state::DeviceStats;
pub use tcp::TcpDevice;

/// Lower-layer failures reported by a device implementation
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Nothing arrived within the requested timeout
    #[error("read timed out")]
    Timeout,

    #[error("device disconnected")]
    Disconnected,

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Outcome of asking the instrument to start a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerStatus {
    Accepted,
    Rejected(String),
}

/// Control surface of a connected instrument
pub trait Device {
    /// Ask for the acquisition lock. Returns false when another client holds it.
    fn request_acquisition_access(&mut self) -> Result<bool, DeviceError>;

    fn abort_capture(&mut self) -> Result<(), DeviceError>;

    /// Drop any data the instrument or the link still holds
    fn flush(&mut self) -> Result<(), DeviceError>;

    fn set_input_mode(&mut self, mode: &str) -> Result<(), DeviceError>;

    fn set_samples_per_packet(&mut self, samples: u16) -> Result<(), DeviceError>;

    fn set_packets_per_block(&mut self, packets: u32) -> Result<(), DeviceError>;

    fn set_center_frequency(&mut self, frequency_hz: u64) -> Result<(), DeviceError>;

    fn trigger_capture(&mut self) -> Result<TriggerStatus, DeviceError>;

    /// Block until one framed packet arrives or `timeout` elapses
    fn read_raw_packet(&mut self, timeout: Duration) -> Result<Vec<u8>, DeviceError>;
}
