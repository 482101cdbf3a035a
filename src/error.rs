//! Error taxonomy for the sweep pipeline

use thiserror::Error;

use crate::device::DeviceError;

pub type Result<T> = std::result::Result<T, SweepError>;

/// Everything that can stop a capture step or a whole sweep
#[derive(Debug, Error)]
pub enum SweepError {
    /// Link-level failure talking to the instrument. Fatal to the sweep.
    #[error("transport error during {context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: DeviceError,
    },

    /// No IF data packet arrived before the read deadline
    #[error("no IF data packet within {timeout_ms} ms")]
    CaptureTimeout { timeout_ms: u64 },

    /// The instrument refused to start a capture
    #[error("device busy: {reason}")]
    DeviceBusy { reason: String },

    #[error("malformed packet: {reason}")]
    MalformedPacket { reason: String },

    /// Stream id outside the known set. Callers skip the packet and keep reading.
    #[error("unknown stream id 0x{stream_id:08x}")]
    UnknownStreamId { stream_id: u32 },

    /// Rejected before any device I/O happens
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidPlan {
        parameter: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("could not allocate a sweep buffer of {bins} bins")]
    AllocationFailure { bins: usize },
}

impl SweepError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPacket {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(parameter: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self::InvalidPlan {
            parameter,
            value: value.to_string(),
            reason,
        }
    }

    /// Only a capture timeout may be retried, and only when the caller asks for it
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CaptureTimeout { .. })
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TransportError",
            Self::CaptureTimeout { .. } => "CaptureTimeout",
            Self::DeviceBusy { .. } => "DeviceBusy",
            Self::MalformedPacket { .. } => "MalformedPacket",
            Self::UnknownStreamId { .. } => "UnknownStreamId",
            Self::InvalidPlan { .. } => "InvalidPlan",
            Self::AllocationFailure { .. } => "AllocationFailure",
        }
    }
}
