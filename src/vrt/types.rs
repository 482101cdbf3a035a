//! VRT packet data types

use std::fmt;

use chrono::{DateTime, Utc};
use rustfft::num_complex::Complex;

/// Stream identifiers used by the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StreamId {
    Receiver = 0x9000_0001,
    Digitizer = 0x9000_0002,
    I16Q16Data = 0x9000_0003,
    Extension = 0x9000_0004,
    I16Data = 0x9000_0005,
    I32Data = 0x9000_0006,
}

impl StreamId {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x9000_0001 => Some(Self::Receiver),
            0x9000_0002 => Some(Self::Digitizer),
            0x9000_0003 => Some(Self::I16Q16Data),
            0x9000_0004 => Some(Self::Extension),
            0x9000_0005 => Some(Self::I16Data),
            0x9000_0006 => Some(Self::I32Data),
            _ => None,
        }
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Receiver => "CTX_RECEIVER",
            Self::Digitizer => "CTX_DIGITIZER",
            Self::Extension => "CTX_EXTENSION",
            Self::I16Q16Data => "DATA_I16Q16",
            Self::I16Data => "DATA_I16",
            Self::I32Data => "DATA_I32",
        }
    }

    pub fn is_data(self) -> bool {
        matches!(self, Self::I16Q16Data | Self::I16Data | Self::I32Data)
    }
}

/// Decoded packet class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    If,
    Context,
    Extension,
}

impl PacketType {
    /// Wire values: 1 = IF data with stream id, 4 = context, 5 = extension context
    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            0x1 => Some(Self::If),
            0x4 => Some(Self::Context),
            0x5 => Some(Self::Extension),
            _ => None,
        }
    }

    pub fn wire(self) -> u8 {
        match self {
            Self::If => 0x1,
            Self::Context => 0x4,
            Self::Extension => 0x5,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::If => "IF",
            Self::Context => "CONTEXT",
            Self::Extension => "EXTENSION",
        })
    }
}

/// Integer seconds plus fractional picoseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub sec: u32,
    pub picosec: u64,
}

impl Timestamp {
    pub fn to_utc(self) -> Option<DateTime<Utc>> {
        let nanos = (self.picosec / 1_000).min(999_999_999) as u32;
        DateTime::<Utc>::from_timestamp(self.sec as i64, nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:012}s", self.sec, self.picosec)
    }
}

/// Fixed-layout packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub stream_id: StreamId,
    pub packet_type: PacketType,
    /// 4-bit rolling counter
    pub packet_count: u8,
    /// Total size in 32-bit words, header and trailer included
    pub packet_size_words: u16,
    /// Sample count of an IF packet, 0 for context packets
    pub samples_per_packet: u16,
    pub timestamp: Timestamp,
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VRT Header({}): type={}, count={}, spp={}, ts:{}",
            self.stream_id.name(),
            self.packet_type,
            self.packet_count,
            self.samples_per_packet,
            self.timestamp
        )
    }
}

/// Receiver tuning state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReceiverContext {
    pub reference_point: Option<u32>,
    pub frequency_hz: Option<f64>,
    pub gain_if_db: Option<f32>,
    pub gain_rf_db: Option<f32>,
    pub temperature_c: Option<f32>,
}

/// Digitizer gain/decimation state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DigitizerContext {
    pub bandwidth_hz: Option<f64>,
    pub rf_frequency_offset_hz: Option<f64>,
    pub reference_level_dbm: Option<f32>,
    pub sample_rate_hz: Option<f64>,
}

/// Sweep bookkeeping sent on the extension stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtensionContext {
    pub stream_start_id: Option<u32>,
    pub sweep_start_id: Option<u32>,
}

/// Raw IF samples, one variant per data stream
#[derive(Debug, Clone, PartialEq)]
pub enum IfSamples {
    ComplexI16(Vec<Complex<i16>>),
    RealI16(Vec<i16>),
    RealI32(Vec<i32>),
}

impl IfSamples {
    pub fn len(&self) -> usize {
        match self {
            Self::ComplexI16(s) => s.len(),
            Self::RealI16(s) => s.len(),
            Self::RealI32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Self::ComplexI16(_))
    }
}

/// IF data trailer indicators. `None` when the enable bit is clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketTrailer {
    pub valid_data: Option<bool>,
    pub reference_lock: Option<bool>,
    pub over_range: Option<bool>,
    pub sample_loss: Option<bool>,
}

impl PacketTrailer {
    pub fn from_word(word: u32) -> Self {
        // Enable bits sit 12 above their indicator bits
        let flag = |indicator: u32| {
            if word & (1 << (indicator + 12)) != 0 {
                Some(word & (1 << indicator) != 0)
            } else {
                None
            }
        };
        Self {
            valid_data: flag(18),
            reference_lock: flag(17),
            over_range: flag(13),
            sample_loss: flag(12),
        }
    }
}

/// Packet body, selected once from (stream id, packet type)
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Receiver(ReceiverContext),
    Digitizer(DigitizerContext),
    Extension(ExtensionContext),
    IfData {
        samples: IfSamples,
        trailer: Option<PacketTrailer>,
    },
}

/// One decoded packet
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Payload,
}
