//! Packet counter continuity per stream

use std::collections::HashMap;

use crate::vrt::{PacketHeader, StreamId};

/// How a packet's counter relates to the previous one on its stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// First packet of the stream, or the expected next count
    InOrder,
    /// Same count as the previous packet
    Duplicate,
    /// This many packets (mod 16) went missing before this one
    Gap(u8),
}

/// Tracks the 4-bit rolling packet counter of each stream
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: HashMap<StreamId, u8>,
    gaps: u32,
    dropped: u32,
    duplicates: u32,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a header and classify its counter against the stream's last one
    pub fn observe(&mut self, header: &PacketHeader) -> Continuity {
        let count = header.packet_count & 0x0F;
        let Some(prev) = self.last.insert(header.stream_id, count) else {
            return Continuity::InOrder;
        };
        if count == prev {
            self.duplicates += 1;
            return Continuity::Duplicate;
        }
        match count.wrapping_sub(prev.wrapping_add(1)) & 0x0F {
            0 => Continuity::InOrder,
            missing => {
                self.gaps += 1;
                self.dropped += missing as u32;
                Continuity::Gap(missing)
            }
        }
    }

    /// Number of discontinuities seen
    pub fn gaps(&self) -> u32 {
        self.gaps
    }

    /// Lower bound on packets lost across all gaps
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Packets that repeated their stream's previous count
    pub fn duplicates(&self) -> u32 {
        self.duplicates
    }
}
