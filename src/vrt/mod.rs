//! VRT packet decoding
//!
//! The instrument streams VITA-49 style packets: context packets describing
//! receiver/digitizer state and IF data packets carrying raw samples. Framing
//! is done by the transport; this module only decodes a delimited buffer.

mod reader;
mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use reader::read_packet;
pub use types::{
    DigitizerContext, ExtensionContext, IfSamples, Packet, PacketHeader, PacketTrailer,
    PacketType, Payload, ReceiverContext, StreamId, Timestamp,
};
