//! VRT packet decoder
//!
//! Works on a buffer that already holds exactly one framed packet. All words
//! are big-endian. Layout:
//!
//! ```text
//! word 0   | type:4 | C:1 | T:1 | rsvd:2 | TSI:2 | TSF:2 | count:4 | size:16 |
//! word 1   | stream id                                                 |
//! [2 words | class id, when C]                                         |
//! [1 word  | integer timestamp (s), when TSI != 0]                     |
//! [2 words | fractional timestamp (ps), when TSF != 0]                 |
//! payload  | samples, or context indicator field + context fields      |
//! [1 word  | trailer, when T]                                          |
//! ```

use rustfft::num_complex::Complex;
use tracing::trace;

use super::types::*;
use crate::error::{Result, SweepError};

/// Header word plus stream id
const MIN_PACKET_WORDS: usize = 2;

/// Context fields carry 20 fractional bits for Hz values
const HZ_RADIX: f64 = (1u64 << 20) as f64;
/// Gain and reference level carry 7 fractional bits
const DB_RADIX: f32 = 128.0;
/// Temperature carries 6 fractional bits
const CELSIUS_RADIX: f32 = 64.0;

/// Context indicator bits the instrument sends
mod cif {
    pub const REFERENCE_POINT: u32 = 30;
    pub const BANDWIDTH: u32 = 29;
    pub const RF_REFERENCE_FREQUENCY: u32 = 27;
    pub const RF_FREQUENCY_OFFSET: u32 = 26;
    pub const REFERENCE_LEVEL: u32 = 24;
    pub const GAIN: u32 = 23;
    pub const SAMPLE_RATE: u32 = 21;
    pub const TEMPERATURE: u32 = 18;

    pub const STREAM_START_ID: u32 = 15;
    pub const SWEEP_START_ID: u32 = 14;
}

/// Width in words of each standard context field, by indicator bit
fn standard_field_words(bit: u32) -> Option<usize> {
    match bit {
        30 => Some(1),
        29 | 28 | 27 | 26 | 25 => Some(2),
        24 | 23 | 22 => Some(1),
        21 | 20 => Some(2),
        19 | 18 => Some(1),
        17 => Some(2),
        16 => Some(1),
        15 => Some(2),
        14 | 13 => Some(11),
        12 | 11 => Some(13),
        10 => Some(1),
        _ => None,
    }
}

/// Width in words of each extension context field, by indicator bit
fn extension_field_words(bit: u32) -> Option<usize> {
    match bit {
        cif::STREAM_START_ID | cif::SWEEP_START_ID => Some(1),
        _ => None,
    }
}

/// Big-endian word cursor over a packet buffer
struct Words<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Words<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        (self.buf.len() - self.pos) / 4
    }

    fn next_u32(&mut self) -> Result<u32> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| SweepError::malformed(format!("truncated at byte {}", self.pos)))?;
        self.pos += 4;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn next_u64(&mut self) -> Result<u64> {
        let hi = self.next_u32()? as u64;
        let lo = self.next_u32()? as u64;
        Ok((hi << 32) | lo)
    }

    fn skip(&mut self, words: usize) -> Result<()> {
        if words > self.remaining() {
            return Err(SweepError::malformed(format!(
                "field of {} words overruns packet ({} left)",
                words,
                self.remaining()
            )));
        }
        self.pos += words * 4;
        Ok(())
    }
}

/// Decode one framed packet into a typed header and payload.
///
/// Fails with [`SweepError::MalformedPacket`] when the buffer disagrees with
/// the declared size or a field is truncated, and with
/// [`SweepError::UnknownStreamId`] for stream ids outside the known set.
pub fn read_packet(buf: &[u8]) -> Result<Packet> {
    if buf.len() % 4 != 0 {
        return Err(SweepError::malformed(format!(
            "length {} is not a whole number of words",
            buf.len()
        )));
    }
    if buf.len() < MIN_PACKET_WORDS * 4 {
        return Err(SweepError::malformed(format!(
            "packet too short: {} bytes",
            buf.len()
        )));
    }

    let mut words = Words::new(buf);
    let header_word = words.next_u32()?;
    let raw_type = ((header_word >> 28) & 0x0F) as u8;
    let class_id_present = (header_word >> 27) & 1 == 1;
    let trailer_present = (header_word >> 26) & 1 == 1;
    let tsi = (header_word >> 22) & 0x3;
    let tsf = (header_word >> 20) & 0x3;
    let packet_count = ((header_word >> 16) & 0x0F) as u8;
    let packet_size_words = (header_word & 0xFFFF) as u16;

    if packet_size_words as usize * 4 != buf.len() {
        return Err(SweepError::malformed(format!(
            "declared size {} words ({} bytes) but buffer holds {} bytes",
            packet_size_words,
            packet_size_words as usize * 4,
            buf.len()
        )));
    }

    let packet_type = PacketType::from_wire(raw_type)
        .ok_or_else(|| SweepError::malformed(format!("unsupported packet type {}", raw_type)))?;

    let raw_stream_id = words.next_u32()?;
    let stream_id = StreamId::from_raw(raw_stream_id).ok_or(SweepError::UnknownStreamId {
        stream_id: raw_stream_id,
    })?;

    if class_id_present {
        words.skip(2)?;
    }

    let mut timestamp = Timestamp::default();
    if tsi != 0 {
        timestamp.sec = words.next_u32()?;
    }
    if tsf != 0 {
        timestamp.picosec = words.next_u64()?;
    }

    let expected = if stream_id.is_data() {
        PacketType::If
    } else if stream_id == StreamId::Extension {
        PacketType::Extension
    } else {
        PacketType::Context
    };
    if packet_type != expected {
        return Err(SweepError::malformed(format!(
            "{} stream carried a {} packet",
            stream_id.name(),
            packet_type
        )));
    }

    let (payload, samples_per_packet) = match stream_id {
        StreamId::Receiver => (Payload::Receiver(read_receiver(&mut words)?), 0),
        StreamId::Digitizer => (Payload::Digitizer(read_digitizer(&mut words)?), 0),
        StreamId::Extension => (Payload::Extension(read_extension(&mut words)?), 0),
        data_stream => {
            let trailer_words = usize::from(trailer_present);
            if words.remaining() < trailer_words {
                return Err(SweepError::malformed("trailer missing"));
            }
            let payload_words = words.remaining() - trailer_words;
            let samples = read_samples(&mut words, data_stream, payload_words)?;
            let trailer = if trailer_present {
                Some(PacketTrailer::from_word(words.next_u32()?))
            } else {
                None
            };
            let spp = u16::try_from(samples.len()).map_err(|_| {
                SweepError::malformed(format!("{} samples exceed a 16-bit count", samples.len()))
            })?;
            (Payload::IfData { samples, trailer }, spp)
        }
    };

    let header = PacketHeader {
        stream_id,
        packet_type,
        packet_count,
        packet_size_words,
        samples_per_packet,
        timestamp,
    };
    trace!("decoded {}", header);

    Ok(Packet { header, payload })
}

fn read_samples(words: &mut Words<'_>, stream_id: StreamId, payload_words: usize) -> Result<IfSamples> {
    let samples = match stream_id {
        StreamId::I16Q16Data => {
            let mut out = Vec::with_capacity(payload_words);
            for _ in 0..payload_words {
                let w = words.next_u32()?;
                out.push(Complex::new((w >> 16) as u16 as i16, w as u16 as i16));
            }
            IfSamples::ComplexI16(out)
        }
        StreamId::I16Data => {
            let mut out = Vec::with_capacity(payload_words * 2);
            for _ in 0..payload_words {
                let w = words.next_u32()?;
                out.push((w >> 16) as u16 as i16);
                out.push(w as u16 as i16);
            }
            IfSamples::RealI16(out)
        }
        StreamId::I32Data => {
            let mut out = Vec::with_capacity(payload_words);
            for _ in 0..payload_words {
                out.push(words.next_u32()? as i32);
            }
            IfSamples::RealI32(out)
        }
        other => {
            return Err(SweepError::malformed(format!(
                "{} is not a data stream",
                other.name()
            )))
        }
    };
    Ok(samples)
}

/// Walk the indicator bits from high to low, handing each present field to `visit`
fn walk_fields(
    words: &mut Words<'_>,
    width: fn(u32) -> Option<usize>,
    mut visit: impl FnMut(u32, &mut Words<'_>) -> Result<bool>,
) -> Result<()> {
    let indicators = words.next_u32()?;
    for bit in (0..31).rev() {
        if indicators & (1 << bit) == 0 {
            continue;
        }
        let field_words = width(bit).ok_or_else(|| {
            SweepError::malformed(format!("context indicator bit {} has no known layout", bit))
        })?;
        let start = words.pos;
        let consumed = visit(bit, words)?;
        if !consumed {
            words.pos = start;
            words.skip(field_words)?;
        }
    }
    Ok(())
}

fn hz(raw: u64) -> f64 {
    raw as i64 as f64 / HZ_RADIX
}

fn db(raw: u16) -> f32 {
    raw as i16 as f32 / DB_RADIX
}

fn read_receiver(words: &mut Words<'_>) -> Result<ReceiverContext> {
    let mut ctx = ReceiverContext::default();
    walk_fields(words, standard_field_words, |bit, w| {
        match bit {
            cif::REFERENCE_POINT => ctx.reference_point = Some(w.next_u32()?),
            cif::RF_REFERENCE_FREQUENCY => ctx.frequency_hz = Some(hz(w.next_u64()?)),
            cif::GAIN => {
                let g = w.next_u32()?;
                ctx.gain_rf_db = Some(db((g >> 16) as u16));
                ctx.gain_if_db = Some(db(g as u16));
            }
            cif::TEMPERATURE => {
                ctx.temperature_c = Some(w.next_u32()? as u16 as i16 as f32 / CELSIUS_RADIX)
            }
            _ => return Ok(false),
        }
        Ok(true)
    })?;
    Ok(ctx)
}

fn read_digitizer(words: &mut Words<'_>) -> Result<DigitizerContext> {
    let mut ctx = DigitizerContext::default();
    walk_fields(words, standard_field_words, |bit, w| {
        match bit {
            cif::BANDWIDTH => ctx.bandwidth_hz = Some(hz(w.next_u64()?)),
            cif::RF_FREQUENCY_OFFSET => ctx.rf_frequency_offset_hz = Some(hz(w.next_u64()?)),
            cif::REFERENCE_LEVEL => ctx.reference_level_dbm = Some(db(w.next_u32()? as u16)),
            cif::SAMPLE_RATE => ctx.sample_rate_hz = Some(hz(w.next_u64()?)),
            _ => return Ok(false),
        }
        Ok(true)
    })?;
    Ok(ctx)
}

fn read_extension(words: &mut Words<'_>) -> Result<ExtensionContext> {
    let mut ctx = ExtensionContext::default();
    walk_fields(words, extension_field_words, |bit, w| {
        match bit {
            cif::STREAM_START_ID => ctx.stream_start_id = Some(w.next_u32()?),
            cif::SWEEP_START_ID => ctx.sweep_start_id = Some(w.next_u32()?),
            _ => return Ok(false),
        }
        Ok(true)
    })?;
    Ok(ctx)
}
