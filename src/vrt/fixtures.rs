//! Wire packet builder for tests

use rustfft::num_complex::Complex;

use super::types::{PacketType, StreamId};

pub struct PacketBuilder {
    packet_type: u8,
    stream_id: u32,
    count: u8,
    trailer: Option<u32>,
    class_id: Option<[u32; 2]>,
    timestamped: bool,
    body: Vec<u32>,
}

impl PacketBuilder {
    /// IF data packet with a timestamp and an empty trailer
    pub fn data(stream_id: StreamId, count: u8) -> Self {
        Self {
            packet_type: PacketType::If.wire(),
            stream_id: stream_id.raw(),
            count,
            trailer: Some(0),
            class_id: None,
            timestamped: true,
            body: Vec::new(),
        }
    }

    /// Packet on an arbitrary raw stream id
    pub fn raw(packet_type: PacketType, stream_id: u32, count: u8) -> Self {
        Self {
            packet_type: packet_type.wire(),
            stream_id,
            count,
            trailer: None,
            class_id: None,
            timestamped: true,
            body: Vec::new(),
        }
    }

    /// Receiver context carrying only the RF reference frequency
    pub fn receiver(frequency_hz: u64, count: u8) -> Self {
        let raw = frequency_hz << 20;
        Self::raw(PacketType::Context, StreamId::Receiver.raw(), count).words(&[
            1 << 27,
            (raw >> 32) as u32,
            raw as u32,
        ])
    }

    /// Digitizer context carrying the reference level and sample rate
    pub fn digitizer(reference_level_dbm: f32, sample_rate_hz: u64, count: u8) -> Self {
        let level = ((reference_level_dbm * 128.0) as i16) as u16 as u32;
        let rate = sample_rate_hz << 20;
        Self::raw(PacketType::Context, StreamId::Digitizer.raw(), count).words(&[
            (1 << 24) | (1 << 21),
            level,
            (rate >> 32) as u32,
            rate as u32,
        ])
    }

    pub fn trailer(mut self, word: u32) -> Self {
        self.trailer = Some(word);
        self
    }

    pub fn class_id(mut self, oui: u32, codes: u32) -> Self {
        self.class_id = Some([oui, codes]);
        self
    }

    /// Drop the integer and fractional timestamp (TSI = TSF = 0)
    pub fn without_timestamp(mut self) -> Self {
        self.timestamped = false;
        self
    }

    pub fn words(mut self, words: &[u32]) -> Self {
        self.body.extend_from_slice(words);
        self
    }

    pub fn iq(self, samples: &[Complex<i16>]) -> Self {
        let words: Vec<u32> = samples
            .iter()
            .map(|s| ((s.re as u16 as u32) << 16) | s.im as u16 as u32)
            .collect();
        self.words(&words)
    }

    /// Real 16-bit samples, two per word, first sample in the upper half
    pub fn real(self, samples: &[i16]) -> Self {
        let words: Vec<u32> = samples
            .chunks(2)
            .map(|pair| {
                let hi = pair[0] as u16 as u32;
                let lo = pair.get(1).map_or(0, |s| *s as u16 as u32);
                (hi << 16) | lo
            })
            .collect();
        self.words(&words)
    }

    pub fn build(self) -> Vec<u8> {
        let mut prefix = Vec::new();
        if let Some(class_id) = self.class_id {
            prefix.extend_from_slice(&class_id);
        }
        if self.timestamped {
            prefix.extend_from_slice(&[1_700_000_000, 0, 0]);
        }
        let timestamp_bits = if self.timestamped { (0b01 << 22) | (0b10 << 20) } else { 0 };

        let trailer_words = usize::from(self.trailer.is_some());
        let size = 2 + prefix.len() + self.body.len() + trailer_words;
        let header = ((self.packet_type as u32) << 28)
            | ((self.class_id.is_some() as u32) << 27)
            | ((self.trailer.is_some() as u32) << 26)
            | timestamp_bits
            | (((self.count & 0x0F) as u32) << 16)
            | size as u32;

        let mut words = vec![header, self.stream_id];
        words.extend(prefix);
        words.extend(self.body);
        if let Some(t) = self.trailer {
            words.push(t);
        }
        words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }
}
