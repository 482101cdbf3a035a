//! Single block acquisition
//!
//! One capture configures the instrument, flushes stale data, triggers, and
//! reads packets until the first IF data packet shows up. Context packets seen
//! on the way are kept as stream metadata. Nothing is retried here.

mod sequence;

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::device::{Device, DeviceError, TriggerStatus};
use crate::error::{Result, SweepError};
use crate::vrt::{
    read_packet, DigitizerContext, ExtensionContext, IfSamples, PacketHeader, PacketTrailer,
    Payload, ReceiverContext,
};

pub use sequence::{Continuity, SequenceTracker};

/// Default deadline for the IF packet after a trigger
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Samples per packet and packets per block requested from the instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureGeometry {
    samples_per_packet: u16,
    packets_per_block: u32,
}

impl CaptureGeometry {
    pub const MIN_SAMPLES: u16 = 16;
    pub const MAX_SAMPLES: u16 = 32768;

    /// `samples_per_packet` must be a power of two in `16..=32768`
    pub fn new(samples_per_packet: u16) -> Result<Self> {
        if !samples_per_packet.is_power_of_two()
            || !(Self::MIN_SAMPLES..=Self::MAX_SAMPLES).contains(&samples_per_packet)
        {
            return Err(SweepError::invalid(
                "samples_per_packet",
                samples_per_packet,
                "must be a power of two between 16 and 32768",
            ));
        }
        Ok(Self {
            samples_per_packet,
            packets_per_block: 1,
        })
    }

    pub fn samples_per_packet(&self) -> u16 {
        self.samples_per_packet
    }

    pub fn packets_per_block(&self) -> u32 {
        self.packets_per_block
    }

    /// Spectrum bins one capture contributes to a sweep
    pub fn bins_per_capture(&self) -> usize {
        self.samples_per_packet as usize / 2
    }
}

impl Default for CaptureGeometry {
    fn default() -> Self {
        Self {
            samples_per_packet: 1024,
            packets_per_block: 1,
        }
    }
}

/// Latest context seen before the IF packet
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamMetadata {
    pub receiver: Option<ReceiverContext>,
    pub digitizer: Option<DigitizerContext>,
    pub extension: Option<ExtensionContext>,
}

/// Raw samples of one capture plus the stream state that came with them
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub header: PacketHeader,
    pub samples: IfSamples,
    pub trailer: Option<PacketTrailer>,
    pub metadata: StreamMetadata,
    /// Packet counter discontinuities observed while reading
    pub sequence_gaps: u32,
    /// Lower bound on packets lost across those discontinuities
    pub dropped_packets: u32,
    /// Packets that repeated their stream's previous counter
    pub duplicate_packets: u32,
    /// Packets skipped because of an unrecognized stream id
    pub skipped_packets: u32,
}

impl CaptureResult {
    pub fn reference_level_dbm(&self) -> Option<f32> {
        self.metadata.digitizer.and_then(|d| d.reference_level_dbm)
    }
}

/// Drives single-block acquisitions with a fixed geometry and read deadline
#[derive(Debug, Clone)]
pub struct CaptureSession {
    geometry: CaptureGeometry,
    read_timeout: Duration,
}

impl CaptureSession {
    pub fn new(geometry: CaptureGeometry, read_timeout: Duration) -> Self {
        Self {
            geometry,
            read_timeout,
        }
    }

    /// Acquire one block in `mode` and return the first IF packet's samples
    pub fn capture_one_block(&self, device: &mut dyn Device, mode: &str) -> Result<CaptureResult> {
        let spp = self.geometry.samples_per_packet;

        device
            .set_input_mode(mode)
            .map_err(transport("set input mode"))?;
        device
            .set_samples_per_packet(spp)
            .map_err(transport("set samples per packet"))?;
        device
            .set_packets_per_block(self.geometry.packets_per_block)
            .map_err(transport("set packets per block"))?;
        device.flush().map_err(transport("flush"))?;

        match device.trigger_capture().map_err(transport("trigger"))? {
            TriggerStatus::Accepted => {}
            TriggerStatus::Rejected(reason) => return Err(SweepError::DeviceBusy { reason }),
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut metadata = StreamMetadata::default();
        let mut sequence = SequenceTracker::new();
        let mut skipped_packets = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timed_out());
            }

            let raw = match device.read_raw_packet(remaining) {
                Ok(raw) => raw,
                Err(DeviceError::Timeout) => return Err(self.timed_out()),
                Err(e) => return Err(transport("packet read")(e)),
            };

            let packet = match read_packet(&raw) {
                Ok(packet) => packet,
                Err(SweepError::UnknownStreamId { stream_id }) => {
                    warn!("Skipping packet with unknown stream id 0x{:08x}", stream_id);
                    skipped_packets += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            debug!("{}", packet.header);
            match sequence.observe(&packet.header) {
                Continuity::InOrder => {}
                Continuity::Duplicate => warn!(
                    "{} packet counter repeated {}: duplicate packet",
                    packet.header.stream_id.name(),
                    packet.header.packet_count
                ),
                Continuity::Gap(missing) => warn!(
                    "{} packet counter jumped to {}: {} packet(s) dropped",
                    packet.header.stream_id.name(),
                    packet.header.packet_count,
                    missing
                ),
            }

            match packet.payload {
                Payload::Receiver(ctx) => metadata.receiver = Some(ctx),
                Payload::Digitizer(ctx) => metadata.digitizer = Some(ctx),
                Payload::Extension(ctx) => metadata.extension = Some(ctx),
                Payload::IfData { samples, trailer } => {
                    if samples.len() != spp as usize {
                        return Err(SweepError::malformed(format!(
                            "expected {} samples, IF packet carried {}",
                            spp,
                            samples.len()
                        )));
                    }
                    if let Some(t) = trailer {
                        report_trailer(&t);
                    }
                    if let Some(utc) = packet.header.timestamp.to_utc() {
                        debug!("IF block captured at {}", utc.format("%Y-%m-%d %H:%M:%S%.6f UTC"));
                    }
                    return Ok(CaptureResult {
                        header: packet.header,
                        samples,
                        trailer,
                        metadata,
                        sequence_gaps: sequence.gaps(),
                        dropped_packets: sequence.dropped(),
                        duplicate_packets: sequence.duplicates(),
                        skipped_packets,
                    });
                }
            }
        }
    }

    fn timed_out(&self) -> SweepError {
        SweepError::CaptureTimeout {
            timeout_ms: self.read_timeout.as_millis() as u64,
        }
    }
}

/// Capture one block with the default read deadline
pub fn capture_one_block(
    device: &mut dyn Device,
    mode: &str,
    samples_per_packet: u16,
) -> Result<CaptureResult> {
    let geometry = CaptureGeometry::new(samples_per_packet)?;
    CaptureSession::new(geometry, DEFAULT_READ_TIMEOUT).capture_one_block(device, mode)
}

fn transport(context: &'static str) -> impl Fn(DeviceError) -> SweepError {
    move |source| SweepError::Transport { context, source }
}

fn report_trailer(trailer: &PacketTrailer) {
    if trailer.over_range == Some(true) {
        warn!("IF data over range; reduce input level or change attenuation");
    }
    if trailer.sample_loss == Some(true) {
        warn!("Instrument reported sample loss in IF block");
    }
    if trailer.valid_data == Some(false) {
        warn!("Instrument flagged IF block as not valid");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{Call, MockDevice, Script};
    use crate::vrt::fixtures::PacketBuilder;
    use crate::vrt::{PacketType, StreamId};
    use rustfft::num_complex::Complex;

    fn iq_packet(count: u8, n: usize) -> Vec<u8> {
        let samples: Vec<Complex<i16>> = (0..n).map(|i| Complex::new(i as i16, -(i as i16))).collect();
        PacketBuilder::data(StreamId::I16Q16Data, count).iq(&samples).build()
    }

    fn session(spp: u16) -> CaptureSession {
        CaptureSession::new(CaptureGeometry::new(spp).unwrap(), Duration::from_millis(50))
    }

    #[test]
    fn test_geometry_validation() {
        assert!(CaptureGeometry::new(1024).is_ok());
        assert_eq!(CaptureGeometry::new(64).unwrap().bins_per_capture(), 32);
        assert!(matches!(CaptureGeometry::new(1000), Err(SweepError::InvalidPlan { .. })));
        assert!(matches!(CaptureGeometry::new(8), Err(SweepError::InvalidPlan { .. })));
    }

    #[test]
    fn test_configures_device_before_trigger() {
        let mut device = MockDevice::scripted(vec![Script::Packets(vec![iq_packet(0, 32)])]);
        session(32).capture_one_block(&mut device, "SH").unwrap();
        assert_eq!(
            device.calls,
            vec![
                Call::Mode("SH".to_string()),
                Call::SamplesPerPacket(32),
                Call::PacketsPerBlock(1),
                Call::Flush,
                Call::Trigger,
            ]
        );
    }

    #[test]
    fn test_context_packets_become_metadata() {
        let mut device = MockDevice::scripted(vec![Script::Packets(vec![
            PacketBuilder::receiver(2_400_000_000, 0).build(),
            PacketBuilder::digitizer(-15.0, 125_000_000, 0).build(),
            iq_packet(0, 32),
        ])]);
        let result = session(32).capture_one_block(&mut device, "SH").unwrap();
        assert_eq!(result.header.samples_per_packet, 32);
        assert_eq!(result.reference_level_dbm(), Some(-15.0));
        assert_eq!(
            result.metadata.receiver.and_then(|r| r.frequency_hz),
            Some(2_400_000_000.0)
        );
        assert!(result.samples.is_complex());
    }

    #[test]
    fn test_unknown_stream_id_is_skipped() {
        let unknown = PacketBuilder::raw(PacketType::Context, 0x1234_5678, 0)
            .words(&[0])
            .build();
        let mut device =
            MockDevice::scripted(vec![Script::Packets(vec![unknown, iq_packet(4, 32)])]);
        let result = session(32).capture_one_block(&mut device, "SH").unwrap();
        assert_eq!(result.skipped_packets, 1);
        assert_eq!(result.header.packet_count, 4);
    }

    #[test]
    fn test_stale_packets_are_flushed() {
        let mut device = MockDevice::scripted(vec![Script::Packets(vec![iq_packet(9, 32)])])
            .with_stale(vec![iq_packet(1, 32)]);
        let result = session(32).capture_one_block(&mut device, "SH").unwrap();
        assert_eq!(result.header.packet_count, 9);
    }

    #[test]
    fn test_no_if_packet_times_out() {
        let mut device = MockDevice::scripted(vec![Script::Packets(vec![
            PacketBuilder::receiver(2_400_000_000, 0).build(),
        ])]);
        match session(32).capture_one_block(&mut device, "SH") {
            Err(SweepError::CaptureTimeout { timeout_ms }) => assert_eq!(timeout_ms, 50),
            other => panic!("expected CaptureTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_rejected_trigger_is_device_busy() {
        let mut device = MockDevice::scripted(vec![Script::Busy("locked by 10.0.0.2".into())]);
        match session(32).capture_one_block(&mut device, "SH") {
            Err(SweepError::DeviceBusy { reason }) => assert_eq!(reason, "locked by 10.0.0.2"),
            other => panic!("expected DeviceBusy, got {:?}", other),
        }
    }

    #[test]
    fn test_link_failure_is_transport_error() {
        let mut device = MockDevice::scripted(vec![Script::Broken]);
        assert!(matches!(
            session(32).capture_one_block(&mut device, "SH"),
            Err(SweepError::Transport { .. })
        ));
    }

    #[test]
    fn test_malformed_packet_aborts_capture() {
        let mut bad = iq_packet(0, 32);
        bad.truncate(bad.len() - 4);
        let mut device = MockDevice::scripted(vec![Script::Packets(vec![bad, iq_packet(1, 32)])]);
        assert!(matches!(
            session(32).capture_one_block(&mut device, "SH"),
            Err(SweepError::MalformedPacket { .. })
        ));
    }

    #[test]
    fn test_wrong_sample_count_is_malformed() {
        let mut device = MockDevice::scripted(vec![Script::Packets(vec![iq_packet(0, 16)])]);
        assert!(matches!(
            session(32).capture_one_block(&mut device, "SH"),
            Err(SweepError::MalformedPacket { .. })
        ));
    }

    #[test]
    fn test_sequence_gap_is_counted() {
        let mut device = MockDevice::scripted(vec![Script::Packets(vec![
            PacketBuilder::digitizer(0.0, 125_000_000, 1).build(),
            PacketBuilder::digitizer(0.0, 125_000_000, 4).build(),
            iq_packet(0, 32),
        ])]);
        let result = session(32).capture_one_block(&mut device, "SH").unwrap();
        assert_eq!(result.sequence_gaps, 1);
        assert_eq!(result.dropped_packets, 2);
        assert_eq!(result.duplicate_packets, 0);
    }

    #[test]
    fn test_repeated_counter_is_reported_as_duplicate() {
        let mut device = MockDevice::scripted(vec![Script::Packets(vec![
            PacketBuilder::digitizer(0.0, 125_000_000, 6).build(),
            PacketBuilder::digitizer(0.0, 125_000_000, 6).build(),
            iq_packet(0, 32),
        ])]);
        let result = session(32).capture_one_block(&mut device, "SH").unwrap();
        assert_eq!(result.sequence_gaps, 0);
        assert_eq!(result.dropped_packets, 0);
        assert_eq!(result.duplicate_packets, 1);
    }

    #[test]
    fn test_free_function_uses_requested_geometry() {
        let mut device = MockDevice::scripted(vec![Script::Packets(vec![iq_packet(0, 64)])]);
        let result = capture_one_block(&mut device, "SH", 64).unwrap();
        assert_eq!(result.samples.len(), 64);
        assert!(matches!(
            capture_one_block(&mut device, "SH", 100),
            Err(SweepError::InvalidPlan { .. })
        ));
    }
}
