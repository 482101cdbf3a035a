//! Scripted in-memory instrument for tests

use std::collections::VecDeque;
use std::time::Duration;

use super::{Device, DeviceError, TriggerStatus};

/// What the instrument does in response to one trigger
pub enum Script {
    /// Queue these framed packets for reading
    Packets(Vec<Vec<u8>>),
    /// Reject the trigger
    Busy(String),
    /// Accept the trigger but never send anything
    Silent,
    /// Fail the link on the first read
    Broken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Mode(String),
    SamplesPerPacket(u16),
    PacketsPerBlock(u32),
    Center(u64),
    Flush,
    Trigger,
}

type Generator = Box<dyn FnMut(u64) -> Script>;

pub struct MockDevice {
    scripts: VecDeque<Script>,
    generator: Option<Generator>,
    pending: VecDeque<Vec<u8>>,
    broken: bool,
    center_hz: u64,
    pub calls: Vec<Call>,
}

impl MockDevice {
    /// Answer triggers with `scripts` in order, then stay silent
    pub fn scripted(scripts: Vec<Script>) -> Self {
        Self {
            scripts: scripts.into(),
            generator: None,
            pending: VecDeque::new(),
            broken: false,
            center_hz: 0,
            calls: Vec::new(),
        }
    }

    /// Answer every trigger by calling `generator` with the current tuning
    pub fn generated(generator: impl FnMut(u64) -> Script + 'static) -> Self {
        let mut device = Self::scripted(Vec::new());
        device.generator = Some(Box::new(generator));
        device
    }

    /// Packets already sitting in the link before any trigger
    pub fn with_stale(mut self, packets: Vec<Vec<u8>>) -> Self {
        self.pending.extend(packets);
        self
    }

    pub fn triggers(&self) -> usize {
        self.calls.iter().filter(|c| **c == Call::Trigger).count()
    }

    pub fn tunings(&self) -> Vec<u64> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Center(hz) => Some(*hz),
                _ => None,
            })
            .collect()
    }
}

impl Device for MockDevice {
    fn request_acquisition_access(&mut self) -> Result<bool, DeviceError> {
        Ok(true)
    }

    fn abort_capture(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.calls.push(Call::Flush);
        self.pending.clear();
        Ok(())
    }

    fn set_input_mode(&mut self, mode: &str) -> Result<(), DeviceError> {
        self.calls.push(Call::Mode(mode.to_string()));
        Ok(())
    }

    fn set_samples_per_packet(&mut self, samples: u16) -> Result<(), DeviceError> {
        self.calls.push(Call::SamplesPerPacket(samples));
        Ok(())
    }

    fn set_packets_per_block(&mut self, packets: u32) -> Result<(), DeviceError> {
        self.calls.push(Call::PacketsPerBlock(packets));
        Ok(())
    }

    fn set_center_frequency(&mut self, frequency_hz: u64) -> Result<(), DeviceError> {
        self.calls.push(Call::Center(frequency_hz));
        self.center_hz = frequency_hz;
        Ok(())
    }

    fn trigger_capture(&mut self) -> Result<TriggerStatus, DeviceError> {
        self.calls.push(Call::Trigger);
        let script = match self.generator.as_mut() {
            Some(generate) => generate(self.center_hz),
            None => self.scripts.pop_front().unwrap_or(Script::Silent),
        };
        match script {
            Script::Packets(packets) => self.pending.extend(packets),
            Script::Busy(reason) => return Ok(TriggerStatus::Rejected(reason)),
            Script::Silent => {}
            Script::Broken => self.broken = true,
        }
        Ok(TriggerStatus::Accepted)
    }

    fn read_raw_packet(&mut self, _timeout: Duration) -> Result<Vec<u8>, DeviceError> {
        if self.broken {
            return Err(DeviceError::Disconnected);
        }
        self.pending.pop_front().ok_or(DeviceError::Timeout)
    }
}
