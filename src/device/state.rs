//! Link statistics shared with the packet reader thread

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one instrument connection
#[derive(Debug, Default)]
pub struct DeviceStats {
    pub packets_framed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub packets_flushed: AtomicU64,
    pub captures_triggered: AtomicU64,
}

impl DeviceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet(&self, bytes: usize) {
        self.packets_framed.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_flushed(&self, packets: u64) {
        self.packets_flushed.fetch_add(packets, Ordering::Relaxed);
    }

    pub fn record_trigger(&self) {
        self.captures_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_packets(&self) -> u64 {
        self.packets_framed.load(Ordering::Relaxed)
    }

    pub fn get_bytes(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn get_flushed(&self) -> u64 {
        self.packets_flushed.load(Ordering::Relaxed)
    }

    pub fn get_triggers(&self) -> u64 {
        self.captures_triggered.load(Ordering::Relaxed)
    }
}
