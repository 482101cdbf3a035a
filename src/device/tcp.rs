//! Instrument link over TCP
//!
//! SCPI commands go over the control port (37001 by default). VRT packets
//! arrive on the data port (37000) and are framed by a dedicated reader thread
//! using the packet-size field of each header word, then handed over through a
//! bounded channel.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use super::{Device, DeviceError, DeviceStats, TriggerStatus};
use crate::config::Config;

/// Packets buffered between the reader thread and the capture loop
const PACKET_QUEUE_DEPTH: usize = 1024;

/// Replies to SCPI queries must arrive within this window
const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// How often a reader blocked on a full queue rechecks for shutdown
const QUEUE_POLL: Duration = Duration::from_millis(100);

/// Connected instrument
pub struct TcpDevice {
    host: String,
    control: BufReader<TcpStream>,
    data: TcpStream,
    packets: Receiver<Vec<u8>>,
    running: Arc<AtomicBool>,
    stats: Arc<DeviceStats>,
    reader: Option<JoinHandle<()>>,
}

impl TcpDevice {
    /// Open the control and data connections and start the packet reader
    pub fn connect(host: &str, config: &Config) -> Result<Self, DeviceError> {
        info!("Connecting to WSA at {}...", host);
        let control = open(host, config.control_port, config.connect_timeout())?;
        control.set_read_timeout(Some(QUERY_TIMEOUT))?;
        let data = open(host, config.data_port, config.connect_timeout())?;

        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(DeviceStats::new());
        let (packet_tx, packet_rx) = bounded::<Vec<u8>>(PACKET_QUEUE_DEPTH);

        let reader_stream = data.try_clone()?;
        let reader_running = running.clone();
        let reader_stats = stats.clone();
        let reader = thread::Builder::new()
            .name("vrt-reader".to_string())
            .spawn(move || run_reader(reader_stream, reader_running, reader_stats, packet_tx))?;

        info!("Connected to {} (control {}, data {})", host, config.control_port, config.data_port);

        Ok(Self {
            host: host.to_string(),
            control: BufReader::new(control),
            data,
            packets: packet_rx,
            running,
            stats,
            reader: Some(reader),
        })
    }

    /// Stop the reader thread and drop both connections
    pub fn close(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        info!("Closing connection to {}", self.host);
        self.running.store(false, Ordering::SeqCst);
        let _ = self.data.shutdown(Shutdown::Both);
        let _ = self.control.get_ref().shutdown(Shutdown::Both);
        if reader.join().is_err() {
            error!("VRT reader thread panicked");
        }
        info!(
            "Link closed. packets={} bytes={} flushed={} triggers={}",
            self.stats.get_packets(),
            self.stats.get_bytes(),
            self.stats.get_flushed(),
            self.stats.get_triggers()
        );
    }

    fn send(&mut self, command: &str) -> Result<(), DeviceError> {
        debug!("scpi> {}", command);
        let stream = self.control.get_mut();
        stream.write_all(command.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, DeviceError> {
        self.send(command)?;
        let mut line = String::new();
        match self.control.read_line(&mut line) {
            Ok(0) => Err(DeviceError::Disconnected),
            Ok(_) => {
                let reply = line.trim().to_string();
                debug!("scpi< {}", reply);
                Ok(reply)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(DeviceError::Protocol(format!("no reply to '{}'", command)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TcpDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl Device for TcpDevice {
    fn request_acquisition_access(&mut self) -> Result<bool, DeviceError> {
        let reply = self.query(":SYSTEM:LOCK:REQUEST? ACQ")?;
        Ok(reply == "1")
    }

    fn abort_capture(&mut self) -> Result<(), DeviceError> {
        self.send(":SYSTEM:ABORT")
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.send(":SYSTEM:FLUSH")?;
        let mut drained = 0u64;
        while self.packets.try_recv().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            debug!("Flushed {} stale packets", drained);
            self.stats.record_flushed(drained);
        }
        Ok(())
    }

    fn set_input_mode(&mut self, mode: &str) -> Result<(), DeviceError> {
        self.send(&format!(":INPUT:MODE {}", mode))
    }

    fn set_samples_per_packet(&mut self, samples: u16) -> Result<(), DeviceError> {
        self.send(&format!(":TRACE:SPPACKET {}", samples))
    }

    fn set_packets_per_block(&mut self, packets: u32) -> Result<(), DeviceError> {
        self.send(&format!(":TRACE:BLOCK:PACKETS {}", packets))
    }

    fn set_center_frequency(&mut self, frequency_hz: u64) -> Result<(), DeviceError> {
        self.send(&format!(":FREQ:CENTER {} Hz", frequency_hz))
    }

    fn trigger_capture(&mut self) -> Result<TriggerStatus, DeviceError> {
        self.send(":TRACE:BLOCK:DATA?")?;
        self.stats.record_trigger();
        let reply = self.query(":SYSTEM:ERROR?")?;
        Ok(parse_error_reply(&reply))
    }

    fn read_raw_packet(&mut self, timeout: Duration) -> Result<Vec<u8>, DeviceError> {
        match self.packets.recv_timeout(timeout) {
            Ok(packet) => Ok(packet),
            Err(RecvTimeoutError::Timeout) => Err(DeviceError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(DeviceError::Disconnected),
        }
    }
}

fn open(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, DeviceError> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err
        .map(DeviceError::Io)
        .unwrap_or_else(|| DeviceError::Protocol(format!("{} did not resolve", host))))
}

/// `:SYSTEM:ERROR?` answers `<code>,"<message>"`; code 0 means no error
fn parse_error_reply(reply: &str) -> TriggerStatus {
    let (code, message) = reply.split_once(',').unwrap_or((reply, ""));
    match code.trim().parse::<i32>() {
        Ok(0) => TriggerStatus::Accepted,
        _ => TriggerStatus::Rejected(message.trim().trim_matches('"').to_string()),
    }
}

/// Read one VRT packet off the stream. `Ok(None)` on a clean end of stream.
pub(crate) fn read_frame(stream: &mut impl Read) -> std::io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match stream.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let size_words = u16::from_be_bytes([header[2], header[3]]) as usize;
    if size_words < 2 {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("VRT packet size {} words is below the minimum", size_words),
        ));
    }
    let mut packet = vec![0u8; size_words * 4];
    packet[..4].copy_from_slice(&header);
    stream.read_exact(&mut packet[4..])?;
    Ok(Some(packet))
}

/// Queue a packet, giving up once the device is closing or the receiver is gone
fn forward(packet_tx: &Sender<Vec<u8>>, mut packet: Vec<u8>, running: &AtomicBool) -> bool {
    loop {
        match packet_tx.send_timeout(packet, QUEUE_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(p)) if running.load(Ordering::SeqCst) => packet = p,
            Err(_) => return false,
        }
    }
}

/// Packet framing loop (runs in dedicated thread)
fn run_reader(
    mut stream: TcpStream,
    running: Arc<AtomicBool>,
    stats: Arc<DeviceStats>,
    packet_tx: Sender<Vec<u8>>,
) {
    debug!("VRT reader started");
    while running.load(Ordering::SeqCst) {
        match read_frame(&mut stream) {
            Ok(Some(packet)) => {
                stats.record_packet(packet.len());
                if !forward(&packet_tx, packet, &running) {
                    break;
                }
            }
            Ok(None) => {
                warn!("VRT data stream closed (EOF)");
                break;
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    error!("VRT data stream error: {}", e);
                }
                break;
            }
        }
    }
    running.store(false, Ordering::SeqCst);
    debug!("VRT reader stopped");
}
