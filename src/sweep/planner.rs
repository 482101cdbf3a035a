//! Step planning and spectrum stitching

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::plan::{FrequencyPlan, SweepBuffer};
use crate::capture::{CaptureGeometry, CaptureResult, CaptureSession, DEFAULT_READ_TIMEOUT};
use crate::config::Config;
use crate::device::{Device, DeviceError};
use crate::error::{Result, SweepError};
use crate::spectrum::SpectralEstimator;

/// Bin width disagreement (Hz) tolerated before warning
const BIN_WIDTH_TOLERANCE_HZ: f64 = 1.0;

/// Knobs for one sweep
#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub geometry: CaptureGeometry,
    pub read_timeout: Duration,
    /// Extra attempts for a step that hit `CaptureTimeout`. 0 = fail on first timeout.
    pub capture_retries: u32,
    pub retry_backoff: Duration,
    /// Used when the instrument sends no digitizer reference level
    pub reference_level_dbm: f32,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            geometry: CaptureGeometry::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            capture_retries: 0,
            retry_backoff: Duration::ZERO,
            reference_level_dbm: 0.0,
        }
    }
}

impl SweepOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            geometry: CaptureGeometry::new(config.samples_per_packet)?,
            read_timeout: config.capture_timeout(),
            capture_retries: config.capture_retries,
            retry_backoff: config.retry_backoff(),
            reference_level_dbm: config.reference_level_dbm,
        })
    }
}

/// Capture steps needed to cover a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepLayout {
    pub bins_per_capture: usize,
    pub step_count: usize,
}

impl StepLayout {
    pub fn new(plan: &FrequencyPlan, geometry: &CaptureGeometry) -> Self {
        let bins_per_capture = geometry.bins_per_capture();
        Self {
            bins_per_capture,
            step_count: plan.bin_count().div_ceil(bins_per_capture),
        }
    }

    /// Hz covered by one step
    pub fn step_span_hz(&self, plan: &FrequencyPlan) -> u64 {
        self.bins_per_capture as u64 * plan.bin_hz()
    }

    /// Tuning frequency of step `k`: the centre of its sub-band.
    ///
    /// The last step is captured at full width, so its centre may sit above
    /// `fstop`; a centre that does not fit in a `u64` is an invalid plan.
    pub fn tuning_hz(&self, plan: &FrequencyPlan, k: usize) -> Result<u64> {
        let span = self.step_span_hz(plan);
        (k as u64)
            .checked_mul(span)
            .and_then(|offset| offset.checked_add(span / 2))
            .and_then(|offset| plan.fstart().checked_add(offset))
            .ok_or_else(|| {
                SweepError::invalid("fstop", plan.fstop(), "last capture step tunes beyond u64 Hz")
            })
    }

    /// Bins step `k` writes; the last step is clipped to what is left
    pub fn bins_in_step(&self, plan: &FrequencyPlan, k: usize) -> usize {
        let offset = k * self.bins_per_capture;
        self.bins_per_capture.min(plan.bin_count() - offset)
    }
}

/// Sweep `plan` in ascending steps and return the stitched spectrum.
///
/// All or nothing: the first failing step aborts the sweep and the partially
/// filled spectrum is dropped. Only `CaptureTimeout` is retried, and only up
/// to `options.capture_retries` times.
pub fn sweep(
    device: &mut dyn Device,
    plan: &FrequencyPlan,
    mode: &str,
    options: &SweepOptions,
) -> Result<SweepBuffer> {
    let layout = StepLayout::new(plan, &options.geometry);
    let bin_count = plan.bin_count();

    info!(
        "Sweep {} - {} Hz, rbw {} Hz: {} bins in {} step(s) of {} bins",
        plan.fstart(),
        plan.fstop(),
        plan.rbw(),
        bin_count,
        layout.step_count,
        layout.bins_per_capture
    );

    // Tunings ascend, so checking the last one covers every step
    layout.tuning_hz(plan, layout.step_count.saturating_sub(1))?;

    let mut bins: Vec<f32> = Vec::new();
    bins.try_reserve_exact(bin_count)
        .map_err(|_| SweepError::AllocationFailure { bins: bin_count })?;

    let session = CaptureSession::new(options.geometry, options.read_timeout);
    let mut estimator = SpectralEstimator::new(options.geometry.samples_per_packet() as usize)?;
    let mut bin_width_checked = false;

    for k in 0..layout.step_count {
        let tuning = layout.tuning_hz(plan, k)?;
        debug!("Step {}/{}: tuning to {} Hz", k + 1, layout.step_count, tuning);

        device
            .set_center_frequency(tuning)
            .map_err(|source: DeviceError| SweepError::Transport {
                context: "tune",
                source,
            })?;

        let started = Instant::now();
        let capture = capture_step(&session, device, mode, options)?;
        let captured = started.elapsed();

        if !bin_width_checked {
            check_bin_width(&capture, plan, &options.geometry);
            bin_width_checked = true;
        }
        if capture.sequence_gaps > 0 {
            warn!(
                "Step {} saw {} packet counter gap(s), {} packet(s) dropped",
                k + 1,
                capture.sequence_gaps,
                capture.dropped_packets
            );
        }
        if capture.duplicate_packets > 0 {
            warn!(
                "Step {} saw {} duplicate packet(s)",
                k + 1,
                capture.duplicate_packets
            );
        }
        if capture.skipped_packets > 0 {
            warn!(
                "Step {} skipped {} packet(s) on unknown streams",
                k + 1,
                capture.skipped_packets
            );
        }

        let reference_level = capture
            .reference_level_dbm()
            .unwrap_or(options.reference_level_dbm);
        let started = Instant::now();
        let power = estimator.estimate(&capture.samples, reference_level)?;
        debug!(
            "Step {} timing: capture {:?}, estimate {:?}",
            k + 1,
            captured,
            started.elapsed()
        );

        let take = layout.bins_in_step(plan, k);
        bins.extend_from_slice(&power[..take]);
    }

    debug_assert_eq!(bins.len(), bin_count);
    info!("Sweep complete: {} bins", bins.len());
    SweepBuffer::from_bins(*plan, bins)
}

fn capture_step(
    session: &CaptureSession,
    device: &mut dyn Device,
    mode: &str,
    options: &SweepOptions,
) -> Result<CaptureResult> {
    let mut attempt = 0;
    loop {
        match session.capture_one_block(device, mode) {
            Err(e) if e.is_retryable() && attempt < options.capture_retries => {
                attempt += 1;
                warn!(
                    "{} (attempt {}/{}), retrying in {:?}",
                    e,
                    attempt,
                    options.capture_retries + 1,
                    options.retry_backoff
                );
                if !options.retry_backoff.is_zero() {
                    thread::sleep(options.retry_backoff);
                }
            }
            other => return other,
        }
    }
}

fn check_bin_width(capture: &CaptureResult, plan: &FrequencyPlan, geometry: &CaptureGeometry) {
    let Some(rate) = capture.metadata.digitizer.and_then(|d| d.sample_rate_hz) else {
        return;
    };
    let bin_width = rate / geometry.samples_per_packet() as f64;
    if (bin_width - plan.bin_hz() as f64).abs() > BIN_WIDTH_TOLERANCE_HZ {
        warn!(
            "Instrument bin width {:.1} Hz differs from rbw {} Hz; bins are labelled on the rbw grid",
            bin_width,
            plan.rbw()
        );
    }
}
