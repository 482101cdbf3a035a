//! Power spectrum of one capture block

use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use super::window::Window;
use crate::error::{Result, SweepError};
use crate::vrt::IfSamples;

/// Floor applied before taking the log so empty bins stay finite (-200 dB)
const POWER_FLOOR: f64 = 1e-20;

const I16_FULL_SCALE: f64 = 32768.0;
const I32_FULL_SCALE: f64 = 2147483648.0;

/// dB offset turning `10 log10 |X_k|^2` into dBm.
///
/// A pure function of its inputs: a full-scale tone centred on a bin reads the
/// reference level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    db: f64,
}

impl ScaleFactor {
    pub fn new(reference_level_dbm: f32, coherent_gain: f64, fft_size: usize, one_sided: bool) -> Self {
        let mut db = reference_level_dbm as f64 - 20.0 * (fft_size as f64 * coherent_gain).log10();
        if one_sided {
            // a real tone splits its energy between +f and -f
            db += 20.0 * 2f64.log10();
        }
        Self { db }
    }

    pub fn db(&self) -> f64 {
        self.db
    }
}

/// Windowed FFT power estimator for a fixed block size
pub struct SpectralEstimator {
    fft_size: usize,
    fft: Arc<dyn Fft<f64>>,
    window: Window,
    buffer: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

impl fmt::Debug for SpectralEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralEstimator")
            .field("fft_size", &self.fft_size)
            .finish()
    }
}

impl SpectralEstimator {
    /// `fft_size` must be a power of two of at least 4
    pub fn new(fft_size: usize) -> Result<Self> {
        if fft_size < 4 || !fft_size.is_power_of_two() {
            return Err(SweepError::invalid("fft_size", fft_size, "must be a power of two >= 4"));
        }
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Ok(Self {
            fft_size,
            fft,
            window: Window::hann(fft_size),
            buffer: vec![Complex64::new(0.0, 0.0); fft_size],
            scratch,
        })
    }

    /// Bins produced per block
    pub fn bins(&self) -> usize {
        self.fft_size / 2
    }

    pub fn scale_factor(&self, reference_level_dbm: f32, one_sided: bool) -> ScaleFactor {
        ScaleFactor::new(
            reference_level_dbm,
            self.window.coherent_gain(),
            self.fft_size,
            one_sided,
        )
    }

    /// Convert one block to `fft_size / 2` power values in dBm, ascending in
    /// frequency.
    ///
    /// Real input keeps bins `0..N/2`. Complex input keeps the central half of
    /// the shifted spectrum (`-N/4..N/4` around the tuned frequency).
    pub fn estimate(&mut self, samples: &IfSamples, reference_level_dbm: f32) -> Result<Vec<f32>> {
        if samples.len() != self.fft_size {
            return Err(SweepError::malformed(format!(
                "estimator expects {} samples, got {}",
                self.fft_size,
                samples.len()
            )));
        }

        let w = self.window.coefficients();
        match samples {
            IfSamples::ComplexI16(s) => {
                for ((out, x), &wn) in self.buffer.iter_mut().zip(s).zip(w) {
                    *out = Complex64::new(x.re as f64, x.im as f64) * (wn / I16_FULL_SCALE);
                }
            }
            IfSamples::RealI16(s) => {
                for ((out, &x), &wn) in self.buffer.iter_mut().zip(s).zip(w) {
                    *out = Complex64::new(x as f64 * wn / I16_FULL_SCALE, 0.0);
                }
            }
            IfSamples::RealI32(s) => {
                for ((out, &x), &wn) in self.buffer.iter_mut().zip(s).zip(w) {
                    *out = Complex64::new(x as f64 * wn / I32_FULL_SCALE, 0.0);
                }
            }
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let complex = samples.is_complex();
        let scale = self.scale_factor(reference_level_dbm, !complex).db();
        let n = self.fft_size;
        let first = if complex { n / 4 + n / 2 } else { 0 };

        Ok((0..n / 2)
            .map(|j| {
                let k = (first + j) % n;
                let power = self.buffer[k].norm_sqr().max(POWER_FLOOR);
                (10.0 * power.log10() + scale) as f32
            })
            .collect())
    }
}
