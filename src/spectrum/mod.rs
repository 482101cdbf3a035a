//! Spectral estimation
//!
//! Each capture block goes through:
//! 1. Normalize integer samples to full scale
//! 2. Apply a Hann window
//! 3. Forward FFT (rustfft)
//! 4. |X_k|^2 of the non-redundant half
//! 5. Convert to dBm with the reference level correction

mod estimator;
mod window;

pub use estimator::{ScaleFactor, SpectralEstimator};
pub use window::Window;
