//! WSA Sweep - swept power spectrum and peak search for VRT-streaming
//! spectrum analyzers
//!
//! Plans the tuning steps needed to cover a span at a given resolution,
//! captures one IF block per step over the VRT data stream, turns each block
//! into calibrated dBm bins, stitches them into one spectrum, and reports the
//! strongest local maxima.

pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod peaks;
pub mod spectrum;
pub mod sweep;
pub mod vrt;

pub use error::{Result, SweepError};
