//! Wideband sweeps
//!
//! A span wider than one capture is covered by retuning in ascending steps and
//! writing each step's bins into a single composite spectrum.

mod plan;
mod planner;

pub use plan::{FrequencyPlan, SweepBuffer};
pub use planner::{sweep, StepLayout, SweepOptions};
