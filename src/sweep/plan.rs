//! Sweep plan and composite spectrum buffer

use crate::error::{Result, SweepError};

/// Requested span and resolution. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyPlan {
    fstart: u64,
    fstop: u64,
    rbw: u32,
}

impl FrequencyPlan {
    /// Validate and build a plan. Nothing touches the device before this succeeds.
    pub fn new(fstart: u64, fstop: u64, rbw: u32) -> Result<Self> {
        if fstop <= fstart {
            return Err(SweepError::invalid("fstop", fstop, "must be above fstart"));
        }
        if rbw == 0 {
            return Err(SweepError::invalid("rbw", rbw, "must be greater than zero"));
        }
        if fstop - fstart < rbw as u64 {
            return Err(SweepError::invalid("rbw", rbw, "is wider than the requested span"));
        }
        Ok(Self { fstart, fstop, rbw })
    }

    pub fn fstart(&self) -> u64 {
        self.fstart
    }

    pub fn fstop(&self) -> u64 {
        self.fstop
    }

    pub fn rbw(&self) -> u32 {
        self.rbw
    }

    /// Width of one bin in Hz
    pub fn bin_hz(&self) -> u64 {
        self.rbw as u64
    }

    /// `floor((fstop - fstart) / rbw)`
    pub fn bin_count(&self) -> usize {
        ((self.fstop - self.fstart) / self.rbw as u64) as usize
    }

    /// Frequency label of bin `index`
    pub fn frequency_of(&self, index: usize) -> u64 {
        self.fstart + index as u64 * self.rbw as u64
    }
}

/// Fully populated composite spectrum; bin `i` sits at `fstart + i * rbw`
#[derive(Debug, Clone, PartialEq)]
pub struct SweepBuffer {
    plan: FrequencyPlan,
    bins: Vec<f32>,
}

impl SweepBuffer {
    /// Wrap an already computed spectrum; the length must match the plan
    pub fn from_bins(plan: FrequencyPlan, bins: Vec<f32>) -> Result<Self> {
        if bins.len() != plan.bin_count() {
            return Err(SweepError::invalid(
                "bins",
                bins.len(),
                "length differs from the plan's bin count",
            ));
        }
        Ok(Self { plan, bins })
    }

    pub fn plan(&self) -> &FrequencyPlan {
        &self.plan
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn frequency_of(&self, index: usize) -> u64 {
        self.plan.frequency_of(index)
    }

    /// `(frequency, dBm)` pairs in ascending frequency
    pub fn iter(&self) -> impl Iterator<Item = (u64, f32)> + '_ {
        self.bins
            .iter()
            .enumerate()
            .map(|(i, &db)| (self.plan.frequency_of(i), db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_count_floors() {
        let plan = FrequencyPlan::new(2_000_000_000, 3_000_000_000, 100_000).unwrap();
        assert_eq!(plan.bin_count(), 10_000);

        let plan = FrequencyPlan::new(100, 1_050, 100).unwrap();
        assert_eq!(plan.bin_count(), 9);
        assert_eq!(plan.frequency_of(0), 100);
        assert_eq!(plan.frequency_of(8), 900);
    }

    #[test]
    fn test_frequency_labels_have_no_gaps() {
        let plan = FrequencyPlan::new(1_000_000, 1_010_000, 333).unwrap();
        for i in 0..plan.bin_count() {
            assert_eq!(plan.frequency_of(i), 1_000_000 + i as u64 * 333);
        }
        assert!(plan.frequency_of(plan.bin_count() - 1) < plan.fstop());
    }

    #[test]
    fn test_invalid_plans() {
        assert!(matches!(
            FrequencyPlan::new(3_000, 2_000, 10),
            Err(SweepError::InvalidPlan { parameter: "fstop", .. })
        ));
        assert!(matches!(
            FrequencyPlan::new(2_000, 2_000, 10),
            Err(SweepError::InvalidPlan { parameter: "fstop", .. })
        ));
        assert!(matches!(
            FrequencyPlan::new(2_000, 3_000, 0),
            Err(SweepError::InvalidPlan { parameter: "rbw", .. })
        ));
        assert!(matches!(
            FrequencyPlan::new(2_000, 2_050, 100),
            Err(SweepError::InvalidPlan { parameter: "rbw", .. })
        ));
        assert!(FrequencyPlan::new(2_000, 2_100, 100).is_ok());
    }

    #[test]
    fn test_buffer_length_must_match_plan() {
        let plan = FrequencyPlan::new(0, 1_000, 100).unwrap();
        assert!(SweepBuffer::from_bins(plan, vec![0.0; 9]).is_err());
        let buf = SweepBuffer::from_bins(plan, vec![-50.0; 10]).unwrap();
        let pairs: Vec<(u64, f32)> = buf.iter().take(2).collect();
        assert_eq!(pairs, vec![(0, -50.0), (100, -50.0)]);
    }
}
