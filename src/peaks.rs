//! Local maximum detection over a stitched spectrum

use std::cmp::Ordering;
use std::fmt;

use crate::sweep::SweepBuffer;

/// Upper bound on the number of peaks a caller may request
pub const MAX_PEAKS: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub frequency: u64,
    pub amplitude: f32,
}

impl fmt::Display for Peak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} dBm @ {}", self.amplitude, self.frequency)
    }
}

/// Strongest bins that rise strictly above every neighbour they have.
///
/// Edge bins are compared with their single neighbour. A one-bin spectrum has
/// no peaks. Results are ordered by descending amplitude, then ascending
/// frequency, and hold at most `max_peaks` entries.
pub fn find_peaks(buf: &SweepBuffer, max_peaks: u32) -> Vec<Peak> {
    let mut peaks = candidates(buf);
    peaks.sort_by(strongest_first);
    peaks.truncate(max_peaks as usize);
    peaks
}

/// Like [`find_peaks`], but a peak within `min_separation_hz` of a stronger
/// one is dropped before the count limit is applied. 0 disables the filter.
pub fn find_peaks_separated(buf: &SweepBuffer, max_peaks: u32, min_separation_hz: u64) -> Vec<Peak> {
    if min_separation_hz == 0 {
        return find_peaks(buf, max_peaks);
    }

    let mut sorted = candidates(buf);
    sorted.sort_by(strongest_first);

    let mut kept: Vec<Peak> = Vec::new();
    for peak in sorted {
        if kept.len() == max_peaks as usize {
            break;
        }
        let crowded = kept
            .iter()
            .any(|k| k.frequency.abs_diff(peak.frequency) < min_separation_hz);
        if !crowded {
            kept.push(peak);
        }
    }
    kept
}

fn candidates(buf: &SweepBuffer) -> Vec<Peak> {
    let bins = buf.bins();
    if bins.len() < 2 {
        return Vec::new();
    }

    let last = bins.len() - 1;
    (0..bins.len())
        .filter(|&i| {
            let v = bins[i];
            let above_left = i == 0 || v > bins[i - 1];
            let above_right = i == last || v > bins[i + 1];
            above_left && above_right
        })
        .map(|i| Peak {
            frequency: buf.frequency_of(i),
            amplitude: bins[i],
        })
        .collect()
}

fn strongest_first(a: &Peak, b: &Peak) -> Ordering {
    b.amplitude
        .total_cmp(&a.amplitude)
        .then(a.frequency.cmp(&b.frequency))
}
