//! Window functions

/// Periodic Hann window, `w[n] = 0.5 - 0.5 cos(2 pi n / N)`.
///
/// The same window is used for every block of a sweep so bins stay comparable
/// across capture steps.
#[derive(Debug, Clone)]
pub struct Window {
    coefficients: Vec<f64>,
    coherent_gain: f64,
}

impl Window {
    pub fn hann(size: usize) -> Self {
        let coefficients: Vec<f64> = (0..size)
            .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / size as f64).cos())
            .collect();
        let coherent_gain = coefficients.iter().sum::<f64>() / size as f64;
        Self {
            coefficients,
            coherent_gain,
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Mean of the coefficients; amplitude loss of a bin-centred tone
    pub fn coherent_gain(&self) -> f64 {
        self.coherent_gain
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}
