use std::f64::consts::PI;

use crate::ConfigError;

/// Precomputed Hann taper.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    coefficients: Vec<f32>,
}

impl Window {
    /// Builds `0.5 * (1 - cos(2πi / (N - 1)))` for `i` in `0..N`.
    ///
    /// `N < 2` is rejected since the formula divides by `N - 1`.
    pub fn hann(len: usize) -> Result<Self, ConfigError> {
        if len < 2 {
            return Err(ConfigError::WindowTooShort(len));
        }
        let denominator = (len - 1) as f64;
        let coefficients = (0..len)
            .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / denominator).cos())) as f32)
            .collect();
        Ok(Self { coefficients })
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Writes `input * window` into `output` element-wise.
    pub fn apply(&self, input: &[f32], output: &mut [f32]) {
        for ((out, sample), coefficient) in output.iter_mut().zip(input).zip(&self.coefficients) {
            *out = sample * coefficient;
        }
    }
}
