use std::{fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{ConfigError, ProcessError};

use super::window::Window;

/// Windowed real FFT with every buffer sized up front.
pub struct SpectralPreprocessor {
    window: Window,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    output: Vec<Complex32>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
}

impl SpectralPreprocessor {
    /// Plans a forward transform of `size` points.
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        let window = Window::hann(size)?;
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let input = plan.make_input_vec();
        let output = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();

        if input.len() != size {
            return Err(ConfigError::Fft {
                size,
                reason: format!("planner produced {} input points", input.len()),
            });
        }

        Ok(Self {
            window,
            plan,
            input,
            output,
            scratch,
            spectrum: vec![Complex32::new(0.0, 0.0); size],
        })
    }

    pub fn size(&self) -> usize {
        self.spectrum.len()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Windows a copy of `frame` and returns its full complex spectrum.
    ///
    /// Bins above Nyquist are filled with the conjugates of their mirror bins
    /// so the result has one entry per input sample. `frame` is left intact.
    pub fn transform(&mut self, frame: &[f32]) -> Result<&[Complex32], ProcessError> {
        let size = self.spectrum.len();
        if frame.len() != size {
            return Err(ProcessError::BufferShape {
                expected: size,
                actual: frame.len(),
            });
        }

        self.window.apply(frame, &mut self.input);
        self.plan
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
            .map_err(|err| ProcessError::Fft(err.to_string()))?;

        let half = self.output.len();
        self.spectrum[..half].copy_from_slice(&self.output);
        for k in half..size {
            self.spectrum[k] = self.spectrum[size - k].conj();
        }

        Ok(&self.spectrum)
    }
}

impl fmt::Debug for SpectralPreprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralPreprocessor")
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    fn sine(frequency: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate).sin())
            .collect()
    }

    fn peak_bin(spectrum: &[Complex32]) -> usize {
        let half = spectrum.len() / 2 + 1;
        spectrum[..half]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn sine_peaks_at_nearest_bin() {
        let sample_rate = 48_000.0;
        let size = 1024;
        let resolution = sample_rate / size as f32;
        let mut pre = SpectralPreprocessor::new(size).unwrap();

        for frequency in [440.0_f32, 1_000.0, 5_512.5, 12_000.0] {
            let frame = sine(frequency, sample_rate, size);
            let peak = peak_bin(pre.transform(&frame).unwrap());
            let expected = (frequency / resolution).round() as i64;
            assert!(
                (peak as i64 - expected).abs() <= 1,
                "{frequency} Hz peaked at bin {peak}, expected {expected}"
            );
        }
    }

    #[test]
    fn spectrum_has_one_bin_per_sample_and_mirrors_conjugates() {
        let size = 16;
        let mut pre = SpectralPreprocessor::new(size).unwrap();
        let frame = sine(3_000.0, 16_000.0, size);
        let spectrum = pre.transform(&frame).unwrap().to_vec();

        assert_eq!(spectrum.len(), size);
        for k in 1..size / 2 {
            let mirrored = spectrum[size - k];
            assert!((mirrored - spectrum[k].conj()).norm() < 1e-5);
        }
    }

    #[test]
    fn odd_sizes_are_supported() {
        let mut pre = SpectralPreprocessor::new(9).unwrap();
        let spectrum = pre.transform(&[1.0; 9]).unwrap();
        assert_eq!(spectrum.len(), 9);
        assert!((spectrum[8] - spectrum[1].conj()).norm() < 1e-5);
    }

    #[test]
    fn frame_is_not_modified() {
        let mut pre = SpectralPreprocessor::new(8).unwrap();
        let frame = vec![1.0_f32; 8];
        pre.transform(&frame).unwrap();
        assert_eq!(frame, vec![1.0; 8]);
    }

    #[test]
    fn wrong_frame_length_is_a_process_error() {
        let mut pre = SpectralPreprocessor::new(8).unwrap();
        assert_eq!(
            pre.transform(&[0.0; 4]).unwrap_err(),
            ProcessError::BufferShape { expected: 8, actual: 4 }
        );
    }

    #[test]
    fn degenerate_size_is_rejected() {
        assert!(matches!(
            SpectralPreprocessor::new(1),
            Err(ConfigError::WindowTooShort(1))
        ));
    }
}
