use std::{f32::consts::PI, path::Path};

use hopframe_core::{HopframeError, Result};

/// Mono signal fed to the simulated audio callback.
#[derive(Debug, Clone)]
pub struct Signal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Signal {
    /// Pure sine tone at `amplitude`.
    pub fn tone(frequency: f32, amplitude: f32, seconds: f32, sample_rate: u32) -> Self {
        let len = (seconds.max(0.0) * sample_rate as f32) as usize;
        let samples = (0..len)
            .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect();
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decodes a WAV file and averages its channels down to mono.
    pub fn from_wav(path: &Path) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|err| HopframeError::msg(format!("failed to open {}: {err}", path.display())))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|err| HopframeError::msg(format!("failed to decode {}: {err}", path.display())))?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|err| {
                        HopframeError::msg(format!("failed to decode {}: {err}", path.display()))
                    })?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Splits the signal into host-sized blocks, zero-padding the last one.
    pub fn blocks(&self, block_size: usize) -> impl Iterator<Item = Vec<f32>> + '_ {
        self.samples.chunks(block_size.max(1)).map(move |chunk| {
            let mut block = chunk.to_vec();
            block.resize(block_size, 0.0);
            block
        })
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_has_expected_length_and_amplitude() {
        let signal = Signal::tone(100.0, 0.5, 0.5, 8_000);
        assert_eq!(signal.samples.len(), 4_000);
        let peak = signal.samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
        assert!((peak - 0.5).abs() < 1e-3);
        assert!((signal.duration_secs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn blocks_pad_the_tail() {
        let signal = Signal {
            samples: vec![1.0; 10],
            sample_rate: 8_000,
        };
        let blocks: Vec<_> = signal.blocks(4).collect();
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|block| block.len() == 4));
        assert_eq!(blocks[2], vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_wav_is_an_error() {
        let err = Signal::from_wav(Path::new("/nonexistent/input.wav")).unwrap_err();
        assert!(err.to_string().contains("input.wav"));
    }
}
