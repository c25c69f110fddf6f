use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How the timestamp handed to [`FeatureEngine::process`] evolves between
/// hops.
///
/// [`FeatureEngine::process`]: crate::FeatureEngine::process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampPolicy {
    /// Hop `n` is stamped `n * hop_size / sample_rate` seconds.
    #[default]
    Advancing,
    /// Every hop is stamped zero.
    Constant,
}

/// Everything `configure` needs to build an analysis instance.
///
/// Missing fields fall back to [`AnalysisConfig::default`] when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Registry identifier of the feature engine, e.g. `"spectral-centroid"`.
    pub engine: String,
    pub sample_rate: u32,
    /// Samples accumulated between two analysis calls. Also the analysis
    /// frame length, the window length and the FFT size.
    pub hop_size: usize,
    /// Fixed size of every block delivered by the host audio callback.
    pub block_size: usize,
    pub timestamps: TimestampPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            engine: "spectral-centroid".to_string(),
            sample_rate: 48_000,
            hop_size: 1024,
            block_size: 64,
            timestamps: TimestampPolicy::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn new(engine: impl Into<String>, sample_rate: u32, hop_size: usize, block_size: usize) -> Self {
        Self {
            engine: engine.into(),
            sample_rate,
            hop_size,
            block_size,
            timestamps: TimestampPolicy::default(),
        }
    }

    pub fn with_timestamps(mut self, timestamps: TimestampPolicy) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Checks the framing rules that must hold before an engine is loaded.
    ///
    /// The hop must be an exact multiple of the block size, otherwise the
    /// accumulated count would step over the hop boundary and analysis would
    /// never fire. Sizes of one are rejected because the Hann window divides
    /// by `N - 1`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.hop_size < 2 {
            return Err(ConfigError::HopTooSmall(self.hop_size));
        }
        if self.block_size < 2 {
            return Err(ConfigError::BlockTooSmall(self.block_size));
        }
        if self.block_size > self.hop_size {
            return Err(ConfigError::BlockExceedsHop {
                hop_size: self.hop_size,
                block_size: self.block_size,
            });
        }
        if self.hop_size % self.block_size != 0 {
            return Err(ConfigError::HopNotMultipleOfBlock {
                hop_size: self.hop_size,
                block_size: self.block_size,
            });
        }
        Ok(())
    }

    /// Duration of one hop in seconds.
    pub fn hop_seconds(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate.max(1) as f64
    }
}
