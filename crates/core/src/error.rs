/// Result alias that carries the custom [`HopframeError`] type.
pub type Result<T> = std::result::Result<T, HopframeError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum HopframeError {
    /// The analysis configuration was rejected before any engine call.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The requested engine could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Free-form message, mostly used by the command line host.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Failure while rendering descriptors as JSON.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl HopframeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for HopframeError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for HopframeError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Invalid framing or an engine that cannot be driven with it. Fatal to the
/// instance being configured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,
    #[error("hop size must be at least 2 samples, got {0}")]
    HopTooSmall(usize),
    #[error("window length must be at least 2 samples, got {0}")]
    WindowTooShort(usize),
    #[error("block size must be at least 2 samples, got {0}")]
    BlockTooSmall(usize),
    #[error("block size {block_size} exceeds hop size {hop_size}")]
    BlockExceedsHop { hop_size: usize, block_size: usize },
    #[error("hop size {hop_size} is not a multiple of block size {block_size}")]
    HopNotMultipleOfBlock { hop_size: usize, block_size: usize },
    #[error("engine `{engine}` rejected step size {step_size} and block size {block_size}")]
    FramingRejected {
        engine: String,
        step_size: usize,
        block_size: usize,
    },
    #[error("engine `{0}` does not declare any output")]
    NoOutputs(String),
    #[error("failed to plan FFT of size {size}: {reason}")]
    Fft { size: usize, reason: String },
}

/// The engine could not be instantiated. The caller is left without an
/// analysis instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("unknown engine `{0}`")]
    UnknownEngine(String),
    #[error("engine `{engine}` does not support a sample rate of {sample_rate} Hz")]
    IncompatibleSampleRate { engine: String, sample_rate: u32 },
}

/// A single `process` call failed. Recovered locally by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    #[error("engine expected {expected} input but received {received}")]
    UnsupportedInput {
        expected: &'static str,
        received: &'static str,
    },
    #[error("engine expected a buffer of {expected} values, got {actual}")]
    BufferShape { expected: usize, actual: usize },
    #[error("FFT failed: {0}")]
    Fft(String),
    #[error("engine panicked")]
    Panicked,
    #[error("{0}")]
    Engine(String),
}

impl ProcessError {
    pub fn engine<T: Into<String>>(msg: T) -> Self {
        Self::Engine(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_convert_into_crate_error() {
        let err: HopframeError = ConfigError::HopNotMultipleOfBlock {
            hop_size: 6,
            block_size: 4,
        }
        .into();
        assert!(matches!(err, HopframeError::Config(_)));
        assert_eq!(err.to_string(), "hop size 6 is not a multiple of block size 4");
    }

    #[test]
    fn load_error_names_the_engine() {
        let err = LoadError::UnknownEngine("vamp:missing".into());
        assert!(err.to_string().contains("vamp:missing"));
    }

    #[test]
    fn message_helpers_wrap_strings() {
        let err: HopframeError = "boom".into();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(ProcessError::engine("bad frame").to_string(), "bad frame");
    }
}
