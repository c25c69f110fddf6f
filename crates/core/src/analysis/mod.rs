//! Audio-context analysis path.
//!
//! ```text
//! SampleBlock → FrameAccumulator ──hop ready──▶ AnalysisDispatcher
//!                                                 │ time domain: frame as is
//!                                                 │ frequency domain:
//!                                                 ▼   SpectralPreprocessor (Hann + real FFT)
//!                                               FeatureEngine::process
//! ```
//!
//! Every buffer on this path is sized when the instance is configured, so a
//! hop costs a fixed amount of work apart from the engine call itself.

pub mod accumulator;
pub mod dispatch;
pub mod spectral;
pub mod window;

pub use accumulator::FrameAccumulator;
pub use dispatch::AnalysisDispatcher;
pub use spectral::SpectralPreprocessor;
pub use window::Window;
