//! Core library for the hopframe analysis pipeline.
//!
//! The crate bridges a stream of fixed-size audio blocks to block-oriented
//! feature-extraction engines. [`configure`] splits an instance into an
//! [`AudioProcessor`], driven from the real-time audio callback, and a
//! [`ControlSurface`], driven from a control loop that delivers each hop's
//! features to listeners. The two halves share nothing but a lock-free
//! single-slot handoff and a bounded diagnostics channel.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;

pub use analysis::{AnalysisDispatcher, FrameAccumulator, SpectralPreprocessor, Window};
pub use audio::{configure, configure_with_registry, AudioProcessor, ControlSurface, ProcessorStats};
pub use config::{AnalysisConfig, TimestampPolicy};
pub use delivery::diagnostics::{
    diagnostics_channel, AudioEvent, Diagnostic, DiagnosticReceiver, DiagnosticSender, Severity,
};
pub use delivery::{
    delivery_channel, ChannelListener, DeliveryScheduler, DeliverySignal, FeatureListener,
    FeatureMessage,
};
pub use engine::{
    Complex32, EngineDescription, EngineInfo, EngineInput, EngineRegistry, FeatureEngine,
    FeatureSet, InputDomain, OutputDescriptor, ParameterDescriptor, RealTime,
};
pub use error::{ConfigError, HopframeError, LoadError, ProcessError, Result};
