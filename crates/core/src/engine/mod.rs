//! Feature-extraction engine contract.
//!
//! The pipeline treats engines as black boxes: it loads one through the
//! [`EngineRegistry`], asks it once for its input domain and output layout,
//! and afterwards only calls [`FeatureEngine::process`] from the audio
//! context. Engines are never shared; the dispatcher owns the only handle.

pub mod builtin;
pub mod registry;

use serde::{Deserialize, Serialize};

pub use realfft::num_complex::Complex32;
pub use registry::{EngineInfo, EngineRegistry};

use crate::ProcessError;

/// Representation an engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputDomain {
    Time,
    Frequency,
}

impl InputDomain {
    pub fn label(&self) -> &'static str {
        match self {
            InputDomain::Time => "time-domain",
            InputDomain::Frequency => "frequency-domain",
        }
    }
}

/// Metadata for one output channel, queried once at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: Option<String>,
    /// Number of values the engine emits for this output on every hop.
    pub bin_count: usize,
}

impl OutputDescriptor {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, bin_count: usize) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            description: String::new(),
            unit: None,
            bin_count,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Metadata for one tunable engine parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: Option<String>,
    pub default_value: f32,
    pub min_value: f32,
    pub max_value: f32,
}

/// Timestamp handed to the engine with every frame.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct RealTime(f64);

impl RealTime {
    pub const ZERO: RealTime = RealTime(0.0);

    /// Position of sample `frame` in a stream running at `sample_rate`.
    pub fn from_frame(frame: u64, sample_rate: u32) -> Self {
        if sample_rate == 0 {
            return Self::ZERO;
        }
        Self(frame as f64 / sample_rate as f64)
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }
}

/// Borrowed frame passed to [`FeatureEngine::process`].
#[derive(Debug, Clone, Copy)]
pub enum EngineInput<'a> {
    /// Raw samples, one analysis frame long.
    Time(&'a [f32]),
    /// Full complex spectrum of the windowed frame.
    Frequency(&'a [Complex32]),
}

impl<'a> EngineInput<'a> {
    pub fn domain(&self) -> InputDomain {
        match self {
            EngineInput::Time(_) => InputDomain::Time,
            EngineInput::Frequency(_) => InputDomain::Frequency,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EngineInput::Time(samples) => samples.len(),
            EngineInput::Frequency(bins) => bins.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn time(&self) -> Result<&'a [f32], ProcessError> {
        match *self {
            EngineInput::Time(samples) => Ok(samples),
            EngineInput::Frequency(_) => Err(ProcessError::UnsupportedInput {
                expected: InputDomain::Time.label(),
                received: InputDomain::Frequency.label(),
            }),
        }
    }

    pub fn frequency(&self) -> Result<&'a [Complex32], ProcessError> {
        match *self {
            EngineInput::Frequency(bins) => Ok(bins),
            EngineInput::Time(_) => Err(ProcessError::UnsupportedInput {
                expected: InputDomain::Frequency.label(),
                received: InputDomain::Time.label(),
            }),
        }
    }
}

/// Feature values produced by one analysis call, one sequence per output.
///
/// Buffers keep their capacity across [`clear`](Self::clear) so a set sized
/// with [`with_layout`](Self::with_layout) can be refilled without
/// allocating as long as engines respect their declared bin counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    outputs: Vec<Vec<f32>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(descriptors: &[OutputDescriptor]) -> Self {
        Self {
            outputs: descriptors
                .iter()
                .map(|descriptor| Vec::with_capacity(descriptor.bin_count))
                .collect(),
        }
    }

    pub fn from_outputs(outputs: Vec<Vec<f32>>) -> Self {
        Self { outputs }
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Values of output `index`; empty when the output produced nothing.
    pub fn output(&self, index: usize) -> &[f32] {
        self.outputs.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Appends a value to output `index`, growing the set if needed.
    pub fn push(&mut self, index: usize, value: f32) {
        self.slot(index).push(value);
    }

    /// Replaces the values of output `index`.
    pub fn set(&mut self, index: usize, values: &[f32]) {
        let slot = self.slot(index);
        slot.clear();
        slot.extend_from_slice(values);
    }

    /// Empties every output while keeping the allocated capacity.
    pub fn clear(&mut self) {
        for output in &mut self.outputs {
            output.clear();
        }
    }

    /// `true` when no output holds a value.
    pub fn is_empty(&self) -> bool {
        self.outputs.iter().all(Vec::is_empty)
    }

    fn slot(&mut self, index: usize) -> &mut Vec<f32> {
        if index >= self.outputs.len() {
            self.outputs.resize_with(index + 1, Vec::new);
        }
        &mut self.outputs[index]
    }
}

/// A block-oriented feature extractor.
///
/// Implementations are driven from a single thread at a time: the pipeline
/// moves the boxed engine into the audio context and never calls it
/// concurrently, so `Sync` is not required.
pub trait FeatureEngine: Send {
    fn identifier(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn input_domain(&self) -> InputDomain;

    /// Prepares the engine for frames of `block_size` samples arriving every
    /// `step_size` samples. Returns `false` when the framing is unsupported.
    fn initialise(&mut self, step_size: usize, block_size: usize) -> bool;

    /// Output layout. Only meaningful after a successful
    /// [`initialise`](Self::initialise).
    fn output_descriptors(&self) -> Vec<OutputDescriptor>;

    fn parameter_descriptors(&self) -> Vec<ParameterDescriptor> {
        Vec::new()
    }

    fn programs(&self) -> Vec<String> {
        Vec::new()
    }

    fn current_program(&self) -> Option<String> {
        None
    }

    /// Analyses one frame, writing results into `features`.
    ///
    /// `features` arrives cleared and laid out after the declared outputs.
    /// Its content is discarded when an error is returned.
    fn process(
        &mut self,
        input: EngineInput<'_>,
        timestamp: RealTime,
        features: &mut FeatureSet,
    ) -> Result<(), ProcessError>;
}

// Compile-time assertion: Box<dyn FeatureEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn FeatureEngine>) {}
};

/// Everything a host may want to show about a loaded engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineDescription {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub input_domain: InputDomain,
    pub outputs: Vec<OutputDescriptor>,
    pub parameters: Vec<ParameterDescriptor>,
    pub programs: Vec<String>,
    pub current_program: Option<String>,
}

impl EngineDescription {
    /// Snapshot of an initialised engine.
    pub fn of(engine: &dyn FeatureEngine) -> Self {
        Self {
            identifier: engine.identifier().to_string(),
            name: engine.name().to_string(),
            description: engine.description().to_string(),
            input_domain: engine.input_domain(),
            outputs: engine.output_descriptors(),
            parameters: engine.parameter_descriptors(),
            programs: engine.programs(),
            current_program: engine.current_program(),
        }
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
