//! Feature engines shipped with the crate.
//!
//! They cover both input domains so the pipeline can be exercised without an
//! external plugin host.

use crate::ProcessError;

use super::{
    Complex32, EngineInput, FeatureEngine, FeatureSet, InputDomain, OutputDescriptor,
    ParameterDescriptor, RealTime,
};

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Framing state shared by every built-in engine.
#[derive(Debug, Default, Clone, Copy)]
struct Framing {
    sample_rate: u32,
    block_size: usize,
}

impl Framing {
    fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            block_size: 0,
        }
    }

    fn initialise(&mut self, step_size: usize, block_size: usize) -> bool {
        if step_size == 0 || block_size < 2 {
            return false;
        }
        self.block_size = block_size;
        true
    }

    fn check(&self, actual: usize) -> Result<(), ProcessError> {
        if actual != self.block_size {
            return Err(ProcessError::BufferShape {
                expected: self.block_size,
                actual,
            });
        }
        Ok(())
    }

    fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.block_size.max(1) as f32
    }

    /// Number of non-redundant bins of a real frame.
    fn half_bins(&self) -> usize {
        self.block_size / 2 + 1
    }
}

/// Root-mean-square level of each frame.
#[derive(Debug)]
pub struct RmsEngine {
    framing: Framing,
}

impl RmsEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            framing: Framing::new(sample_rate),
        }
    }
}

impl FeatureEngine for RmsEngine {
    fn identifier(&self) -> &str {
        "rms"
    }

    fn name(&self) -> &str {
        "RMS Level"
    }

    fn description(&self) -> &str {
        "Root-mean-square amplitude of each frame"
    }

    fn input_domain(&self) -> InputDomain {
        InputDomain::Time
    }

    fn initialise(&mut self, step_size: usize, block_size: usize) -> bool {
        self.framing.initialise(step_size, block_size)
    }

    fn output_descriptors(&self) -> Vec<OutputDescriptor> {
        vec![OutputDescriptor::new("rms", "RMS", 1)]
    }

    fn process(
        &mut self,
        input: EngineInput<'_>,
        _timestamp: RealTime,
        features: &mut FeatureSet,
    ) -> Result<(), ProcessError> {
        let samples = input.time()?;
        self.framing.check(samples.len())?;
        features.push(0, compute_rms(samples));
        Ok(())
    }
}

/// Sign changes per frame.
#[derive(Debug)]
pub struct ZeroCrossingEngine {
    framing: Framing,
}

impl ZeroCrossingEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            framing: Framing::new(sample_rate),
        }
    }
}

impl FeatureEngine for ZeroCrossingEngine {
    fn identifier(&self) -> &str {
        "zero-crossings"
    }

    fn name(&self) -> &str {
        "Zero Crossings"
    }

    fn description(&self) -> &str {
        "Number of sign changes within each frame"
    }

    fn input_domain(&self) -> InputDomain {
        InputDomain::Time
    }

    fn initialise(&mut self, step_size: usize, block_size: usize) -> bool {
        self.framing.initialise(step_size, block_size)
    }

    fn output_descriptors(&self) -> Vec<OutputDescriptor> {
        vec![OutputDescriptor::new("counts", "Zero Crossing Count", 1).with_unit("crossings")]
    }

    fn process(
        &mut self,
        input: EngineInput<'_>,
        _timestamp: RealTime,
        features: &mut FeatureSet,
    ) -> Result<(), ProcessError> {
        let samples = input.time()?;
        self.framing.check(samples.len())?;
        let crossings = samples
            .windows(2)
            .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
            .count();
        features.push(0, crossings as f32);
        Ok(())
    }
}

/// Magnitude-weighted mean frequency of each frame.
#[derive(Debug)]
pub struct SpectralCentroidEngine {
    framing: Framing,
}

impl SpectralCentroidEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            framing: Framing::new(sample_rate),
        }
    }
}

impl FeatureEngine for SpectralCentroidEngine {
    fn identifier(&self) -> &str {
        "spectral-centroid"
    }

    fn name(&self) -> &str {
        "Spectral Centroid"
    }

    fn description(&self) -> &str {
        "Centre of mass of the magnitude spectrum"
    }

    fn input_domain(&self) -> InputDomain {
        InputDomain::Frequency
    }

    fn initialise(&mut self, step_size: usize, block_size: usize) -> bool {
        self.framing.initialise(step_size, block_size)
    }

    fn output_descriptors(&self) -> Vec<OutputDescriptor> {
        vec![OutputDescriptor::new("centroid", "Spectral Centroid", 1).with_unit("Hz")]
    }

    fn process(
        &mut self,
        input: EngineInput<'_>,
        _timestamp: RealTime,
        features: &mut FeatureSet,
    ) -> Result<(), ProcessError> {
        let spectrum = input.frequency()?;
        self.framing.check(spectrum.len())?;
        let bins = &spectrum[..self.framing.half_bins()];
        features.push(0, spectral_centroid(bins, self.framing.bin_hz()));
        Ok(())
    }
}

const LOW_CUTOFF_HZ: f32 = 250.0;
const HIGH_CUTOFF_HZ: f32 = 4_000.0;

/// Energy split into low, mid and high bands.
#[derive(Debug)]
pub struct BandEnergyEngine {
    framing: Framing,
    low_cutoff: f32,
    high_cutoff: f32,
}

impl BandEnergyEngine {
    /// Program names exposed to hosts. Only the factory cutoffs exist.
    const PROGRAMS: [&'static str; 1] = ["default"];

    pub fn new(sample_rate: u32) -> Self {
        Self {
            framing: Framing::new(sample_rate),
            low_cutoff: LOW_CUTOFF_HZ,
            high_cutoff: HIGH_CUTOFF_HZ,
        }
    }
}

impl FeatureEngine for BandEnergyEngine {
    fn identifier(&self) -> &str {
        "band-energy"
    }

    fn name(&self) -> &str {
        "Band Energy"
    }

    fn description(&self) -> &str {
        "Spectral energy below, between and above two cutoff frequencies"
    }

    fn input_domain(&self) -> InputDomain {
        InputDomain::Frequency
    }

    fn initialise(&mut self, step_size: usize, block_size: usize) -> bool {
        // Fewer bins than bands leaves the split meaningless.
        block_size >= 8 && self.framing.initialise(step_size, block_size)
    }

    fn output_descriptors(&self) -> Vec<OutputDescriptor> {
        vec![OutputDescriptor::new("bands", "Band Energy", 3)
            .with_description("Energy of the low, mid and high bands")]
    }

    fn parameter_descriptors(&self) -> Vec<ParameterDescriptor> {
        let nyquist = self.framing.sample_rate as f32 / 2.0;
        vec![
            ParameterDescriptor {
                identifier: "low-cutoff".to_string(),
                name: "Low Cutoff".to_string(),
                description: "Upper edge of the low band".to_string(),
                unit: Some("Hz".to_string()),
                default_value: LOW_CUTOFF_HZ,
                min_value: 20.0,
                max_value: nyquist,
            },
            ParameterDescriptor {
                identifier: "high-cutoff".to_string(),
                name: "High Cutoff".to_string(),
                description: "Lower edge of the high band".to_string(),
                unit: Some("Hz".to_string()),
                default_value: HIGH_CUTOFF_HZ,
                min_value: 20.0,
                max_value: nyquist,
            },
        ]
    }

    fn programs(&self) -> Vec<String> {
        Self::PROGRAMS.iter().map(|name| name.to_string()).collect()
    }

    fn current_program(&self) -> Option<String> {
        Some(Self::PROGRAMS[0].to_string())
    }

    fn process(
        &mut self,
        input: EngineInput<'_>,
        _timestamp: RealTime,
        features: &mut FeatureSet,
    ) -> Result<(), ProcessError> {
        let spectrum = input.frequency()?;
        self.framing.check(spectrum.len())?;
        let bin_hz = self.framing.bin_hz();

        let mut bands = [0.0_f32; 3];
        for (index, bin) in spectrum[..self.framing.half_bins()].iter().enumerate() {
            let frequency = index as f32 * bin_hz;
            let band = if frequency < self.low_cutoff {
                0
            } else if frequency < self.high_cutoff {
                1
            } else {
                2
            };
            bands[band] += bin.norm_sqr();
        }

        features.set(0, &bands);
        Ok(())
    }
}

/// Magnitude of every non-redundant spectral bin.
#[derive(Debug)]
pub struct MagnitudesEngine {
    framing: Framing,
}

impl MagnitudesEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            framing: Framing::new(sample_rate),
        }
    }
}

impl FeatureEngine for MagnitudesEngine {
    fn identifier(&self) -> &str {
        "magnitudes"
    }

    fn name(&self) -> &str {
        "Magnitude Spectrum"
    }

    fn description(&self) -> &str {
        "Magnitudes of the bins from DC to Nyquist"
    }

    fn input_domain(&self) -> InputDomain {
        InputDomain::Frequency
    }

    fn initialise(&mut self, step_size: usize, block_size: usize) -> bool {
        self.framing.initialise(step_size, block_size)
    }

    fn output_descriptors(&self) -> Vec<OutputDescriptor> {
        vec![OutputDescriptor::new("magnitudes", "Magnitudes", self.framing.half_bins())]
    }

    fn process(
        &mut self,
        input: EngineInput<'_>,
        _timestamp: RealTime,
        features: &mut FeatureSet,
    ) -> Result<(), ProcessError> {
        let spectrum = input.frequency()?;
        self.framing.check(spectrum.len())?;
        for bin in &spectrum[..self.framing.half_bins()] {
            features.push(0, bin.norm());
        }
        Ok(())
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn spectral_centroid(bins: &[Complex32], bin_hz: f32) -> f32 {
    let mut magnitude_sum = 0.0;
    let mut weighted_sum = 0.0;

    for (i, bin) in bins.iter().enumerate() {
        let magnitude = bin.norm();
        magnitude_sum += magnitude;
        weighted_sum += magnitude * (i as f32 * bin_hz);
    }

    if magnitude_sum <= f32::EPSILON {
        0.0
    } else {
        weighted_sum / magnitude_sum
    }
}
