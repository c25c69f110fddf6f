use std::{fmt, ops::RangeInclusive};

use serde::{Deserialize, Serialize};

use crate::{DiagnosticSender, LoadError};

use super::{
    builtin::{
        BandEnergyEngine, MagnitudesEngine, RmsEngine, SpectralCentroidEngine, ZeroCrossingEngine,
        MAX_SAMPLE_RATE, MIN_SAMPLE_RATE,
    },
    FeatureEngine,
};

type EngineFactory = Box<dyn Fn(u32) -> Box<dyn FeatureEngine> + Send + Sync>;

/// Identifier and human-readable labels of a registered engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub identifier: String,
    pub name: String,
    pub description: String,
}

struct Entry {
    info: EngineInfo,
    sample_rates: RangeInclusive<u32>,
    factory: EngineFactory,
}

/// Maps engine identifiers to constructors.
pub struct EngineRegistry {
    entries: Vec<Entry>,
}

impl EngineRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry holding every engine from [`builtin`](super::builtin).
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let rates = MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE;
        registry.register_with(rates.clone(), |sr| Box::new(RmsEngine::new(sr)));
        registry.register_with(rates.clone(), |sr| Box::new(ZeroCrossingEngine::new(sr)));
        registry.register_with(rates.clone(), |sr| Box::new(SpectralCentroidEngine::new(sr)));
        registry.register_with(rates.clone(), |sr| Box::new(BandEnergyEngine::new(sr)));
        registry.register_with(rates, |sr| Box::new(MagnitudesEngine::new(sr)));
        registry
    }

    /// Registers an engine constructor accepting every sample rate.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn(u32) -> Box<dyn FeatureEngine> + Send + Sync + 'static,
    {
        self.register_with(1..=u32::MAX, factory);
    }

    /// Registers an engine constructor restricted to `sample_rates`.
    ///
    /// The identifier and labels are read from an instance built at the
    /// lowest supported rate. A later registration with the same identifier
    /// replaces the earlier one.
    pub fn register_with<F>(&mut self, sample_rates: RangeInclusive<u32>, factory: F)
    where
        F: Fn(u32) -> Box<dyn FeatureEngine> + Send + Sync + 'static,
    {
        let probe = factory(*sample_rates.start());
        let info = EngineInfo {
            identifier: probe.identifier().to_string(),
            name: probe.name().to_string(),
            description: probe.description().to_string(),
        };
        self.entries
            .retain(|entry| entry.info.identifier != info.identifier);
        self.entries.push(Entry {
            info,
            sample_rates,
            factory: Box::new(factory),
        });
    }

    /// Instantiates the engine registered under `identifier`.
    pub fn load_engine(
        &self,
        identifier: &str,
        sample_rate: u32,
    ) -> Result<Box<dyn FeatureEngine>, LoadError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.info.identifier == identifier)
            .ok_or_else(|| LoadError::UnknownEngine(identifier.to_string()))?;

        if !entry.sample_rates.contains(&sample_rate) {
            return Err(LoadError::IncompatibleSampleRate {
                engine: identifier.to_string(),
                sample_rate,
            });
        }

        Ok((entry.factory)(sample_rate))
    }

    pub fn list(&self) -> Vec<EngineInfo> {
        self.entries.iter().map(|entry| entry.info.clone()).collect()
    }

    /// Posts one informational line per engine on the diagnostics channel.
    pub fn report_listing(&self, diagnostics: &DiagnosticSender) {
        if self.entries.is_empty() {
            diagnostics.info("no engines available");
            return;
        }
        for entry in &self.entries {
            let info = &entry.info;
            diagnostics.info(format!(
                "'{}': {} | {}",
                info.identifier, info.name, info.description
            ));
        }
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field(
                "engines",
                &self
                    .entries
                    .iter()
                    .map(|entry| entry.info.identifier.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
