use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    analysis::{AnalysisDispatcher, FrameAccumulator},
    delivery::{diagnostics::DIAGNOSTIC_CAPACITY, DeliveryScheduler},
    diagnostics_channel, AnalysisConfig, AudioEvent, Diagnostic, DiagnosticReceiver, DiagnosticSender,
    EngineDescription, EngineRegistry, FeatureListener, FeatureSet, InputDomain, OutputDescriptor,
    Result,
};

/// Builds an analysis instance using the built-in engines.
pub fn configure(config: &AnalysisConfig) -> Result<(AudioProcessor, ControlSurface)> {
    configure_with_registry(config, &EngineRegistry::builtin())
}

/// Validates `config`, loads the engine from `registry` and splits the
/// instance into its audio-context and control-context halves.
///
/// Nothing is returned on failure, so no analysis can run against a
/// half-configured engine.
pub fn configure_with_registry(
    config: &AnalysisConfig,
    registry: &EngineRegistry,
) -> Result<(AudioProcessor, ControlSurface)> {
    config.validate()?;
    let engine = registry.load_engine(&config.engine, config.sample_rate)?;

    let (diagnostics, receiver) = diagnostics_channel(DIAGNOSTIC_CAPACITY);
    let receiver = receiver.with_source(config.engine.as_str());
    let (dispatcher, scheduler) = AnalysisDispatcher::new(engine, config, diagnostics.clone())?;
    let description = dispatcher.describe();

    tracing::info!(
        engine = %config.engine,
        domain = description.input_domain.label(),
        outputs = description.outputs.len(),
        hop_size = config.hop_size,
        block_size = config.block_size,
        sample_rate = config.sample_rate,
        "configured analysis instance"
    );

    let processor = AudioProcessor {
        block_size: config.block_size,
        accumulator: FrameAccumulator::new(config.hop_size),
        dispatcher,
        diagnostics: diagnostics.clone(),
        rejected_blocks: 0,
    };
    let control = ControlSurface {
        scheduler,
        receiver,
        diagnostics,
        description,
        diagnostic_listener: None,
    };
    Ok((processor, control))
}

/// Counters describing what the audio context has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStats {
    pub hops: u64,
    pub failures: u64,
    pub coalesced: u64,
    pub rejected_blocks: u64,
}

/// Audio-context half of an analysis instance.
///
/// Owns the engine, the frame and the FFT buffers. Move it into the audio
/// callback; dropping it releases the engine once the last block returned.
pub struct AudioProcessor {
    block_size: usize,
    accumulator: FrameAccumulator,
    dispatcher: AnalysisDispatcher,
    diagnostics: DiagnosticSender,
    rejected_blocks: u64,
}

impl AudioProcessor {
    /// Feeds one host block. Never blocks and never panics on engine errors.
    ///
    /// Blocks whose length differs from the configured block size are
    /// dropped; the first such block is reported as a warning.
    pub fn on_audio_block(&mut self, block: &[f32]) {
        if block.len() != self.block_size {
            self.rejected_blocks += 1;
            if self.rejected_blocks == 1 {
                self.diagnostics.report_audio(AudioEvent::BlockRejected {
                    expected: self.block_size,
                    received: block.len(),
                });
            }
            return;
        }

        if !self.accumulator.push(block) {
            return;
        }

        // Failures are reported on the diagnostics channel.
        self.dispatcher.dispatch(self.accumulator.frame());
        self.accumulator.reset();
    }

    pub fn input_domain(&self) -> InputDomain {
        self.dispatcher.input_domain()
    }

    pub fn frame(&self) -> &[f32] {
        self.accumulator.frame()
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            hops: self.dispatcher.hops(),
            failures: self.dispatcher.failures(),
            coalesced: self.dispatcher.coalesced(),
            rejected_blocks: self.rejected_blocks,
        }
    }
}

impl fmt::Debug for AudioProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioProcessor")
            .field("block_size", &self.block_size)
            .field("dispatcher", &self.dispatcher)
            .field("rejected_blocks", &self.rejected_blocks)
            .finish()
    }
}

type DiagnosticHook = Box<dyn FnMut(&Diagnostic) + Send>;

/// Control-context half of an analysis instance.
pub struct ControlSurface {
    scheduler: DeliveryScheduler,
    receiver: DiagnosticReceiver,
    diagnostics: DiagnosticSender,
    description: EngineDescription,
    diagnostic_listener: Option<DiagnosticHook>,
}

impl ControlSurface {
    /// Handles a delivery tick: forwards pending diagnostics, then emits the
    /// latest feature set if a hop completed since the previous tick.
    pub fn on_delivery_tick(&mut self) -> bool {
        for diagnostic in self.receiver.drain() {
            diagnostic.log();
            if let Some(listener) = self.diagnostic_listener.as_mut() {
                listener(&diagnostic);
            }
        }
        self.scheduler.on_fire()
    }

    pub fn connect<L>(&mut self, index: usize, listener: L) -> bool
    where
        L: FeatureListener + Send + 'static,
    {
        self.scheduler.connect(index, listener)
    }

    pub fn connect_by_identifier<L>(&mut self, identifier: &str, listener: L) -> bool
    where
        L: FeatureListener + Send + 'static,
    {
        self.scheduler.connect_by_identifier(identifier, listener)
    }

    /// Receives every diagnostic drained on a tick, after it was logged.
    pub fn on_diagnostic<F>(&mut self, listener: F)
    where
        F: FnMut(&Diagnostic) + Send + 'static,
    {
        self.diagnostic_listener = Some(Box::new(listener));
    }

    /// Sender for posting informational output, e.g. registry listings.
    pub fn diagnostics(&self) -> DiagnosticSender {
        self.diagnostics.clone()
    }

    pub fn dropped_diagnostics(&self) -> u64 {
        self.receiver.dropped()
    }

    pub fn description(&self) -> &EngineDescription {
        &self.description
    }

    pub fn outputs(&self) -> &[OutputDescriptor] {
        self.scheduler.outputs()
    }

    /// Feature set emitted by the last successful tick.
    pub fn latest(&self) -> &FeatureSet {
        self.scheduler.latest()
    }

    pub fn is_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Posts the engine parameters as informational diagnostics.
    pub fn list_parameters(&self) {
        let parameters = &self.description.parameters;
        if parameters.is_empty() {
            self.diagnostics.info("no parameters available");
            return;
        }
        for (index, p) in parameters.iter().enumerate() {
            self.diagnostics.info(format!(
                "parameter {index}: '{}' {} ({}) unit: {} default: {} range: [{}, {}]",
                p.identifier,
                p.name,
                p.description,
                p.unit.as_deref().unwrap_or("N/A"),
                p.default_value,
                p.min_value,
                p.max_value
            ));
        }
    }

    /// Posts the engine programs and the current one.
    pub fn list_programs(&self) {
        let programs = &self.description.programs;
        if programs.is_empty() {
            self.diagnostics.info("no programs available");
            return;
        }
        for (index, name) in programs.iter().enumerate() {
            self.diagnostics.info(format!("program {index}: {name}"));
        }
        if let Some(current) = &self.description.current_program {
            self.diagnostics.info(format!("current program: {current}"));
        }
    }

    /// Posts one line per output channel.
    pub fn describe_outputs(&self) {
        for (index, output) in self.outputs().iter().enumerate() {
            self.diagnostics.info(format!(
                "output {index}: '{}' {} bins: {} unit: {}",
                output.identifier,
                output.name,
                output.bin_count,
                output.unit.as_deref().unwrap_or("N/A")
            ));
        }
    }
}

impl fmt::Debug for ControlSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlSurface")
            .field("engine", &self.description.identifier)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
