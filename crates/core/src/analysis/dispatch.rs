use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use crate::{
    delivery::{delivery_channel, DeliveryScheduler, DeliverySignal},
    AnalysisConfig, AudioEvent, ConfigError, DiagnosticSender, EngineDescription, EngineInput, FeatureEngine,
    FeatureSet, InputDomain, OutputDescriptor, ProcessError, RealTime, TimestampPolicy,
};

use super::spectral::SpectralPreprocessor;

/// Owns the engine and feeds it one frame per hop.
pub struct AnalysisDispatcher {
    engine: Box<dyn FeatureEngine>,
    domain: InputDomain,
    spectral: Option<SpectralPreprocessor>,
    outputs: Arc<[OutputDescriptor]>,
    delivery: DeliverySignal,
    diagnostics: DiagnosticSender,
    timestamps: TimestampPolicy,
    sample_rate: u32,
    hop_size: usize,
    hops: u64,
    failures: u64,
}

impl AnalysisDispatcher {
    /// Initialises `engine` for the configured framing and wires the delivery
    /// path. The returned scheduler is the control-context end.
    pub fn new(
        mut engine: Box<dyn FeatureEngine>,
        config: &AnalysisConfig,
        diagnostics: DiagnosticSender,
    ) -> Result<(Self, DeliveryScheduler), ConfigError> {
        let hop_size = config.hop_size;
        if !engine.initialise(hop_size, hop_size) {
            return Err(ConfigError::FramingRejected {
                engine: engine.identifier().to_string(),
                step_size: hop_size,
                block_size: hop_size,
            });
        }

        let domain = engine.input_domain();
        let spectral = match domain {
            InputDomain::Frequency => Some(SpectralPreprocessor::new(hop_size)?),
            InputDomain::Time => None,
        };

        let outputs: Arc<[OutputDescriptor]> = engine.output_descriptors().into();
        if outputs.is_empty() {
            return Err(ConfigError::NoOutputs(engine.identifier().to_string()));
        }

        let (delivery, scheduler) = delivery_channel(outputs.clone());
        let dispatcher = Self {
            engine,
            domain,
            spectral,
            outputs,
            delivery,
            diagnostics,
            timestamps: config.timestamps,
            sample_rate: config.sample_rate,
            hop_size,
            hops: 0,
            failures: 0,
        };
        Ok((dispatcher, scheduler))
    }

    pub fn input_domain(&self) -> InputDomain {
        self.domain
    }

    pub fn outputs(&self) -> &[OutputDescriptor] {
        &self.outputs
    }

    pub fn describe(&self) -> EngineDescription {
        EngineDescription::of(self.engine.as_ref())
    }

    /// Timestamp the next hop will carry.
    pub fn next_timestamp(&self) -> RealTime {
        match self.timestamps {
            TimestampPolicy::Advancing => {
                RealTime::from_frame(self.hops * self.hop_size as u64, self.sample_rate)
            }
            TimestampPolicy::Constant => RealTime::ZERO,
        }
    }

    /// Runs the engine on `frame` and signals delivery on success. Returns
    /// whether the hop was published.
    ///
    /// On failure nothing is published, so listeners keep seeing the last
    /// good feature set, and the error is posted on the diagnostics channel.
    /// A panicking engine is reported the same way.
    pub fn dispatch(&mut self, frame: &[f32]) -> bool {
        let timestamp = self.next_timestamp();
        let hop = self.hops;
        self.hops += 1;

        let features = self.delivery.features_mut();
        features.clear();

        let result = match self.spectral.as_mut() {
            Some(spectral) => match spectral.transform(frame) {
                Ok(spectrum) => run_engine(
                    self.engine.as_mut(),
                    EngineInput::Frequency(spectrum),
                    timestamp,
                    features,
                ),
                Err(err) => Err(err),
            },
            None => run_engine(
                self.engine.as_mut(),
                EngineInput::Time(frame),
                timestamp,
                features,
            ),
        };

        match result {
            Ok(()) => {
                self.delivery.signal();
                true
            }
            Err(error) => {
                self.failures += 1;
                self.diagnostics
                    .report_audio(AudioEvent::HopFailed { hop, error });
                false
            }
        }
    }

    /// Hops handed to the engine so far, failed ones included.
    pub fn hops(&self) -> u64 {
        self.hops
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn coalesced(&self) -> u64 {
        self.delivery.coalesced()
    }
}

fn run_engine(
    engine: &mut dyn FeatureEngine,
    input: EngineInput<'_>,
    timestamp: RealTime,
    features: &mut FeatureSet,
) -> Result<(), ProcessError> {
    // Unwinding out of an audio callback is undefined for most hosts.
    panic::catch_unwind(AssertUnwindSafe(|| engine.process(input, timestamp, features)))
        .unwrap_or(Err(ProcessError::Panicked))
}

impl fmt::Debug for AnalysisDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisDispatcher")
            .field("engine", &self.engine.identifier())
            .field("domain", &self.domain)
            .field("outputs", &self.outputs.len())
            .field("hops", &self.hops)
            .field("failures", &self.failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc as StdArc, Mutex};

    use super::*;
    use crate::{diagnostics_channel, FeatureMessage, Severity};

    /// Records what it was given and fails on chosen hops.
    struct ScriptedEngine {
        domain: InputDomain,
        outputs: Vec<OutputDescriptor>,
        accept_framing: bool,
        silent: bool,
        fail_on: Vec<u64>,
        panic_on: Vec<u64>,
        calls: u64,
        seen: StdArc<Mutex<Vec<(usize, f64)>>>,
    }

    impl ScriptedEngine {
        fn new(domain: InputDomain) -> Self {
            Self {
                domain,
                outputs: vec![OutputDescriptor::new("value", "Value", 1)],
                accept_framing: true,
                silent: false,
                fail_on: Vec::new(),
                panic_on: Vec::new(),
                calls: 0,
                seen: StdArc::default(),
            }
        }
    }

    impl FeatureEngine for ScriptedEngine {
        fn identifier(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "Scripted"
        }

        fn input_domain(&self) -> InputDomain {
            self.domain
        }

        fn initialise(&mut self, _step_size: usize, _block_size: usize) -> bool {
            self.accept_framing
        }

        fn output_descriptors(&self) -> Vec<OutputDescriptor> {
            self.outputs.clone()
        }

        fn process(
            &mut self,
            input: EngineInput<'_>,
            timestamp: RealTime,
            features: &mut FeatureSet,
        ) -> Result<(), ProcessError> {
            let call = self.calls;
            self.calls += 1;
            self.seen
                .lock()
                .unwrap()
                .push((input.len(), timestamp.seconds()));
            if self.silent {
                return Ok(());
            }
            // Partial write before failing must never become visible.
            features.push(0, -1.0);
            if self.panic_on.contains(&call) {
                panic!("scripted panic");
            }
            if self.fail_on.contains(&call) {
                return Err(ProcessError::engine("scripted failure"));
            }
            features.set(0, &[(call + 1) as f32]);
            Ok(())
        }
    }

    fn build(
        engine: ScriptedEngine,
        config: &AnalysisConfig,
    ) -> (AnalysisDispatcher, DeliveryScheduler, crate::DiagnosticReceiver) {
        let (tx, rx) = diagnostics_channel(8);
        let (dispatcher, scheduler) =
            AnalysisDispatcher::new(Box::new(engine), config, tx).expect("dispatcher");
        (dispatcher, scheduler, rx)
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::new("scripted", 8, 4, 2)
    }

    #[test]
    fn time_domain_engine_receives_the_frame() {
        let engine = ScriptedEngine::new(InputDomain::Time);
        let seen = engine.seen.clone();
        let (mut dispatcher, mut scheduler, _rx) = build(engine, &config());

        assert!(dispatcher.dispatch(&[1.0, 2.0, 3.0, 4.0]));
        assert!(dispatcher.spectral.is_none());
        assert!(scheduler.on_fire());
        assert_eq!(scheduler.latest().output(0), &[1.0]);
        assert_eq!(seen.lock().unwrap()[0].0, 4);
    }

    #[test]
    fn frequency_domain_engine_receives_full_spectrum() {
        let engine = ScriptedEngine::new(InputDomain::Frequency);
        let seen = engine.seen.clone();
        let (mut dispatcher, _scheduler, _rx) = build(engine, &config());

        assert_eq!(dispatcher.input_domain(), InputDomain::Frequency);
        assert!(dispatcher.dispatch(&[0.0, 1.0, 0.0, -1.0]));
        assert_eq!(seen.lock().unwrap()[0].0, 4);
    }

    #[test]
    fn advancing_timestamps_step_by_one_hop() {
        let engine = ScriptedEngine::new(InputDomain::Time);
        let seen = engine.seen.clone();
        let (mut dispatcher, _scheduler, _rx) = build(engine, &config());

        for _ in 0..3 {
            assert!(dispatcher.dispatch(&[0.0; 4]));
        }
        let stamps: Vec<f64> = seen.lock().unwrap().iter().map(|(_, t)| *t).collect();
        // 4 samples at 8 Hz = 0.5 s per hop.
        assert_eq!(stamps, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn constant_timestamps_stay_at_zero() {
        let engine = ScriptedEngine::new(InputDomain::Time);
        let seen = engine.seen.clone();
        let cfg = config().with_timestamps(TimestampPolicy::Constant);
        let (mut dispatcher, _scheduler, _rx) = build(engine, &cfg);

        assert!(dispatcher.dispatch(&[0.0; 4]));
        assert!(dispatcher.dispatch(&[0.0; 4]));
        assert!(seen.lock().unwrap().iter().all(|(_, t)| *t == 0.0));
    }

    #[test]
    fn failed_hop_keeps_previous_features_and_reports() {
        let mut engine = ScriptedEngine::new(InputDomain::Time);
        engine.fail_on = vec![1];
        let (mut dispatcher, mut scheduler, rx) = build(engine, &config());
        let log = StdArc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        scheduler.connect(0, move |_: &OutputDescriptor, message: FeatureMessage| {
            sink.lock().unwrap().push(message);
        });

        assert!(dispatcher.dispatch(&[0.0; 4]));
        assert!(scheduler.on_fire());
        let before = scheduler.latest().clone();

        assert!(!dispatcher.dispatch(&[0.0; 4]));
        assert!(!scheduler.on_fire(), "a failed hop must not signal");
        assert_eq!(scheduler.latest(), &before);
        assert_eq!(dispatcher.failures(), 1);

        let diagnostics: Vec<_> = rx.with_source("scripted").drain().collect();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(
            diagnostics[0].message,
            "engine `scripted` failed on hop 1: scripted failure"
        );

        // The next hop recovers normally.
        assert!(dispatcher.dispatch(&[0.0; 4]));
        assert!(scheduler.on_fire());
        assert_eq!(scheduler.latest().output(0), &[3.0]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![FeatureMessage::Scalar(1.0), FeatureMessage::Scalar(3.0)]
        );
    }

    #[test]
    fn panicking_engine_is_contained() {
        let mut engine = ScriptedEngine::new(InputDomain::Time);
        engine.panic_on = vec![0];
        let (mut dispatcher, mut scheduler, rx) = build(engine, &config());

        assert!(!dispatcher.dispatch(&[0.0; 4]));
        assert!(!scheduler.on_fire());
        let diagnostics: Vec<_> = rx.drain().collect();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.ends_with("engine panicked"));
    }

    #[test]
    fn empty_feature_set_still_signals() {
        let mut engine = ScriptedEngine::new(InputDomain::Time);
        engine.silent = true;
        let (mut dispatcher, mut scheduler, _rx) = build(engine, &config());
        assert!(dispatcher.dispatch(&[0.0; 4]));
        assert!(scheduler.is_pending());
        assert!(scheduler.on_fire());
        assert!(scheduler.latest().is_empty());
    }

    #[test]
    fn rejected_framing_is_a_config_error() {
        let mut engine = ScriptedEngine::new(InputDomain::Time);
        engine.accept_framing = false;
        let (tx, _rx) = diagnostics_channel(1);
        let err = AnalysisDispatcher::new(Box::new(engine), &config(), tx).err().unwrap();
        assert!(matches!(err, ConfigError::FramingRejected { step_size: 4, .. }));
    }

    #[test]
    fn engine_without_outputs_is_a_config_error() {
        let mut engine = ScriptedEngine::new(InputDomain::Time);
        engine.outputs.clear();
        let (tx, _rx) = diagnostics_channel(1);
        let err = AnalysisDispatcher::new(Box::new(engine), &config(), tx).err().unwrap();
        assert_eq!(err, ConfigError::NoOutputs("scripted".into()));
    }
}
