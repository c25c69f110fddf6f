mod source;

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use hopframe_core::{
    configure, diagnostics_channel, AnalysisConfig, EngineRegistry, FeatureMessage, HopframeError,
    OutputDescriptor, TimestampPolicy,
};
use tracing_subscriber::EnvFilter;

use crate::source::Signal;

fn main() -> hopframe_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Engines => list_engines(),
        Commands::Describe { analysis, json } => describe(&analysis, json),
        Commands::Run(args) => run(args),
    }
}

fn list_engines() -> hopframe_core::Result<()> {
    let registry = EngineRegistry::builtin();
    let (sender, receiver) = diagnostics_channel(registry.list().len().max(1));
    registry.report_listing(&sender);
    for diagnostic in receiver.drain() {
        println!("{}", diagnostic.message);
    }
    Ok(())
}

fn describe(analysis: &AnalysisArgs, json: bool) -> hopframe_core::Result<()> {
    let config = analysis.resolve()?;
    let (_audio, mut control) = configure(&config)?;

    if json {
        println!("{}", control.description().to_json_pretty()?);
        return Ok(());
    }

    let description = control.description();
    println!(
        "{} ({}), {} domain",
        description.name,
        description.identifier,
        description.input_domain.label()
    );
    if !description.description.is_empty() {
        println!("{}", description.description);
    }

    control.on_diagnostic(|diagnostic| println!("{}", diagnostic.message));
    control.describe_outputs();
    control.list_parameters();
    control.list_programs();
    control.on_delivery_tick();
    Ok(())
}

fn run(args: RunArgs) -> hopframe_core::Result<()> {
    let mut config = args.analysis.resolve()?;
    let signal = match &args.input {
        Some(path) => {
            let signal = Signal::from_wav(path)?;
            if signal.sample_rate != config.sample_rate {
                tracing::info!(
                    file_rate = signal.sample_rate,
                    configured_rate = config.sample_rate,
                    "using the sample rate of the input file"
                );
                config.sample_rate = signal.sample_rate;
            }
            signal
        }
        None => Signal::tone(args.tone, args.amplitude, args.seconds, config.sample_rate),
    };

    tracing::info!(
        engine = %config.engine,
        seconds = signal.duration_secs(),
        hop_seconds = config.hop_seconds(),
        realtime = args.realtime,
        "starting analysis run"
    );

    let (mut audio, mut control) = configure(&config)?;
    connect_printers(&mut control, args.output.as_deref())?;

    let done = Arc::new(AtomicBool::new(false));
    let finished = done.clone();
    let block_size = config.block_size;
    let block_period = Duration::from_secs_f64(block_size as f64 / config.sample_rate as f64);
    let realtime = args.realtime;

    let audio_thread = thread::Builder::new()
        .name("hopframe-audio".into())
        .spawn(move || {
            for block in signal.blocks(block_size) {
                audio.on_audio_block(&block);
                if realtime {
                    thread::sleep(block_period);
                }
            }
            finished.store(true, Ordering::Release);
            audio.stats()
        })?;

    let tick = Duration::from_millis(args.tick_ms.max(1));
    while !done.load(Ordering::Acquire) {
        control.on_delivery_tick();
        thread::sleep(tick);
    }
    control.on_delivery_tick();

    let stats = audio_thread
        .join()
        .map_err(|_| HopframeError::msg("audio thread panicked"))?;
    tracing::info!(
        hops = stats.hops,
        failures = stats.failures,
        coalesced = stats.coalesced,
        rejected_blocks = stats.rejected_blocks,
        dropped_diagnostics = control.dropped_diagnostics(),
        "analysis run finished"
    );
    Ok(())
}

/// Prints every delivered output, or only the one named by `only`.
fn connect_printers(
    control: &mut hopframe_core::ControlSurface,
    only: Option<&str>,
) -> hopframe_core::Result<()> {
    let printer = |descriptor: &OutputDescriptor, message: FeatureMessage| {
        println!("{}: {message}", descriptor.identifier);
    };

    if let Some(identifier) = only {
        if !control.connect_by_identifier(identifier, printer) {
            return Err(HopframeError::msg(format!(
                "engine `{}` has no output `{identifier}`",
                control.description().identifier
            )));
        }
        return Ok(());
    }

    for index in 0..control.outputs().len() {
        control.connect(index, printer);
    }
    Ok(())
}

fn load_config(path: &Path) -> hopframe_core::Result<AnalysisConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|err| HopframeError::msg(format!("invalid config {}: {err}", path.display())))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Hop-based audio feature extraction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the built-in feature engines.
    Engines,
    /// Show the outputs, parameters and programs of one engine.
    Describe {
        #[command(flatten)]
        analysis: AnalysisArgs,
        /// Print the description as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run an engine over a WAV file or a generated tone.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct AnalysisArgs {
    /// Engine identifier, see `hopframe engines`.
    engine: Option<String>,
    /// TOML file holding an analysis configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Samples between two analysis calls; also the frame and FFT size.
    #[arg(long)]
    hop: Option<usize>,
    /// Samples per audio callback.
    #[arg(long)]
    block: Option<usize>,
    #[arg(long, value_enum)]
    timestamps: Option<TimestampArg>,
}

impl AnalysisArgs {
    /// Config file first, then command-line overrides.
    fn resolve(&self) -> hopframe_core::Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(engine) = &self.engine {
            config.engine = engine.clone();
        }
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(hop) = self.hop {
            config.hop_size = hop;
        }
        if let Some(block) = self.block {
            config.block_size = block;
        }
        if let Some(timestamps) = self.timestamps {
            config.timestamps = timestamps.into();
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    analysis: AnalysisArgs,
    /// WAV file to analyse; a sine tone is generated when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Frequency of the generated tone in Hz.
    #[arg(long, default_value_t = 440.0)]
    tone: f32,
    #[arg(long, default_value_t = 0.5)]
    amplitude: f32,
    /// Length of the generated tone in seconds.
    #[arg(long, default_value_t = 1.0)]
    seconds: f32,
    /// Only print the output with this identifier.
    #[arg(long)]
    output: Option<String>,
    /// Pace the audio thread at the real callback rate.
    #[arg(long)]
    realtime: bool,
    /// Interval between two delivery ticks in milliseconds.
    #[arg(long, default_value_t = 5)]
    tick_ms: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TimestampArg {
    Advancing,
    Constant,
}

impl From<TimestampArg> for TimestampPolicy {
    fn from(value: TimestampArg) -> Self {
        match value {
            TimestampArg::Advancing => TimestampPolicy::Advancing,
            TimestampArg::Constant => TimestampPolicy::Constant,
        }
    }
}
