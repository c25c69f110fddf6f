//! Bounded side channel for failures and listing output.
//!
//! Both contexts post here; only the control context reads. Posting never
//! blocks: when the channel is full the diagnostic is dropped and counted.
//! Audio-context reports travel as [`AudioEvent`] values and are turned into
//! text only when drained, so posting one does not allocate.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, SyncSender, TrySendError},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

use crate::ProcessError;

/// Default number of diagnostics buffered between two delivery ticks.
pub const DIAGNOSTIC_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    /// Forwards the diagnostic to `tracing` at the matching level.
    pub fn log(&self) {
        match self.severity {
            Severity::Info => tracing::info!("{}", self.message),
            Severity::Warning => tracing::warn!("{}", self.message),
            Severity::Error => tracing::error!("{}", self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{label}] {}", self.message)
    }
}

/// Fixed-shape report posted from the audio context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioEvent {
    /// The engine call for hop `hop` failed or panicked.
    HopFailed { hop: u64, error: ProcessError },
    /// A host block of the wrong length was dropped.
    BlockRejected { expected: usize, received: usize },
}

impl AudioEvent {
    /// Renders the event for the engine named `source`.
    pub fn into_diagnostic(self, source: &str) -> Diagnostic {
        match self {
            AudioEvent::HopFailed { hop, error } => Diagnostic::new(
                Severity::Error,
                format!("engine `{source}` failed on hop {hop}: {error}"),
            ),
            AudioEvent::BlockRejected { expected, received } => Diagnostic::new(
                Severity::Warning,
                format!("dropping block of {received} samples, expected {expected}"),
            ),
        }
    }
}

enum Posted {
    Diagnostic(Diagnostic),
    Audio(AudioEvent),
}

/// Posting half. Cheap to clone.
#[derive(Clone)]
pub struct DiagnosticSender {
    tx: SyncSender<Posted>,
    dropped: Arc<AtomicU64>,
}

impl DiagnosticSender {
    /// Posts `diagnostic` without blocking. Returns `false` if it was dropped.
    pub fn report(&self, diagnostic: Diagnostic) -> bool {
        self.post(Posted::Diagnostic(diagnostic))
    }

    /// Audio-context variant of [`report`](Self::report). Never allocates.
    pub fn report_audio(&self, event: AudioEvent) -> bool {
        self.post(Posted::Audio(event))
    }

    fn post(&self, posted: Posted) -> bool {
        match self.tx.try_send(posted) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn info(&self, message: impl Into<String>) -> bool {
        self.report(Diagnostic::new(Severity::Info, message))
    }
}

impl fmt::Debug for DiagnosticSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticSender")
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

/// Reading half, owned by the control context.
pub struct DiagnosticReceiver {
    rx: Receiver<Posted>,
    dropped: Arc<AtomicU64>,
    source: String,
}

impl DiagnosticReceiver {
    /// Names the engine that audio events are attributed to.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Yields every diagnostic posted so far, oldest first.
    pub fn drain(&self) -> impl Iterator<Item = Diagnostic> + '_ {
        self.rx.try_iter().map(|posted| match posted {
            Posted::Diagnostic(diagnostic) => diagnostic,
            Posted::Audio(event) => event.into_diagnostic(&self.source),
        })
    }

    /// Diagnostics lost because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for DiagnosticReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticReceiver")
            .field("source", &self.source)
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Creates a channel buffering at most `capacity` diagnostics.
pub fn diagnostics_channel(capacity: usize) -> (DiagnosticSender, DiagnosticReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        DiagnosticSender {
            tx,
            dropped: dropped.clone(),
        },
        DiagnosticReceiver {
            rx,
            dropped,
            source: "engine".to_string(),
        },
    )
}
