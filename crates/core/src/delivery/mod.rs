//! Deferred delivery of feature sets from the audio context to listeners.
//!
//! ```text
//! audio context                         control context
//! ─────────────                         ───────────────
//! DeliverySignal::features_mut()        DeliveryScheduler::on_fire()
//!   engine writes the back buffer         takes the latest publication
//! DeliverySignal::signal()  ──slot──▶     emits one message per output
//! ```
//!
//! At most one delivery is pending at a time. Signalling again before the
//! control context fires replaces the pending set, so bursts coalesce and
//! only the newest hop is emitted.

pub mod diagnostics;
pub mod handoff;

use std::{fmt, sync::mpsc, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{FeatureSet, OutputDescriptor};

use handoff::{feature_slot, SlotReader, SlotWriter};

/// Message emitted for one output on one delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureMessage {
    Scalar(f32),
    List(Vec<f32>),
}

impl FeatureMessage {
    /// Shapes `values` into a message. Empty outputs produce nothing.
    pub fn from_values(values: &[f32]) -> Option<Self> {
        match values {
            [] => None,
            [value] => Some(FeatureMessage::Scalar(*value)),
            values => Some(FeatureMessage::List(values.to_vec())),
        }
    }

    pub fn values(&self) -> &[f32] {
        match self {
            FeatureMessage::Scalar(value) => std::slice::from_ref(value),
            FeatureMessage::List(values) => values,
        }
    }
}

impl fmt::Display for FeatureMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureMessage::Scalar(value) => write!(f, "{value}"),
            FeatureMessage::List(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
        }
    }
}

/// Receives the messages of one output.
pub trait FeatureListener {
    fn deliver(&mut self, output: &OutputDescriptor, message: FeatureMessage);
}

impl<F> FeatureListener for F
where
    F: FnMut(&OutputDescriptor, FeatureMessage),
{
    fn deliver(&mut self, output: &OutputDescriptor, message: FeatureMessage) {
        self(output, message)
    }
}

/// Forwards `(output identifier, message)` pairs over a channel. A hung-up
/// receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelListener(pub mpsc::Sender<(String, FeatureMessage)>);

impl FeatureListener for ChannelListener {
    fn deliver(&mut self, output: &OutputDescriptor, message: FeatureMessage) {
        let _ = self.0.send((output.identifier.clone(), message));
    }
}

type BoxedListener = Box<dyn FeatureListener + Send>;

/// Creates the two ends of a delivery path for an engine with `outputs`.
pub fn delivery_channel(outputs: Arc<[OutputDescriptor]>) -> (DeliverySignal, DeliveryScheduler) {
    let (writer, reader) = feature_slot(FeatureSet::with_layout(&outputs));
    let listeners = outputs.iter().map(|_| None).collect();
    (
        DeliverySignal {
            writer,
            coalesced: 0,
        },
        DeliveryScheduler {
            reader,
            outputs,
            listeners,
            fired: 0,
        },
    )
}

/// Audio-context end.
pub struct DeliverySignal {
    writer: SlotWriter,
    coalesced: u64,
}

impl DeliverySignal {
    /// Buffer the next feature set is written into. Its content only becomes
    /// visible to the control context on [`signal`](Self::signal).
    pub fn features_mut(&mut self) -> &mut FeatureSet {
        self.writer.back_mut()
    }

    /// Publishes the buffer and marks a delivery as pending.
    pub fn signal(&mut self) {
        if self.writer.publish() {
            self.coalesced += 1;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.writer.is_pending()
    }

    /// Hops whose delivery was replaced by a newer one before firing.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

impl fmt::Debug for DeliverySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliverySignal")
            .field("pending", &self.is_pending())
            .field("coalesced", &self.coalesced)
            .finish()
    }
}

/// Control-context end: routes each output to its listener.
pub struct DeliveryScheduler {
    reader: SlotReader,
    outputs: Arc<[OutputDescriptor]>,
    listeners: Vec<Option<BoxedListener>>,
    fired: u64,
}

impl DeliveryScheduler {
    pub fn outputs(&self) -> &[OutputDescriptor] {
        &self.outputs
    }

    /// Routes output `index` to `listener`, replacing any previous one.
    /// Returns `false` when the engine has no such output.
    pub fn connect<L>(&mut self, index: usize, listener: L) -> bool
    where
        L: FeatureListener + Send + 'static,
    {
        match self.listeners.get_mut(index) {
            Some(slot) => {
                *slot = Some(Box::new(listener));
                true
            }
            None => false,
        }
    }

    pub fn connect_by_identifier<L>(&mut self, identifier: &str, listener: L) -> bool
    where
        L: FeatureListener + Send + 'static,
    {
        match self
            .outputs
            .iter()
            .position(|output| output.identifier == identifier)
        {
            Some(index) => self.connect(index, listener),
            None => false,
        }
    }

    pub fn disconnect(&mut self, index: usize) {
        if let Some(slot) = self.listeners.get_mut(index) {
            *slot = None;
        }
    }

    /// Emits the pending feature set, if any.
    ///
    /// Outputs are visited in index order. Returns `false` without emitting
    /// anything when no hop completed since the previous firing.
    pub fn on_fire(&mut self) -> bool {
        if !self.reader.update() {
            return false;
        }

        let features = self.reader.latest();
        for (index, output) in self.outputs.iter().enumerate() {
            let Some(listener) = self.listeners[index].as_mut() else {
                continue;
            };
            if let Some(message) = FeatureMessage::from_values(features.output(index)) {
                listener.deliver(output, message);
            }
        }

        self.fired += 1;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.reader.is_pending()
    }

    /// The feature set emitted by the last firing.
    pub fn latest(&self) -> &FeatureSet {
        self.reader.latest()
    }

    /// Number of firings that emitted a feature set.
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

impl fmt::Debug for DeliveryScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryScheduler")
            .field("outputs", &self.outputs.len())
            .field(
                "connected",
                &self.listeners.iter().filter(|l| l.is_some()).count(),
            )
            .field("fired", &self.fired)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    type Log = Arc<Mutex<Vec<(String, FeatureMessage)>>>;

    fn recorder(log: &Log) -> impl FnMut(&OutputDescriptor, FeatureMessage) + Send + 'static {
        let log = log.clone();
        move |output: &OutputDescriptor, message: FeatureMessage| {
            log.lock().unwrap().push((output.identifier.clone(), message));
        }
    }

    fn channel(bins: &[usize]) -> (DeliverySignal, DeliveryScheduler) {
        let outputs: Arc<[OutputDescriptor]> = bins
            .iter()
            .enumerate()
            .map(|(i, bins)| OutputDescriptor::new(format!("out{i}"), format!("Output {i}"), *bins))
            .collect();
        delivery_channel(outputs)
    }

    fn publish(signal: &mut DeliverySignal, outputs: &[&[f32]]) {
        let features = signal.features_mut();
        features.clear();
        for (index, values) in outputs.iter().enumerate() {
            features.set(index, values);
        }
        signal.signal();
    }

    #[test]
    fn single_value_is_emitted_as_scalar() {
        let (mut signal, mut scheduler) = channel(&[1]);
        let log = Log::default();
        assert!(scheduler.connect(0, recorder(&log)));

        publish(&mut signal, &[&[0.75]]);
        assert!(scheduler.on_fire());

        assert_eq!(
            *log.lock().unwrap(),
            vec![("out0".to_string(), FeatureMessage::Scalar(0.75))]
        );
    }

    #[test]
    fn several_values_are_emitted_as_ordered_list() {
        let (mut signal, mut scheduler) = channel(&[3]);
        let log = Log::default();
        scheduler.connect(0, recorder(&log));

        publish(&mut signal, &[&[1.0, 2.0, 3.0]]);
        scheduler.on_fire();

        assert_eq!(
            log.lock().unwrap()[0].1,
            FeatureMessage::List(vec![1.0, 2.0, 3.0])
        );
    }

    #[test]
    fn empty_output_emits_nothing() {
        let (mut signal, mut scheduler) = channel(&[1, 2]);
        let log = Log::default();
        scheduler.connect(0, recorder(&log));
        scheduler.connect(1, recorder(&log));

        publish(&mut signal, &[&[], &[4.0, 5.0]]);
        assert!(scheduler.on_fire());

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "out1");
    }

    #[test]
    fn outputs_route_to_their_own_listener_in_order() {
        let (mut signal, mut scheduler) = channel(&[1, 1]);
        let first = Log::default();
        let second = Log::default();
        scheduler.connect_by_identifier("out1", recorder(&second));
        scheduler.connect_by_identifier("out0", recorder(&first));

        publish(&mut signal, &[&[1.0], &[2.0]]);
        scheduler.on_fire();

        assert_eq!(first.lock().unwrap()[0].1, FeatureMessage::Scalar(1.0));
        assert_eq!(second.lock().unwrap()[0].1, FeatureMessage::Scalar(2.0));
    }

    #[test]
    fn firing_twice_without_signal_does_not_duplicate() {
        let (mut signal, mut scheduler) = channel(&[1]);
        let log = Log::default();
        scheduler.connect(0, recorder(&log));

        publish(&mut signal, &[&[0.5]]);
        assert!(scheduler.on_fire());
        assert!(!scheduler.on_fire());

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(scheduler.fired(), 1);
    }

    #[test]
    fn burst_of_signals_coalesces_to_latest() {
        let (mut signal, mut scheduler) = channel(&[1]);
        let log = Log::default();
        scheduler.connect(0, recorder(&log));

        publish(&mut signal, &[&[1.0]]);
        publish(&mut signal, &[&[2.0]]);
        publish(&mut signal, &[&[3.0]]);
        assert_eq!(signal.coalesced(), 2);

        assert!(scheduler.on_fire());
        assert!(!scheduler.on_fire());
        assert_eq!(
            *log.lock().unwrap(),
            vec![("out0".to_string(), FeatureMessage::Scalar(3.0))]
        );
    }

    #[test]
    fn unconnected_and_unknown_outputs() {
        let (mut signal, mut scheduler) = channel(&[1]);
        assert!(!scheduler.connect(3, |_: &OutputDescriptor, _: FeatureMessage| {}));
        assert!(!scheduler.connect_by_identifier("missing", |_: &OutputDescriptor, _: FeatureMessage| {}));

        publish(&mut signal, &[&[1.0]]);
        assert!(scheduler.on_fire());
        assert_eq!(scheduler.latest().output(0), &[1.0]);
    }

    #[test]
    fn channel_listener_forwards_messages() {
        let (mut signal, mut scheduler) = channel(&[2]);
        let (tx, rx) = mpsc::channel();
        scheduler.connect(0, ChannelListener(tx));

        publish(&mut signal, &[&[0.1, 0.2]]);
        scheduler.on_fire();

        let (identifier, message) = rx.try_recv().unwrap();
        assert_eq!(identifier, "out0");
        assert_eq!(message.values(), &[0.1, 0.2]);
        assert_eq!(message.to_string(), "0.1 0.2");
    }
}
