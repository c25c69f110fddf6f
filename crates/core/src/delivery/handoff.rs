//! Single-slot, latest-wins handoff of feature sets between two threads.
//!
//! Three buffers rotate between a writer (audio context), a reader (control
//! context) and a shared middle slot. The writer fills its private buffer and
//! publishes it by swapping it with the middle slot; the reader takes the
//! middle slot only when it carries the dirty bit. Neither side ever waits
//! and neither side can observe a buffer the other is writing.

use std::{
    cell::UnsafeCell,
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use crate::FeatureSet;

const INDEX_MASK: u8 = 0b011;
const DIRTY: u8 = 0b100;

struct Shared {
    buffers: [UnsafeCell<FeatureSet>; 3],
    /// Index of the middle buffer, plus [`DIRTY`] when it holds an unread
    /// publication.
    middle: AtomicU8,
}

// SAFETY: each buffer index is owned by exactly one of writer, reader or the
// middle slot at any time. Ownership only moves through the atomic swap on
// `middle`, which gives the acquire/release edge for the buffer contents.
unsafe impl Sync for Shared {}

/// Creates a connected writer/reader pair. Every buffer starts as a clone of
/// `initial`, so preallocated capacity is available on all three.
pub fn feature_slot(initial: FeatureSet) -> (SlotWriter, SlotReader) {
    let shared = Arc::new(Shared {
        buffers: [
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial),
        ],
        middle: AtomicU8::new(1),
    });
    (
        SlotWriter {
            shared: shared.clone(),
            index: 0,
        },
        SlotReader { shared, index: 2 },
    )
}

/// Audio-context half.
pub struct SlotWriter {
    shared: Arc<Shared>,
    index: u8,
}

impl SlotWriter {
    /// The writer's private buffer. Invisible to the reader until published.
    pub fn back_mut(&mut self) -> &mut FeatureSet {
        // SAFETY: `self.index` is owned by the writer until the next publish.
        unsafe { &mut *self.shared.buffers[self.index as usize].get() }
    }

    /// Makes the private buffer the latest publication.
    ///
    /// Returns `true` when an earlier publication had not been read yet and
    /// was replaced.
    pub fn publish(&mut self) -> bool {
        let previous = self.shared.middle.swap(self.index | DIRTY, Ordering::AcqRel);
        self.index = previous & INDEX_MASK;
        previous & DIRTY != 0
    }

    /// `true` while a publication is waiting for the reader.
    pub fn is_pending(&self) -> bool {
        self.shared.middle.load(Ordering::Acquire) & DIRTY != 0
    }
}

/// Control-context half.
pub struct SlotReader {
    shared: Arc<Shared>,
    index: u8,
}

impl SlotReader {
    /// Takes the latest publication if there is one. Returns `false` and
    /// keeps the current buffer otherwise.
    pub fn update(&mut self) -> bool {
        if self.shared.middle.load(Ordering::Relaxed) & DIRTY == 0 {
            return false;
        }
        let previous = self.shared.middle.swap(self.index, Ordering::AcqRel);
        self.index = previous & INDEX_MASK;
        true
    }

    /// The most recently taken publication.
    pub fn latest(&self) -> &FeatureSet {
        // SAFETY: `self.index` is owned by the reader until the next update.
        unsafe { &*self.shared.buffers[self.index as usize].get() }
    }

    pub fn is_pending(&self) -> bool {
        self.shared.middle.load(Ordering::Acquire) & DIRTY != 0
    }
}

impl fmt::Debug for SlotWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotWriter")
            .field("index", &self.index)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl fmt::Debug for SlotReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotReader")
            .field("index", &self.index)
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn write(writer: &mut SlotWriter, value: f32) -> bool {
        let back = writer.back_mut();
        back.clear();
        back.set(0, &[value, value]);
        writer.publish()
    }

    #[test]
    fn reader_sees_nothing_before_publish() {
        let (_writer, mut reader) = feature_slot(FeatureSet::new());
        assert!(!reader.update());
        assert!(reader.latest().is_empty());
    }

    #[test]
    fn publish_then_update_transfers_set() {
        let (mut writer, mut reader) = feature_slot(FeatureSet::new());
        assert!(!write(&mut writer, 0.75));
        assert!(reader.is_pending());
        assert!(reader.update());
        assert_eq!(reader.latest().output(0), &[0.75, 0.75]);
        assert!(!reader.is_pending());
    }

    #[test]
    fn second_update_without_publish_is_a_no_op() {
        let (mut writer, mut reader) = feature_slot(FeatureSet::new());
        write(&mut writer, 1.0);
        assert!(reader.update());
        assert!(!reader.update());
        assert_eq!(reader.latest().output(0), &[1.0, 1.0]);
    }

    #[test]
    fn latest_publication_wins() {
        let (mut writer, mut reader) = feature_slot(FeatureSet::new());
        assert!(!write(&mut writer, 1.0));
        assert!(write(&mut writer, 2.0));
        assert!(write(&mut writer, 3.0));
        assert!(reader.update());
        assert_eq!(reader.latest().output(0), &[3.0, 3.0]);
    }

    #[test]
    fn unpublished_writes_stay_invisible() {
        let (mut writer, mut reader) = feature_slot(FeatureSet::new());
        write(&mut writer, 1.0);
        reader.update();

        writer.back_mut().set(0, &[9.0]);
        assert!(!reader.update());
        assert_eq!(reader.latest().output(0), &[1.0, 1.0]);
    }

    #[test]
    fn concurrent_reader_never_sees_torn_sets() {
        let (mut writer, mut reader) = feature_slot(FeatureSet::new());

        let producer = thread::spawn(move || {
            for i in 0..20_000 {
                write(&mut writer, i as f32);
            }
        });

        let mut last = -1.0_f32;
        while !producer.is_finished() || reader.is_pending() {
            if reader.update() {
                let values = reader.latest().output(0);
                assert_eq!(values.len(), 2);
                assert_eq!(values[0], values[1]);
                assert!(values[0] > last, "publications must arrive in order");
                last = values[0];
            }
        }
        producer.join().unwrap();
        assert_eq!(last, 19_999.0);
    }
}
