/// Rolling frame of the most recent `hop_size` samples.
///
/// Every push shifts the frame left by the block length and appends the
/// block, so the frame always holds exactly `hop_size` samples in temporal
/// order. Analysis is due when the samples accumulated since the last
/// [`reset`](Self::reset) add up to the hop size.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    frame: Vec<f32>,
    accumulated: usize,
}

impl FrameAccumulator {
    /// Creates a zero-filled frame of `hop_size` samples.
    ///
    /// # Panics
    ///
    /// Panics if `hop_size == 0`.
    pub fn new(hop_size: usize) -> Self {
        assert!(hop_size > 0, "FrameAccumulator hop size must be > 0");
        Self {
            frame: vec![0.0; hop_size],
            accumulated: 0,
        }
    }

    /// Appends `block` and returns `true` when a full hop has accumulated.
    ///
    /// Callers must keep `block.len() <= hop_size` and push blocks whose
    /// lengths divide the hop size, otherwise the count steps over the hop
    /// boundary and this never returns `true` again until reset.
    pub fn push(&mut self, block: &[f32]) -> bool {
        let hop_size = self.frame.len();
        debug_assert!(block.len() <= hop_size, "block longer than hop");

        let n = block.len().min(hop_size);
        let block = &block[block.len() - n..];
        self.frame.copy_within(n.., 0);
        self.frame[hop_size - n..].copy_from_slice(block);

        self.accumulated += n;
        self.accumulated == hop_size
    }

    /// Zeroes the accumulated count after the frame has been consumed.
    pub fn reset(&mut self) {
        self.accumulated = 0;
    }

    pub fn frame(&self) -> &[f32] {
        &self.frame
    }

    pub fn accumulated(&self) -> usize {
        self.accumulated
    }

    pub fn hop_size(&self) -> usize {
        self.frame.len()
    }
}
