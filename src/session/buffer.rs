//! Receive buffer that doubles on demand up to a hard ceiling.

/// Growing past the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("receive buffer would exceed the {max} byte packet limit")]
pub struct BufferError {
    pub max: usize,
}

/// Byte buffer with a filled prefix and writable spare space.
///
/// Capacity starts at `initial`, doubles through [`grow`](Self::grow) and
/// never exceeds `max`. [`reset`](Self::reset) drops back to `initial`.
#[derive(Debug)]
pub struct GrowableBuffer {
    data: Vec<u8>,
    filled: usize,
    initial: usize,
    max: usize,
}

impl GrowableBuffer {
    pub fn new(initial: usize, max: usize) -> Self {
        let initial = initial.clamp(1, max.max(1));
        Self {
            data: vec![0; initial],
            filled: 0,
            initial,
            max: max.max(initial),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn max_capacity(&self) -> usize {
        self.max
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.data.len()
    }

    pub fn filled(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Writable tail of the buffer.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.filled..]
    }

    /// Mark `n` bytes of the spare tail as filled.
    pub fn advance(&mut self, n: usize) {
        self.filled = (self.filled + n).min(self.data.len());
    }

    /// Discard the first `n` filled bytes, moving the rest to the front.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.filled);
        self.data.copy_within(n..self.filled, 0);
        self.filled -= n;
    }

    /// Double the capacity, bounded by the ceiling.
    pub fn grow(&mut self) -> Result<(), BufferError> {
        let capacity = self.data.len();
        if capacity >= self.max {
            return Err(BufferError { max: self.max });
        }
        let next = capacity.saturating_mul(2).min(self.max);
        self.data.resize(next, 0);
        Ok(())
    }

    /// Empty the buffer and shrink back to the initial capacity.
    pub fn reset(&mut self) {
        self.filled = 0;
        if self.data.len() > self.initial {
            self.data.truncate(self.initial);
            self.data.shrink_to_fit();
        }
    }
}
