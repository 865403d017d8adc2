//! Splitting item lists into store-sized batches.

/// Maximum number of write requests the store accepts in one batched call.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Splits a list into chunks of at most `max` items, preserving input order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BatchChunker {
    max: usize,
}

impl Default for BatchChunker {
    fn default() -> Self {
        Self::new(MAX_BATCH_WRITE_ITEMS)
    }
}

impl BatchChunker {
    /// A `max` of zero is treated as one.
    pub fn new(max: usize) -> Self {
        Self { max: max.max(1) }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Number of chunks `len` items split into.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.max)
    }

    pub fn chunk<T>(&self, items: Vec<T>) -> Vec<Vec<T>> {
        let mut chunks = Vec::with_capacity(self.chunk_count(items.len()));
        let mut iter = items.into_iter().peekable();
        while iter.peek().is_some() {
            chunks.push(iter.by_ref().take(self.max).collect());
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(BatchChunker::default().chunk(Vec::<u8>::new()).is_empty());
    }

    #[test]
    fn boundary_sizes() {
        let chunker = BatchChunker::default();
        assert_eq!(chunker.chunk((0..25).collect::<Vec<_>>()).len(), 1);
        let chunks = chunker.chunk((0..26).collect::<Vec<_>>());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], vec![25]);
    }

    #[test]
    fn zero_max_is_clamped() {
        let chunker = BatchChunker::new(0);
        assert_eq!(chunker.max(), 1);
        assert_eq!(chunker.chunk(vec![1, 2, 3]).len(), 3);
    }

    proptest! {
        /// Property: ceil(N/max) non-empty chunks, none above max, order preserved.
        #[test]
        fn chunks_are_bounded_and_ordered(n in 0usize..500, max in 1usize..40) {
            let chunker = BatchChunker::new(max);
            let items: Vec<usize> = (0..n).collect();
            let chunks = chunker.chunk(items.clone());

            prop_assert_eq!(chunks.len(), n.div_ceil(max));
            prop_assert_eq!(chunks.len(), chunker.chunk_count(n));
            for chunk in &chunks {
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.len() <= max);
            }
            let flattened: Vec<usize> = chunks.into_iter().flatten().collect();
            prop_assert_eq!(flattened, items);
        }
    }
}
