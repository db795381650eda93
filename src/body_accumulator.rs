use log::warn;

use crate::sink::TransferSink;

/// Why the accumulator stopped accepting data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// The configured body limit would have been exceeded.
    LimitExceeded { limit: usize },
    /// The new total length could not be represented or allocated.
    OutOfMemory,
}

/// Collects body chunks into one contiguous buffer.
///
/// Every append allocates a buffer of exactly the new total size and copies
/// the previous contents followed by the new chunk, so the buffer never holds
/// spare capacity from an earlier growth step.
#[derive(Debug, Default)]
pub struct BodyAccumulator {
    body: Vec<u8>,
    max_len: Option<usize>,
    exhaustion: Option<Exhaustion>,
}

impl BodyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_len: Option<usize>) -> Self {
        Self {
            body: Vec::new(),
            max_len,
            exhaustion: None,
        }
    }

    pub fn append(&mut self, chunk: &[u8]) -> usize {
        if chunk.is_empty() {
            return 0;
        }
        if self.exhaustion.is_some() {
            return 0;
        }

        let new_len = match self.body.len().checked_add(chunk.len()) {
            Some(len) => len,
            None => return self.exhausted(Exhaustion::OutOfMemory),
        };

        if let Some(limit) = self.max_len {
            if new_len > limit {
                return self.exhausted(Exhaustion::LimitExceeded { limit });
            }
        }

        let mut grown = Vec::new();
        if grown.try_reserve_exact(new_len).is_err() {
            return self.exhausted(Exhaustion::OutOfMemory);
        }
        grown.extend_from_slice(&self.body);
        grown.extend_from_slice(chunk);
        self.body = grown;

        chunk.len()
    }

    fn exhausted(&mut self, reason: Exhaustion) -> usize {
        warn!(
            "Body accumulation stopped at {} bytes: {:?}",
            self.body.len(),
            reason
        );
        self.exhaustion = Some(reason);
        0
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn exhaustion(&self) -> Option<Exhaustion> {
        self.exhaustion
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }
}

impl TransferSink for BodyAccumulator {
    fn observe(&mut self, data: &[u8]) -> usize {
        self.append(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn empty_chunk_is_a_noop() {
        let mut body = BodyAccumulator::new();
        assert_eq!(body.observe(b""), 0);
        assert!(body.is_empty());
        assert_eq!(body.exhaustion(), None);
    }

    #[test]
    fn chunks_are_appended_in_order() {
        let mut body = BodyAccumulator::new();
        assert_eq!(body.observe(b"hel"), 3);
        assert_eq!(body.observe(b"lo, "), 4);
        assert_eq!(body.observe(b"world"), 5);
        assert_eq!(body.as_bytes(), b"hello, world");
        assert_eq!(body.len(), 12);
    }

    #[test]
    fn capacity_tracks_exact_length() {
        let mut body = BodyAccumulator::new();
        body.observe(&[1u8; 10]);
        body.observe(&[2u8; 7]);
        assert!(body.body.capacity() >= body.len());
        assert_eq!(body.len(), 17);
    }

    #[test]
    fn limit_stops_accumulation() {
        let mut body = BodyAccumulator::with_limit(Some(8));
        assert_eq!(body.observe(b"12345"), 5);
        assert_eq!(body.observe(b"6789"), 0);
        assert_eq!(
            body.exhaustion(),
            Some(Exhaustion::LimitExceeded { limit: 8 })
        );
        // Nothing after the failure is accepted, and earlier data is intact.
        assert_eq!(body.observe(b"x"), 0);
        assert_eq!(body.as_bytes(), b"12345");
    }

    #[test]
    fn chunk_that_exactly_fills_limit_is_accepted() {
        let mut body = BodyAccumulator::with_limit(Some(4));
        assert_eq!(body.observe(b"ab"), 2);
        assert_eq!(body.observe(b"cd"), 2);
        assert_eq!(body.exhaustion(), None);
    }

    #[quickcheck]
    fn concatenates_all_chunks(chunks: Vec<Vec<u8>>) -> bool {
        let mut body = BodyAccumulator::new();
        let mut expected = Vec::new();
        for chunk in chunks.iter() {
            if body.observe(chunk) != chunk.len() {
                return false;
            }
            expected.extend_from_slice(chunk);
        }
        body.len() == expected.len() && body.into_bytes() == expected
    }
}
