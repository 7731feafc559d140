//! Sync-sequence matcher shared by the LD2413 decoders

/// Incremental matcher for a 4-byte sync sequence
///
/// Only valid for patterns whose bytes are all distinct (true for every
/// Hi-Link header), so a mismatch never needs to backtrack further than
/// re-testing the current byte as a new first byte.
#[derive(Debug, Clone)]
pub(crate) struct SyncMatcher {
    pattern: [u8; 4],
    matched: usize,
}

impl SyncMatcher {
    pub(crate) const fn new(pattern: [u8; 4]) -> Self {
        Self {
            pattern,
            matched: 0,
        }
    }

    /// Feed one byte, returns true when the full pattern has been seen
    pub(crate) fn push(&mut self, byte: u8) -> bool {
        if byte == self.pattern[self.matched] {
            self.matched += 1;
        } else if byte == self.pattern[0] {
            self.matched = 1;
        } else {
            self.matched = 0;
        }

        if self.matched == self.pattern.len() {
            self.matched = 0;
            true
        } else {
            false
        }
    }

    /// Number of pattern bytes matched so far
    #[cfg(test)]
    pub(crate) fn progress(&self) -> usize {
        self.matched
    }

    pub(crate) fn reset(&mut self) {
        self.matched = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_after_false_start() {
        let mut m = SyncMatcher::new([0xF4, 0xF3, 0xF2, 0xF1]);
        let stream = [0xF4, 0xF3, 0xF4, 0xF3, 0xF2, 0xF1];
        let hits: usize = stream.iter().filter(|&&b| m.push(b)).count();
        assert_eq!(hits, 1);
        assert_eq!(m.progress(), 0);
    }

    #[test]
    fn test_no_match_on_garbage() {
        let mut m = SyncMatcher::new([0xFD, 0xFC, 0xFB, 0xFA]);
        for b in [0x00, 0xFC, 0xFB, 0xFA, 0xFD, 0x00] {
            assert!(!m.push(b));
        }
    }
}
