//! Content fingerprint used as the cache key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ProcessingMode;

/// Hex-encoded SHA-256 over the input bytes followed by the mode tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of `bytes` processed in `mode`.
    pub fn compute(bytes: &[u8], mode: ProcessingMode) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hasher.update(mode.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a previously computed value, e.g. one read back from storage.
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_input_gives_identical_fingerprint() {
        let a = Fingerprint::compute(b"\x89PNG fixture", ProcessingMode::Optimized);
        let b = Fingerprint::compute(b"\x89PNG fixture", ProcessingMode::Optimized);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn mode_changes_fingerprint() {
        let optimized = Fingerprint::compute(b"same bytes", ProcessingMode::Optimized);
        let original = Fingerprint::compute(b"same bytes", ProcessingMode::Original);
        assert_ne!(optimized, original);
    }

    #[test]
    fn single_byte_difference_changes_fingerprint() {
        let fixtures: [&[u8]; 4] = [b"fixture-a", b"fixture-b", b"fixture-a ", b""];
        let prints: Vec<_> = fixtures
            .iter()
            .map(|bytes| Fingerprint::compute(bytes, ProcessingMode::Optimized))
            .collect();
        for (i, a) in prints.iter().enumerate() {
            for b in prints.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn matches_sha256_of_bytes_then_mode() {
        let expected = hex::encode(Sha256::digest(b"abcoriginal"));
        assert_eq!(
            Fingerprint::compute(b"abc", ProcessingMode::Original).as_str(),
            expected
        );
    }
}
