//! Fingerprinting of rendered configurations.
//!
//! Rendering is deterministic, so the fingerprint of the rendered text
//! identifies a descriptor's output and lets `init` tell whether the file on
//! disk still matches what the caller asked for.

use sha2::{Digest, Sha256};

/// Hasher for computing configuration fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the hex-encoded SHA-256 of a rendered configuration.
    #[must_use]
    pub fn fingerprint(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let hasher = ConfigHasher::new();
        assert_eq!(hasher.fingerprint("abc"), hasher.fingerprint("abc"));
        assert_ne!(hasher.fingerprint("abc"), hasher.fingerprint("abd"));
        assert_eq!(hasher.fingerprint("abc").len(), 64);
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");
        assert_eq!(short, "abcdef12");
    }

    #[test]
    fn test_fingerprint_is_plain_sha256() {
        assert_eq!(
            ConfigHasher::new().fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
