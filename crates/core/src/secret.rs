//! Zero-on-drop storage for key material that passes through the engine.

use zeroize::{Zeroize, Zeroizing};

/// An owned byte buffer that is overwritten with zeroes when dropped.
///
/// Used for the unsealed plaintext, PINs, and any derived auth value —
/// anything that must not linger in memory after the caller is done with
/// it.
#[derive(Clone)]
pub struct Secret(Zeroizing<Vec<u8>>);

impl Secret {
    /// Wrap an existing byte vector; the vector's old contents are moved in
    /// (not copied), and will be zeroed on drop.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Borrow the secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the secret, returning the raw bytes. The caller becomes
    /// responsible for zeroing them.
    pub fn into_bytes(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Secret").field(&"<redacted>").finish()
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        // Not constant-time: only used in tests, never on a live auth path.
        self.0.as_slice() == other.0.as_slice()
    }
}

/// Zero a buffer in place. Thin wrapper so call sites read as intent
/// ("zero the TPM's response buffer") rather than a raw `zeroize` call.
pub fn zero(buf: &mut [u8]) {
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_the_bytes() {
        let s = Secret::new(b"hunter2".to_vec());
        assert!(!format!("{:?}", s).contains("hunter2"));
    }

    #[test]
    fn into_bytes_round_trips() {
        let s = Secret::new(vec![1, 2, 3]);
        assert_eq!(s.into_bytes(), vec![1, 2, 3]);
    }

    #[test]
    fn zero_overwrites_backing_memory() {
        let mut buf = vec![0xAAu8; 16];
        zero(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
