//! PIN validation and the TPM auth-value derivation from a PIN: hash,
//! then trim trailing zero bytes.
//!
//! The trim is a forward-compatibility workaround for a quirk in how
//! the TPM spec defines auth-value comparison; it is kept as an
//! explicit, separate step rather than folded into the hash so its
//! rationale stays visible (see the design notes on auth-value
//! trimming — this must not be removed just because it looks
//! redundant for any digest that happens not to end in zero bytes).

use sha2::{Digest, Sha256};
use tpmseal_core::{Error, Result, Secret};

pub const MIN_PIN_LEN: usize = 4;
pub const MAX_PIN_LEN: usize = 32;

/// Reject a PIN whose length falls outside `4..=32` before any TPM
/// round-trip, per spec.
pub fn validate_len(pin: &str) -> Result<()> {
    let len = pin.len();
    if !(MIN_PIN_LEN..=MAX_PIN_LEN).contains(&len) {
        return Err(Error::BadArgument(format!(
            "PIN length {len} out of range {MIN_PIN_LEN}..={MAX_PIN_LEN}"
        )));
    }
    Ok(())
}

/// Trim trailing zero bytes from a digest, in place conceptually
/// (returns a new, possibly-shorter vector). A digest of all zeros
/// trims to empty, matching the TPM's own treatment of an all-zero
/// auth value as "no authorization".
fn trim_trailing_zeros(mut bytes: Vec<u8>) -> Vec<u8> {
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    bytes
}

/// Hash `pin` into a TPM auth value and trim trailing zero bytes.
/// Validates length first.
pub fn auth_value(pin: &str) -> Result<Secret> {
    validate_len(pin)?;
    let digest = Sha256::digest(pin.as_bytes());
    let trimmed = trim_trailing_zeros(digest.to_vec());
    Ok(Secret::new(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_short_and_too_long() {
        assert!(validate_len("abc").is_err());
        assert!(validate_len(&"a".repeat(33)).is_err());
    }

    #[test]
    fn accepts_boundary_lengths() {
        assert!(validate_len("abcd").is_ok());
        assert!(validate_len(&"a".repeat(32)).is_ok());
    }

    #[test]
    fn trims_trailing_zero_bytes() {
        assert_eq!(trim_trailing_zeros(vec![1, 2, 0, 0]), vec![1, 2]);
        assert_eq!(trim_trailing_zeros(vec![0, 0, 0]), Vec::<u8>::new());
        assert_eq!(trim_trailing_zeros(vec![1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn auth_value_is_deterministic_for_the_same_pin() {
        let a = auth_value("hunter2").unwrap();
        let b = auth_value("hunter2").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn auth_value_differs_for_different_pins() {
        let a = auth_value("hunter2").unwrap();
        let b = auth_value("hunter3").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn auth_value_rejects_bad_length_before_hashing() {
        assert!(auth_value("abc").is_err());
    }
}
