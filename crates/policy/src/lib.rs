//! The policy and digest engine: offline computation of authorization
//! policy digests, the shared wire-format marshalling that keeps the
//! offline path and the on-TPM trial-session path in byte-for-byte
//! agreement, on-TPM policy session driving, and signed-policy
//! verification.

pub mod digest;
pub mod marshal;
pub mod signature;

#[cfg(feature = "hardware-tpm")]
pub mod live;

pub use digest::{expected_digest, PolicyDigest, PolicyInputs, ZERO_DIGEST};
pub use signature::{SignatureCollection, SignedPolicyEntry};
