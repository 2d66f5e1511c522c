//! Top-level error kind shared by every layer of the sealing engine.

use thiserror::Error;

/// Error kinds as described by the engine's error handling design.
///
/// Each variant maps 1:1 onto a class of TPM return code or a
/// host-side validation failure; callers are expected to match on the
/// kind rather than parse the message.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid PCR index, invalid device spec, PIN length out of range,
    /// malformed blob, or malformed signature entry.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// Transport module missing, symbol missing, or initialisation failed.
    #[error("transport unavailable: {0}")]
    UnavailableTransport(String),

    /// Algorithm, bank, or template the chip doesn't support.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// No device, no matching signature, or no sealed-object token.
    #[error("not found: {0}")]
    NotFound(String),

    /// Expected policy digest mismatch, or unseal refused.
    #[error("denied: {0}")]
    Denied(String),

    /// The TPM is in dictionary-attack lockout.
    #[error("TPM is in dictionary-attack lockout: {0}")]
    Lockout(String),

    /// PCR changed during a policy session (recovered internally up to
    /// `RETRY_UNSEAL_MAX`; a caller only ever sees this after retries are
    /// exhausted).
    #[error("PCR changed mid-session and retries were exhausted")]
    PcrRace,

    /// Any other TPM return code; the decoded vendor string is attached.
    #[error("unrecoverable TPM error: {0}")]
    Unrecoverable(String),

    /// I/O failure reading/writing a blob, flag file, or config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure for a LUKS2 token or signature file.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the one TPM error the unseal retry loop is allowed to
    /// recover from locally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PcrRace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_stable_nonempty_message() {
        let variants: Vec<Error> = vec![
            Error::BadArgument("x".into()),
            Error::UnavailableTransport("x".into()),
            Error::Unsupported("x".into()),
            Error::NotFound("x".into()),
            Error::Denied("x".into()),
            Error::Lockout("x".into()),
            Error::PcrRace,
            Error::Unrecoverable("x".into()),
        ];
        for e in variants {
            assert!(!e.to_string().is_empty());
        }
    }

    #[test]
    fn only_pcr_race_is_retryable() {
        assert!(Error::PcrRace.is_retryable());
        assert!(!Error::Denied("x".into()).is_retryable());
        assert!(!Error::Unrecoverable("x".into()).is_retryable());
    }
}
