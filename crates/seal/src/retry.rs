//! The bounded unseal retry state machine: a fresh policy session each
//! iteration, previous policy digest discarded, PCR-race as the only
//! retryable TPM error.
//!
//! ```text
//! IDLE → PolicySessionOpen → PolicyInstalled → DigestCheckPassed → Unsealed   (terminal)
//!                    ↑                                    ↓
//!                    └────── PCR_CHANGED & retries>0 ─────┘
//!                                                         ↓ retries=0 or other error
//!                                                        FAIL (terminal)
//! ```

use tpmseal_core::{Error, Result};

pub const RETRY_UNSEAL_MAX: u32 = 30;

/// The retry loop's state, named after the diagram above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    PolicySessionOpen,
    PolicyInstalled,
    DigestCheckPassed,
    Unsealed,
    Fail,
}

/// What a single iteration attempt reported back.
pub enum Outcome<T> {
    /// The attempt succeeded; `Unsealed` is terminal.
    Success(T),
    /// PCR state changed mid-session; retry if budget remains.
    PcrRace,
    /// Expected policy digest did not match; not retryable.
    DigestMismatch,
    /// Any other TPM failure; not retryable.
    Other(Error),
}

/// Drives one retry loop to completion, calling `attempt` for each
/// iteration. `attempt` is expected to open a fresh policy session,
/// install the policy, check the digest, and issue the unseal command,
/// reporting which of those steps it reached via [`Outcome`].
pub fn run<T>(mut attempt: impl FnMut(u32) -> Outcome<T>) -> Result<T> {
    let mut state = State::Idle;
    let mut retries_remaining = RETRY_UNSEAL_MAX;

    loop {
        state = State::PolicySessionOpen;
        tracing::trace!(?state, retries_remaining, "opening fresh policy session");

        match attempt(retries_remaining) {
            Outcome::Success(value) => {
                state = State::Unsealed;
                tracing::trace!(?state, "unseal succeeded");
                return Ok(value);
            }
            Outcome::PcrRace => {
                if retries_remaining == 0 {
                    state = State::Fail;
                    tracing::debug!(?state, "PCR state kept changing across every retry attempt");
                    return Err(Error::PcrRace);
                }
                retries_remaining -= 1;
                state = State::PolicyInstalled;
                tracing::debug!(?state, retries_remaining, "PCR changed mid-session, retrying");
                // loop back to PolicySessionOpen with a fresh session
            }
            Outcome::DigestMismatch => {
                state = State::Fail;
                tracing::debug!(?state, "expected policy digest mismatch");
                return Err(Error::Denied("policy digest did not match the expected digest".to_string()));
            }
            Outcome::Other(e) => {
                state = State::Fail;
                tracing::debug!(?state, error = %e, "unseal failed with an unrecoverable error");
                return Err(e);
            }
        }
    }
}
