//! The seal/unseal pipeline and the external-boundary types it reads
//! and writes: the sealed-object blob, the LUKS2 JSON token, PIN
//! handling, the bounded unseal retry loop, and best-effort TPM
//! entropy crediting.

pub mod blob;
pub mod pin;
pub mod retry;
pub mod rng;
pub mod seal;
pub mod token;

pub use blob::Blob;
pub use seal::{seal, unseal, PrimaryAlg, SealOutput, SealRequest, UnsealRequest};
pub use token::{Tpm2Token, TOKEN_TYPE};
