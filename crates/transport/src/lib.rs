//! TPM transport and handle/session lifecycle management.
//!
//! This crate owns everything that touches the chip directly: opening
//! the TSS context against a resolved device spec, caching the
//! capability queries (`GetCapability` for algorithms, commands, and
//! implemented PCR banks), deriving and persisting the storage root
//! key, and the scoped handle/session guards that guarantee release
//! on every exit path. Everything above this crate works with handles
//! and sessions as opaque, RAII-managed values.

pub mod device;

#[cfg(feature = "hardware-tpm")]
pub mod context;
#[cfg(feature = "hardware-tpm")]
pub mod handle;
#[cfg(feature = "hardware-tpm")]
pub mod session;
#[cfg(feature = "hardware-tpm")]
pub mod srk;

#[cfg(feature = "hardware-tpm")]
pub use context::{Capabilities, Context};
#[cfg(feature = "hardware-tpm")]
pub use handle::{Handle, ReleaseMode};
#[cfg(feature = "hardware-tpm")]
pub use srk::{SrkTemplate, SRK_PERSISTENT_RANGE_END, SRK_PERSISTENT_RANGE_START};
