//! Ambient foundation shared by every layer of the TPM2 sealing engine:
//! the error kind, structured logging setup, configuration loading, and
//! zero-on-drop secret storage.
//!
//! Nothing in this crate talks to a TPM; it exists so the layered crates
//! (`tpmseal-pcr`, `tpmseal-transport`, `tpmseal-policy`, `tpmseal-seal`)
//! share one error type and one notion of "a secret that must not outlive
//! its use".

pub mod config;
pub mod error;
pub mod logging;
pub mod secret;

pub use config::Config;
pub use error::{Error, Result};
pub use secret::Secret;
