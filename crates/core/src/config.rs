//! Configuration for the sealing engine: device selection defaults, bank
//! preference, and the RNG-crediting flag file location.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The environment variable that overrides the default device spec.
///
/// Unset means "use the built-in default". Set to the empty string means
/// "defer to the transport's own discovery" (spec.md §6).
pub const DEVICE_ENV_VAR: &str = "SYSTEMD_TPM2_DEVICE";

/// Non-interactive PIN supply. Must be unset and erased by the caller
/// after reading; the engine only reads it, it never clears the
/// process environment itself (that is a caller responsibility since
/// `std::env::remove_var` affects the whole process).
pub const PIN_ENV_VAR: &str = "PIN";

/// Default device spec used when neither config nor environment provides
/// one.
pub const DEFAULT_DEVICE_SPEC: &str = "device:/dev/tpmrm0";

/// Default path for the "have we credited TPM RNG output this boot"
/// flag file.
pub const DEFAULT_RNG_FLAG_PATH: &str = "/run/tpmseal/tpm-rng-credited";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Device spec to open when the caller doesn't supply one explicitly.
    #[serde(default)]
    pub device_spec: Option<String>,
    /// Preferred PCR bank when more than one bank qualifies
    /// (see the bank quality heuristic in the PCR algebra component).
    #[serde(default = "Config::default_preferred_bank")]
    pub preferred_bank: String,
    /// Flag file tracking at-most-once TPM RNG crediting.
    #[serde(default = "Config::default_rng_flag_path")]
    pub rng_flag_path: String,
}

impl Config {
    fn default_preferred_bank() -> String {
        "sha256".to_string()
    }

    fn default_rng_flag_path() -> String {
        DEFAULT_RNG_FLAG_PATH.to_string()
    }

    /// Resolve the device spec to open: environment override first (the
    /// empty string means "defer to transport discovery", which is
    /// represented here as `None`), then the explicit config value, then
    /// the hard-coded default.
    pub fn resolve_device_spec(&self) -> Option<String> {
        if let Ok(env_value) = std::env::var(DEVICE_ENV_VAR) {
            return if env_value.is_empty() {
                None
            } else {
                Some(env_value)
            };
        }
        self.device_spec
            .clone()
            .or_else(|| Some(DEFAULT_DEVICE_SPEC.to_string()))
    }

    /// Load from a TOML file, applying environment overrides afterwards.
    #[cfg(feature = "toml-config")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| crate::Error::BadArgument(e.to_string()))?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to built-in
    /// defaults. Never fails: a malformed config file is logged and
    /// ignored in favour of defaults, since a seal/unseal operation should
    /// not become impossible just because of a broken config file.
    pub fn load_with_defaults<P: AsRef<Path>>(path: Option<P>) -> Self {
        #[cfg(feature = "toml-config")]
        if let Some(p) = &path {
            if p.as_ref().exists() {
                match Self::from_file(p) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed config file"),
                }
            }
        }
        #[cfg(not(feature = "toml-config"))]
        let _ = &path;

        Self::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_spec: None,
            preferred_bank: Self::default_preferred_bank(),
            rng_flag_path: Self::default_rng_flag_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_device_spec_is_tpmrm0() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var(DEVICE_ENV_VAR);
        let config = Config::default();
        assert_eq!(config.resolve_device_spec().as_deref(), Some(DEFAULT_DEVICE_SPEC));
    }

    #[test]
    fn empty_env_override_defers_to_transport_discovery() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(DEVICE_ENV_VAR, "");
        let config = Config::default();
        assert_eq!(config.resolve_device_spec(), None);
        std::env::remove_var(DEVICE_ENV_VAR);
    }

    #[test]
    fn nonempty_env_override_wins_over_config_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var(DEVICE_ENV_VAR, "device:/dev/tpm0");
        let mut config = Config::default();
        config.device_spec = Some("device:/dev/tpmrm1".to_string());
        assert_eq!(
            config.resolve_device_spec().as_deref(),
            Some("device:/dev/tpm0")
        );
        std::env::remove_var(DEVICE_ENV_VAR);
    }
}
