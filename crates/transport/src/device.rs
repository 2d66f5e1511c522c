//! Device spec parsing and `/sys/class/tpmrm` enumeration.

use std::path::Path;
use tpmseal_core::{Error, Result};

/// A parsed device spec: which driver to load, and the parameter string
/// to hand it (a device path, a simulator address, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub driver: String,
    pub param: String,
}

/// One entry discovered under `/sys/class/tpmrm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmrmDevice {
    pub device_path: String,
    pub device_name: String,
    pub driver_name: String,
}

/// A driver name must be safe to use as a dynamic-library/module lookup
/// key: no path separators, no leading dot, ASCII alphanumeric plus `-`/`_`.
fn is_valid_driver_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse a device spec, per spec:
/// - `driver:param` (e.g. `device:/dev/tpmrm0`)
/// - an absolute device path, interpreted as the `device` driver
/// - empty, meaning "use the configured default" (the caller resolves
///   this before calling `parse`; this function is never handed "")
pub fn parse(spec: &str) -> Result<DeviceSpec> {
    if spec.is_empty() {
        return Err(Error::BadArgument(
            "empty device spec must be resolved by the caller before parsing".to_string(),
        ));
    }

    if let Some((driver, param)) = spec.split_once(':') {
        if !is_valid_driver_name(driver) {
            return Err(Error::BadArgument(format!("invalid transport driver name: {driver}")));
        }
        return Ok(DeviceSpec { driver: driver.to_string(), param: param.to_string() });
    }

    if spec.starts_with('/') {
        return Ok(DeviceSpec { driver: "device".to_string(), param: spec.to_string() });
    }

    Err(Error::BadArgument(format!(
        "device spec '{spec}' is neither 'driver:param' nor an absolute path"
    )))
}

/// Enumerate `/sys/class/tpmrm/<name>/device` and its `driver` symlink.
///
/// Returns one entry per resource-manager device found. Automatic
/// selection (no device spec given, more than the built-in default
/// available) requires this to yield exactly one entry.
pub fn enumerate_tpmrm_devices(sysfs_root: &Path) -> Result<Vec<TpmrmDevice>> {
    let class_dir = sysfs_root.join("class").join("tpmrm");
    let mut out = Vec::new();

    let entries = match std::fs::read_dir(&class_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(Error::Io(e)),
    };

    for entry in entries {
        let entry = entry.map_err(Error::Io)?;
        let device_name = entry.file_name().to_string_lossy().into_owned();
        let device_link = entry.path().join("device");
        let device_path = std::fs::canonicalize(&device_link)
            .unwrap_or(device_link)
            .to_string_lossy()
            .into_owned();

        let driver_link = entry.path().join("device").join("driver");
        let driver_name = std::fs::read_link(&driver_link)
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();

        out.push(TpmrmDevice { device_path, device_name, driver_name });
    }

    out.sort_by(|a, b| a.device_name.cmp(&b.device_name));
    Ok(out)
}

/// Automatic device selection: succeeds only when exactly one tpmrm
/// device is present.
pub fn select_unique_device(sysfs_root: &Path) -> Result<TpmrmDevice> {
    let mut devices = enumerate_tpmrm_devices(sysfs_root)?;
    match devices.len() {
        0 => Err(Error::NotFound("no TPM resource manager device found".to_string())),
        1 => Ok(devices.remove(0)),
        n => Err(Error::BadArgument(format!(
            "automatic TPM device selection requires exactly one device, found {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_driver_param_form() {
        let spec = parse("device:/dev/tpmrm0").unwrap();
        assert_eq!(spec.driver, "device");
        assert_eq!(spec.param, "/dev/tpmrm0");
    }

    #[test]
    fn parses_bare_absolute_path_as_device_driver() {
        let spec = parse("/dev/tpmrm0").unwrap();
        assert_eq!(spec.driver, "device");
        assert_eq!(spec.param, "/dev/tpmrm0");
    }

    #[test]
    fn rejects_empty_spec() {
        assert!(parse("").is_err());
    }

    #[test]
    fn rejects_relative_non_driver_spec() {
        assert!(parse("not-a-path").is_err());
    }

    #[test]
    fn rejects_unsafe_driver_names() {
        assert!(parse("../evil:param").is_err());
        assert!(parse("foo/bar:param").is_err());
    }

    #[test]
    fn enumerate_returns_empty_when_sysfs_path_absent() {
        let devices = enumerate_tpmrm_devices(Path::new("/nonexistent/sysfs/root")).unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn enumerate_finds_a_fixture_device() {
        let tmp = tempdir();
        let tpmrm0 = tmp.join("class/tpmrm/tpmrm0/device");
        fs::create_dir_all(&tpmrm0).unwrap();
        let driver_target = tmp.join("driver-target/tpm_tis");
        fs::create_dir_all(&driver_target).unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(&driver_target, tpmrm0.join("driver")).unwrap();

        let devices = enumerate_tpmrm_devices(&tmp).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_name, "tpmrm0");
        #[cfg(unix)]
        assert_eq!(devices[0].driver_name, "tpm_tis");

        fs::remove_dir_all(&tmp).ok();
    }

    fn tempdir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("tpmseal-device-test-{}", std::process::id()));
        std::fs::create_dir_all(&p).unwrap();
        p
    }
}
