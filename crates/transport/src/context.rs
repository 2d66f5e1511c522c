//! Transport setup: resolve the device spec, open the TSS context,
//! issue `Startup` if needed, and cache the capability queries that
//! downstream components consult repeatedly (supported algorithms,
//! supported commands, implemented PCR banks).

#![cfg(feature = "hardware-tpm")]

use crate::device;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;
use tpmseal_pcr::HashAlg;
use tss_esapi::constants::CapabilityType;
use tss_esapi::structures::CapabilityData;
use tss_esapi::tcti_ldr::{DeviceConfig, TctiNameConf};
use tss_esapi::Context as EsysContext;

const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// What the chip told us it supports, queried once at startup and
/// reused for the lifetime of the process (spec: capability cache).
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub algorithms: Vec<String>,
    pub commands: Vec<u32>,
    pub pcr_banks: Vec<HashAlg>,
}

impl Capabilities {
    pub fn supports_algorithm(&self, name: &str) -> bool {
        self.algorithms.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn supports_command(&self, command_code: u32) -> bool {
        self.commands.contains(&command_code)
    }

    pub fn supports_bank(&self, bank: HashAlg) -> bool {
        self.pcr_banks.contains(&bank)
    }
}

/// An open, started, capability-probed transport to a TPM.
pub struct Context {
    esys: Rc<RefCell<EsysContext>>,
    capabilities: Capabilities,
}

fn tcti_for_spec(spec: &device::DeviceSpec) -> tpmseal_core::Result<TctiNameConf> {
    match spec.driver.as_str() {
        "device" => Ok(TctiNameConf::Device(DeviceConfig::from_str_params(&spec.param).map_err(
            |e| tpmseal_core::Error::UnavailableTransport(format!("invalid device path: {e}")),
        )?)),
        "mssim" | "swtpm" => {
            let conf = format!("mssim:{}", spec.param);
            TctiNameConf::from_str(&conf)
                .map_err(|e| tpmseal_core::Error::UnavailableTransport(format!("invalid simulator spec: {e}")))
        }
        other => Err(tpmseal_core::Error::UnavailableTransport(format!(
            "unsupported transport driver '{other}'"
        ))),
    }
}

/// Read paginated `GetCapability(Algorithms)` results into a flat list
/// of supported algorithm names.
fn query_algorithms(ctx: &mut EsysContext) -> tpmseal_core::Result<Vec<String>> {
    let mut out = Vec::new();
    let mut property = 0u32;
    loop {
        let (data, more) = ctx
            .get_capability(CapabilityType::Algorithms, property, 128)
            .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("GetCapability(Algorithms): {e}")))?;
        let CapabilityData::Algorithms(list) = data else {
            return Err(tpmseal_core::Error::Unrecoverable(
                "GetCapability(Algorithms) returned the wrong capability variant".to_string(),
            ));
        };
        if list.is_empty() {
            break;
        }
        for entry in list.iter() {
            out.push(format!("{:?}", entry.algorithm_id()));
            property = u32::from(entry.algorithm_id()) + 1;
        }
        if !more {
            break;
        }
    }
    Ok(out)
}

/// Read paginated `GetCapability(Commands)` results into a flat list of
/// supported command codes.
fn query_commands(ctx: &mut EsysContext) -> tpmseal_core::Result<Vec<u32>> {
    let mut out = Vec::new();
    let mut property = 0u32;
    loop {
        let (data, more) = ctx
            .get_capability(CapabilityType::Command, property, 128)
            .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("GetCapability(Commands): {e}")))?;
        let CapabilityData::Command(list) = data else {
            return Err(tpmseal_core::Error::Unrecoverable(
                "GetCapability(Commands) returned the wrong capability variant".to_string(),
            ));
        };
        if list.is_empty() {
            break;
        }
        for entry in list.iter() {
            let code = entry.command_code();
            out.push(code);
            property = code + 1;
        }
        if !more {
            break;
        }
    }
    Ok(out)
}

fn query_pcr_banks(ctx: &mut EsysContext) -> tpmseal_core::Result<Vec<HashAlg>> {
    let (data, _) = ctx
        .get_capability(CapabilityType::AssignedPcr, 0, 1)
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("GetCapability(AssignedPcr): {e}")))?;
    let CapabilityData::AssignedPcr(selection_list) = data else {
        return Err(tpmseal_core::Error::Unrecoverable(
            "GetCapability(AssignedPcr) returned the wrong capability variant".to_string(),
        ));
    };
    let mut banks = Vec::new();
    for selection in selection_list.get_selections() {
        if let Some(bank) = map_hashing_algorithm(selection.hashing_algorithm()) {
            banks.push(bank);
        }
    }
    Ok(banks)
}

fn map_hashing_algorithm(
    alg: tss_esapi::interface_types::algorithm::HashingAlgorithm,
) -> Option<HashAlg> {
    use tss_esapi::interface_types::algorithm::HashingAlgorithm as H;
    match alg {
        H::Sha1 => Some(HashAlg::Sha1),
        H::Sha256 => Some(HashAlg::Sha256),
        H::Sha384 => Some(HashAlg::Sha384),
        H::Sha512 => Some(HashAlg::Sha512),
        _ => None,
    }
}

impl Context {
    /// Resolve the device spec (explicit override, environment
    /// variable, configured default, or automatic sysfs discovery, in
    /// that order), open the transport, run `Startup(CLEAR)` if the
    /// chip reports it has not yet been started, and populate the
    /// capability cache. Fails with `Unrecoverable` if AES-128-CFB
    /// parameter encryption is not among the reported algorithms, since
    /// every session this crate opens depends on it.
    pub fn open(config: &tpmseal_core::config::Config) -> tpmseal_core::Result<Self> {
        let spec_str = match config.resolve_device_spec() {
            Some(s) if !s.is_empty() => s,
            _ => {
                let device = device::select_unique_device(Path::new(DEFAULT_SYSFS_ROOT))?;
                format!("device:{}", device.device_path)
            }
        };

        let spec = device::parse(&spec_str)?;
        let tcti = tcti_for_spec(&spec)?;

        let mut esys = EsysContext::new(tcti)
            .map_err(|e| tpmseal_core::Error::UnavailableTransport(format!("opening TPM context: {e}")))?;

        // Startup is idempotent in practice: a TPM that is already
        // started answers TPM2_RC_INITIALIZE, which we treat as success.
        match esys.startup(tss_esapi::constants::StartupType::Clear) {
            Ok(()) => {}
            Err(e) if is_already_started(&e) => {}
            Err(e) => return Err(tpmseal_core::Error::UnavailableTransport(format!("TPM2_Startup failed: {e}"))),
        }

        let algorithms = query_algorithms(&mut esys)?;
        let commands = query_commands(&mut esys)?;
        let pcr_banks = query_pcr_banks(&mut esys)?;

        if !algorithms.iter().any(|a| a.eq_ignore_ascii_case("Aes") || a.eq_ignore_ascii_case("Cfb")) {
            return Err(tpmseal_core::Error::Unrecoverable(
                "TPM does not report AES/CFB support required for parameter encryption".to_string(),
            ));
        }

        Ok(Self {
            esys: Rc::new(RefCell::new(esys)),
            capabilities: Capabilities { algorithms, commands, pcr_banks },
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The shared, ref-counted handle to the underlying TSS context,
    /// for modules that need to issue commands directly.
    pub fn esys(&self) -> Rc<RefCell<EsysContext>> {
        self.esys.clone()
    }
}

fn is_already_started(error: &tss_esapi::Error) -> bool {
    format!("{error}").to_ascii_lowercase().contains("initialize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_lookup_is_case_insensitive() {
        let caps = Capabilities {
            algorithms: vec!["AES".to_string()],
            commands: vec![0x153],
            pcr_banks: vec![HashAlg::Sha256],
        };
        assert!(caps.supports_algorithm("aes"));
        assert!(caps.supports_command(0x153));
        assert!(caps.supports_bank(HashAlg::Sha256));
        assert!(!caps.supports_bank(HashAlg::Sha1));
    }
}
