//! Storage Root Key discovery and on-demand creation.
//!
//! The SRK lives at a persistent handle in the owner hierarchy's
//! persistent range (`0x81000000`..=`0x81FFFFFF`). If it is already
//! resident we load a reference to it; if not, we derive a fresh
//! primary under the template and evict it into place, tolerating the
//! race where another process wins the `evict_control` call first.

#![cfg(feature = "hardware-tpm")]

use crate::handle::{Handle, ReleaseMode};
use std::cell::RefCell;
use std::rc::Rc;
use tss_esapi::attributes::ObjectAttributesBuilder;
use tss_esapi::constants::tss::TPM2_RH_OWNER;
use tss_esapi::handles::{PersistentTpmHandle, TpmHandle};
use tss_esapi::interface_types::algorithm::{HashingAlgorithm, PublicAlgorithm};
use tss_esapi::interface_types::ecc::EccCurve;
use tss_esapi::interface_types::key_bits::{AesKeyBits, RsaKeyBits};
use tss_esapi::interface_types::resource_handles::Hierarchy;
use tss_esapi::structures::{
    Auth, EccScheme, PublicBuilder, PublicEccParametersBuilder, PublicRsaParametersBuilder,
    RsaExponent, SymmetricDefinitionObject,
};
use tss_esapi::Context as EsysContext;

/// The persistent handle range reserved for storage root keys in the
/// owner hierarchy (TCG registry, "Platform Hierarchy" range excluded).
pub const SRK_PERSISTENT_RANGE_START: u32 = 0x8100_0000;
pub const SRK_PERSISTENT_RANGE_END: u32 = 0x81FF_FFFF;

/// Which flavor of SRK primary to create: ECC is preferred (smaller,
/// faster key generation); RSA is the fallback for TPMs without ECC
/// support. "Legacy" templates exist so blobs sealed years ago against
/// an older, slightly different attribute set still unseal correctly;
/// they are never used when creating a *new* SRK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrkTemplate {
    Ecc,
    EccLegacy,
    Rsa,
    RsaLegacy,
}

fn symmetric_aes128_cfb() -> SymmetricDefinitionObject {
    SymmetricDefinitionObject::Aes { key_bits: AesKeyBits::Aes128, mode: tss_esapi::interface_types::algorithm::SymmetricMode::Cfb }
}

fn storage_object_attributes(legacy: bool) -> tpmseal_core::Result<tss_esapi::attributes::ObjectAttributes> {
    let mut builder = ObjectAttributesBuilder::new()
        .with_fixed_tpm(true)
        .with_fixed_parent(true)
        .with_sensitive_data_origin(true)
        .with_user_with_auth(true)
        .with_decrypt(true)
        .with_restricted(true);
    if legacy {
        // Older srk templates additionally set `with_st_clear(false)`
        // explicitly; current templates leave the default. Kept as a
        // distinct branch so the two profiles can diverge further
        // without entangling the current-template path.
        builder = builder.with_no_da(false);
    } else {
        builder = builder.with_no_da(true);
    }
    builder
        .build()
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("building SRK object attributes: {e}")))
}

fn ecc_public(legacy: bool) -> tpmseal_core::Result<tss_esapi::structures::Public> {
    let params = PublicEccParametersBuilder::new()
        .with_ecc_scheme(EccScheme::Null)
        .with_curve(EccCurve::NistP256)
        .with_is_signing_key(false)
        .with_is_decryption_key(true)
        .with_restricted(true)
        .with_symmetric(symmetric_aes128_cfb())
        .build()
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("building ECC SRK params: {e}")))?;

    PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::Ecc)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(storage_object_attributes(legacy)?)
        .with_ecc_parameters(params)
        .with_ecc_unique_identifier(Default::default())
        .build()
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("building ECC SRK public: {e}")))
}

fn rsa_public(legacy: bool) -> tpmseal_core::Result<tss_esapi::structures::Public> {
    let params = PublicRsaParametersBuilder::new()
        .with_scheme(tss_esapi::structures::RsaScheme::Null)
        .with_key_bits(RsaKeyBits::Rsa2048)
        .with_exponent(RsaExponent::default())
        .with_is_signing_key(false)
        .with_is_decryption_key(true)
        .with_restricted(true)
        .with_symmetric(symmetric_aes128_cfb())
        .build()
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("building RSA SRK params: {e}")))?;

    PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::Rsa)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(storage_object_attributes(legacy)?)
        .with_rsa_parameters(params)
        .with_rsa_unique_identifier(Default::default())
        .build()
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("building RSA SRK public: {e}")))
}

pub fn public_template(template: SrkTemplate) -> tpmseal_core::Result<tss_esapi::structures::Public> {
    match template {
        SrkTemplate::Ecc => ecc_public(false),
        SrkTemplate::EccLegacy => ecc_public(true),
        SrkTemplate::Rsa => rsa_public(false),
        SrkTemplate::RsaLegacy => rsa_public(true),
    }
}

/// Validate that a raw persistent handle value falls in the reserved
/// SRK range before attempting to address it.
pub fn validate_persistent_handle(raw: u32) -> tpmseal_core::Result<()> {
    if (SRK_PERSISTENT_RANGE_START..=SRK_PERSISTENT_RANGE_END).contains(&raw) {
        Ok(())
    } else {
        Err(tpmseal_core::Error::BadArgument(format!(
            "persistent handle {raw:#010x} is outside the SRK range {SRK_PERSISTENT_RANGE_START:#010x}..={SRK_PERSISTENT_RANGE_END:#010x}"
        )))
    }
}

/// Load a reference to an already-resident persistent SRK, if present.
fn try_load_persistent(
    context: &Rc<RefCell<EsysContext>>,
    raw_handle: u32,
) -> tpmseal_core::Result<Option<Handle>> {
    validate_persistent_handle(raw_handle)?;
    let persistent = PersistentTpmHandle::new(raw_handle)
        .map_err(|e| tpmseal_core::Error::BadArgument(format!("invalid persistent handle: {e}")))?;

    let mut ctx = context.borrow_mut();
    match ctx.tr_from_tpm_public(TpmHandle::Persistent(persistent)) {
        Ok(object) => {
            drop(ctx);
            Ok(Some(Handle::new(context.clone(), object, ReleaseMode::Close)))
        }
        Err(_) => Ok(None),
    }
}

/// Ensure an SRK is resident, either at a caller-requested persistent
/// handle or, when `requested_handle` is `None`, at the first available
/// slot in the SRK range.
///
/// If a specific location is requested, only that one is tried: an
/// existing object there is loaded and returned (spec: concurrent
/// enrollment must not corrupt state, and exactly one SRK occupies the
/// slot afterward), and a race that evicts another process's primary
/// into the slot first is tolerated by loading the winner instead of
/// failing. If no location is requested, slots are tried in order
/// starting at [`SRK_PERSISTENT_RANGE_START`]; a slot already occupied
/// by something else ("already defined") is skipped in favor of the
/// next one.
pub fn ensure_persistent(
    context: Rc<RefCell<EsysContext>>,
    requested_handle: Option<u32>,
    template: SrkTemplate,
    owner_auth: Option<Auth>,
) -> tpmseal_core::Result<Handle> {
    match requested_handle {
        Some(raw_handle) => ensure_persistent_at(&context, raw_handle, template, owner_auth, true),
        None => {
            let mut last_err = None;
            for raw_handle in SRK_PERSISTENT_RANGE_START..=SRK_PERSISTENT_RANGE_END {
                match ensure_persistent_at(&context, raw_handle, template, owner_auth.clone(), false) {
                    Ok(handle) => return Ok(handle),
                    Err(e) if is_already_defined(&e) => {
                        tracing::debug!(
                            handle = format!("{raw_handle:#010x}"),
                            "slot already defined, trying the next one"
                        );
                        last_err = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(last_err.unwrap_or_else(|| {
                tpmseal_core::Error::Unrecoverable(
                    "no free persistent handle slot found in the SRK range".to_string(),
                )
            }))
        }
    }
}

/// Derive a fresh SRK primary in volatile memory, then persist it at
/// `raw_handle`. `check_existing` distinguishes the two callers above:
/// a requested handle is first checked for an already-resident object
/// (and evict_control races load the winner), while an auto-picked slot
/// skips that preflight and instead surfaces "already defined" so the
/// caller can move on to the next candidate.
fn ensure_persistent_at(
    context: &Rc<RefCell<EsysContext>>,
    raw_handle: u32,
    template: SrkTemplate,
    owner_auth: Option<Auth>,
    check_existing: bool,
) -> tpmseal_core::Result<Handle> {
    if check_existing {
        if let Some(existing) = try_load_persistent(context, raw_handle)? {
            tracing::debug!(handle = format!("{raw_handle:#010x}"), "loaded existing SRK");
            return Ok(existing);
        }
    } else {
        validate_persistent_handle(raw_handle)?;
    }

    let public = public_template(template)?;
    let primary = {
        let mut ctx = context.borrow_mut();
        let owner_hierarchy = Hierarchy::Owner;
        ctx.execute_with_nullauth_session(|ctx| {
            ctx.create_primary(owner_hierarchy, public.clone(), owner_auth.clone(), None, None, None)
        })
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("deriving SRK primary: {e}")))?
    };

    let transient = Handle::new(context.clone(), primary.key_handle.into(), ReleaseMode::Flush);

    let persistent = PersistentTpmHandle::new(raw_handle)
        .map_err(|e| tpmseal_core::Error::BadArgument(format!("invalid persistent handle: {e}")))?;

    let evict_result = {
        let mut ctx = context.borrow_mut();
        ctx.execute_with_nullauth_session(|ctx| {
            ctx.evict_control(
                Hierarchy::Owner.into(),
                primary.key_handle.into(),
                tss_esapi::interface_types::dynamic_handles::Persistent::Persistent(persistent),
            )
        })
    };

    match evict_result {
        Ok(_) => {
            // `transient` was consumed by evict_control becoming the
            // persistent object; flushing it now would be a no-op at
            // best. Release without touching the TPM object itself.
            let _ = transient.release();
            try_load_persistent(context, raw_handle)?.ok_or_else(|| {
                tpmseal_core::Error::Unrecoverable(
                    "evict_control succeeded but persistent handle is not resolvable".to_string(),
                )
            })
        }
        Err(e) if check_existing => {
            tracing::debug!(error = %e, "evict_control lost the race for the SRK slot, loading the winner");
            drop(transient);
            try_load_persistent(context, raw_handle)?.ok_or_else(|| {
                tpmseal_core::Error::Unrecoverable(format!(
                    "evict_control failed and no SRK is resident at {raw_handle:#010x}: {e}"
                ))
            })
        }
        Err(e) => {
            drop(transient);
            Err(tpmseal_core::Error::Unrecoverable(format!(
                "evict_control failed at {raw_handle:#010x}: {e}"
            )))
        }
    }
}

/// True for the TPM's "this persistent handle already has an object at
/// it" response, the only evict_control failure the auto-pick allocator
/// treats as "try the next slot" rather than fatal.
fn is_already_defined(error: &tpmseal_core::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("already") || message.contains("defined") || message.contains("nv_defined")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_handles_inside_the_srk_range() {
        assert!(validate_persistent_handle(0x8101_0001).is_ok());
    }

    #[test]
    fn rejects_handles_outside_the_srk_range() {
        assert!(validate_persistent_handle(0x8000_0001).is_err());
        assert!(validate_persistent_handle(0x8200_0000).is_err());
    }
}
