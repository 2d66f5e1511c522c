//! Encryption sessions (parameter confidentiality/integrity) and policy
//! sessions (trial or real authorization).

#![cfg(feature = "hardware-tpm")]

use crate::handle::{Handle, ReleaseMode};
use std::cell::RefCell;
use std::rc::Rc;
use tss_esapi::attributes::SessionAttributesBuilder;
use tss_esapi::constants::SessionType;
use tss_esapi::handles::KeyHandle;
use tss_esapi::interface_types::algorithm::HashingAlgorithm;
use tss_esapi::interface_types::session_handles::AuthSession;
use tss_esapi::structures::SymmetricDefinition;
use tss_esapi::Context as EsysContext;

/// The parameter-encryption profile required after `open()` (spec §4.A
/// invariants): AES, 128-bit key, CFB mode.
pub fn required_symmetric_definition() -> SymmetricDefinition {
    SymmetricDefinition::Aes { key_bits: tss_esapi::interface_types::key_bits::AesKeyBits::Aes128, mode: tss_esapi::interface_types::algorithm::SymmetricMode::Cfb }
}

/// Start an HMAC session salted by `salt_key` (normally the SRK), with
/// AES-128-CFB parameter encryption enabled in both directions.
pub fn start_encryption_session(
    context: Rc<RefCell<EsysContext>>,
    salt_key: KeyHandle,
) -> tpmseal_core::Result<(Handle, AuthSession)> {
    let session = {
        let mut ctx = context.borrow_mut();
        ctx.start_auth_session(
            Some(salt_key),
            None,
            None,
            SessionType::Hmac,
            required_symmetric_definition(),
            HashingAlgorithm::Sha256,
        )
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("starting encryption session: {e}")))?
        .ok_or_else(|| tpmseal_core::Error::Unrecoverable("TPM returned no session handle".to_string()))?
    };

    {
        let mut ctx = context.borrow_mut();
        let (attrs, mask) = SessionAttributesBuilder::new()
            .with_decrypt(true)
            .with_encrypt(true)
            .build();
        ctx.tr_sess_set_attributes(session, attrs, mask).map_err(|e| {
            tpmseal_core::Error::Unrecoverable(format!("setting session attributes: {e}"))
        })?;
    }

    let object = session.handle();
    let handle = Handle::new(context, object, ReleaseMode::Close);
    Ok((handle, session))
}

/// Start a policy session: trial (builds the digest without enforcing)
/// or real (enforces during authorization), salted by `salt_key` when
/// one is associated with the session. Follows the newer tpmKey-based
/// `start_auth_session` form per the resolved Open Question (salt the
/// session with the primary handle rather than `ESYS_TR_NONE`).
pub fn start_policy_session(
    context: Rc<RefCell<EsysContext>>,
    salt_key: Option<KeyHandle>,
    trial: bool,
) -> tpmseal_core::Result<(Handle, AuthSession)> {
    let session_type = if trial { SessionType::Trial } else { SessionType::Policy };

    let session = {
        let mut ctx = context.borrow_mut();
        ctx.start_auth_session(
            salt_key,
            None,
            None,
            session_type,
            required_symmetric_definition(),
            HashingAlgorithm::Sha256,
        )
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("starting policy session: {e}")))?
        .ok_or_else(|| tpmseal_core::Error::Unrecoverable("TPM returned no session handle".to_string()))?
    };

    let object = session.handle();
    let handle = Handle::new(context, object, ReleaseMode::Close);
    Ok((handle, session))
}
