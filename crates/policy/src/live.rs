//! Driving the same three policy operations inside a live (or trial)
//! TPM policy session, so [`crate::digest`]'s offline computation can
//! be asserted equal to what the chip itself produces.

#![cfg(feature = "hardware-tpm")]

use std::cell::RefCell;
use std::rc::Rc;
use tpmseal_pcr::SelectionList;
use tss_esapi::handles::ObjectHandle;
use tss_esapi::interface_types::session_handles::PolicySession;
use tss_esapi::structures::{Digest as TssDigest, PcrSelectionList};
use tss_esapi::Context as EsysContext;

fn to_tss_selection_list(selection: &SelectionList) -> tpmseal_core::Result<PcrSelectionList> {
    use tss_esapi::interface_types::algorithm::HashingAlgorithm;
    use tss_esapi::structures::PcrSelectionListBuilder;
    use tss_esapi::structures::PcrSlot;

    let mut builder = PcrSelectionListBuilder::new();
    for entry in selection.entries() {
        let alg = match entry.bank {
            tpmseal_pcr::HashAlg::Sha1 => HashingAlgorithm::Sha1,
            tpmseal_pcr::HashAlg::Sha256 => HashingAlgorithm::Sha256,
            tpmseal_pcr::HashAlg::Sha384 => HashingAlgorithm::Sha384,
            tpmseal_pcr::HashAlg::Sha512 => HashingAlgorithm::Sha512,
        };
        let slots: Vec<PcrSlot> = (0..=tpmseal_pcr::MAX_PCR_INDEX)
            .filter(|i| entry.is_set(*i))
            .filter_map(pcr_slot_for_index)
            .collect();
        builder = builder.with_selection(alg, &slots);
    }
    builder
        .build()
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("building TSS PCR selection: {e}")))
}

fn pcr_slot_for_index(index: u8) -> Option<tss_esapi::structures::PcrSlot> {
    use tss_esapi::structures::PcrSlot::*;
    Some(match index {
        0 => Slot0,
        1 => Slot1,
        2 => Slot2,
        3 => Slot3,
        4 => Slot4,
        5 => Slot5,
        6 => Slot6,
        7 => Slot7,
        8 => Slot8,
        9 => Slot9,
        10 => Slot10,
        11 => Slot11,
        12 => Slot12,
        13 => Slot13,
        14 => Slot14,
        15 => Slot15,
        16 => Slot16,
        17 => Slot17,
        18 => Slot18,
        19 => Slot19,
        20 => Slot20,
        21 => Slot21,
        22 => Slot22,
        23 => Slot23,
        _ => return None,
    })
}

/// Run `PolicyAuthValue` in the given policy session.
pub fn policy_auth_value(
    context: &Rc<RefCell<EsysContext>>,
    session: PolicySession,
) -> tpmseal_core::Result<()> {
    let mut ctx = context.borrow_mut();
    ctx.policy_auth_value(session)
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("PolicyAuthValue failed: {e}")))
}

/// Run `PolicyPCR` in the given policy session over `selection`.
///
/// Passing `expected` as `None` asks the TPM to read current PCR
/// values itself; passing `Some` pins the policy to specific values
/// (used when re-deriving a policy against recorded PCR state rather
/// than the live platform).
pub fn policy_pcr(
    context: &Rc<RefCell<EsysContext>>,
    session: PolicySession,
    selection: &SelectionList,
    expected: Option<TssDigest>,
) -> tpmseal_core::Result<()> {
    let tss_selection = to_tss_selection_list(selection)?;
    let mut ctx = context.borrow_mut();
    ctx.policy_pcr(session, expected.unwrap_or_default(), tss_selection)
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("PolicyPCR failed: {e}")))
}

/// Run `PolicyAuthorize` in the given policy session against a
/// previously-loaded external key object and a verification ticket
/// (null on enrollment, per spec step 5).
pub fn policy_authorize(
    context: &Rc<RefCell<EsysContext>>,
    session: PolicySession,
    approved_policy: TssDigest,
    policy_ref: tss_esapi::structures::Nonce,
    key_sign: tss_esapi::structures::Name,
    ticket: tss_esapi::tss2_esys::TPMT_TK_VERIFIED,
) -> tpmseal_core::Result<()> {
    let mut ctx = context.borrow_mut();
    ctx.policy_authorize(session, approved_policy, policy_ref, &key_sign, ticket.into())
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("PolicyAuthorize failed: {e}")))
}

/// Read back the digest a policy session has accumulated so far, for
/// comparison against [`crate::digest::expected_digest`].
pub fn get_policy_digest(
    context: &Rc<RefCell<EsysContext>>,
    session: PolicySession,
) -> tpmseal_core::Result<Vec<u8>> {
    let mut ctx = context.borrow_mut();
    let digest = ctx
        .policy_get_digest(session)
        .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("PolicyGetDigest failed: {e}")))?;
    Ok(digest.to_vec())
}

/// A loaded external object handle paired with its released-on-drop
/// guard, used when loading a caller's public key for `PolicyAuthorize`.
pub struct ExternalKey {
    pub handle: tpmseal_transport::Handle,
    pub object: ObjectHandle,
}
