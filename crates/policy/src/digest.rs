//! Offline computation of the authorization policy digest. Every
//! function here is pure — no TPM, no I/O — so a caller can precompute
//! and store the expected digest alongside a sealed blob, and so tests
//! can assert byte-for-byte agreement with the on-TPM trial-session
//! path in [`crate::live`].

use crate::marshal::{
    marshal_command_code, marshal_pcr_selection_list, public_area_name, TPM2_CC_POLICY_AUTHORIZE,
    TPM2_CC_POLICY_AUTH_VALUE, TPM2_CC_POLICY_PCR,
};
use sha2::{Digest as _, Sha256};
use tpmseal_core::{Error, Result};
use tpmseal_pcr::{value::sort, PcrValue, SelectionList};

pub type PolicyDigest = [u8; 32];

pub const ZERO_DIGEST: PolicyDigest = [0u8; 32];

fn extend(digest: &PolicyDigest, data: &[u8]) -> PolicyDigest {
    let mut hasher = Sha256::new();
    hasher.update(digest);
    hasher.update(data);
    hasher.finalize().into()
}

fn rehash(digest: &PolicyDigest) -> PolicyDigest {
    Sha256::digest(digest).into()
}

/// `PolicyAuthValue(digest) -> digest'`: extends `digest` with the
/// marshalled command code, no further arguments.
pub fn policy_auth_value(digest: &PolicyDigest) -> PolicyDigest {
    extend(digest, &marshal_command_code(TPM2_CC_POLICY_AUTH_VALUE))
}

/// `PolicyPCR(pcr_values) -> digest'`. `pcr_values` must already be
/// sorted and valid (see [`tpmseal_pcr::value::valid`]) and every entry
/// must carry a concrete digest — a value with `digest: None` has
/// nothing to hash and is a caller bug, not a recoverable input error
/// at this layer (the seal/unseal pipeline is responsible for reading
/// concrete values before calling here).
pub fn policy_pcr(
    digest: &PolicyDigest,
    selection: &SelectionList,
    pcr_values: &[PcrValue],
) -> Result<PolicyDigest> {
    let mut concatenated = Vec::new();
    for value in pcr_values {
        let bytes = value.digest.as_ref().ok_or_else(|| {
            Error::BadArgument(format!(
                "PolicyPCR requires a concrete digest for PCR {}:{}",
                value.index, value.bank
            ))
        })?;
        concatenated.extend_from_slice(bytes);
    }
    let values_hash = Sha256::digest(&concatenated);

    let mut args = marshal_command_code(TPM2_CC_POLICY_PCR);
    args.extend_from_slice(&marshal_pcr_selection_list(selection));
    args.extend_from_slice(&values_hash);

    Ok(extend(digest, &args))
}

/// `PolicyAuthorize(public_key, policy_ref) -> digest'`. Resets the
/// running digest (the incoming value is ignored, matching the TPM's
/// own `PolicyAuthorize` semantics, which always starts from zero).
pub fn policy_authorize(
    name_alg: u16,
    marshalled_public_area: &[u8],
    policy_ref: Option<&[u8]>,
) -> PolicyDigest {
    let name = public_area_name(name_alg, marshalled_public_area);
    let mut args = marshal_command_code(TPM2_CC_POLICY_AUTHORIZE);
    args.extend_from_slice(&name);
    let after_name = extend(&ZERO_DIGEST, &args);

    match policy_ref {
        Some(policy_ref) if !policy_ref.is_empty() => extend(&after_name, policy_ref),
        _ => rehash(&after_name),
    }
}

/// The inputs that can be bound into a sealing policy. Absent fields
/// are simply skipped in the composition.
pub struct PolicyInputs<'a> {
    pub public_key: Option<(u16, &'a [u8], Option<&'a [u8]>)>,
    pub pcr_selection: Option<&'a SelectionList>,
    pub pcr_values: &'a [PcrValue],
    pub pin_bound: bool,
}

/// Compose the sealing policy in the fixed order: PolicyAuthorize (if a
/// public key is bound) → PolicyPCR (if any PCRs are bound) →
/// PolicyAuthValue (if a PIN is set). An input with nothing bound at
/// all yields the zero digest, matching "no policy" objects.
pub fn expected_digest(inputs: &PolicyInputs) -> Result<PolicyDigest> {
    let mut digest = ZERO_DIGEST;
    let mut touched = false;

    if let Some((name_alg, public_area, policy_ref)) = inputs.public_key {
        digest = policy_authorize(name_alg, public_area, policy_ref);
        touched = true;
    }

    if let Some(selection) = inputs.pcr_selection {
        if !selection.is_empty() {
            let mut values = inputs.pcr_values.to_vec();
            sort(&mut values);
            digest = policy_pcr(&digest, selection, &values)?;
            touched = true;
        }
    }

    if inputs.pin_bound {
        digest = policy_auth_value(&digest);
        touched = true;
    }

    if touched {
        Ok(digest)
    } else {
        Ok(ZERO_DIGEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpmseal_pcr::{HashAlg, Selection};

    #[test]
    fn no_inputs_yields_zero_digest() {
        let inputs = PolicyInputs {
            public_key: None,
            pcr_selection: None,
            pcr_values: &[],
            pin_bound: false,
        };
        assert_eq!(expected_digest(&inputs).unwrap(), ZERO_DIGEST);
    }

    #[test]
    fn pin_only_applies_policy_auth_value_to_zero_digest() {
        let inputs =
            PolicyInputs { public_key: None, pcr_selection: None, pcr_values: &[], pin_bound: true };
        let digest = expected_digest(&inputs).unwrap();
        assert_eq!(digest, policy_auth_value(&ZERO_DIGEST));
        assert_ne!(digest, ZERO_DIGEST);
    }

    #[test]
    fn pcr_only_hashes_the_selection_and_concatenated_values() {
        let selection = SelectionList::normalize([Selection::from_mask(1 << 7, HashAlg::Sha256)]);
        let value = PcrValue::new(HashAlg::Sha256, 7, Some(vec![0u8; 32])).unwrap();
        let inputs = PolicyInputs {
            public_key: None,
            pcr_selection: Some(&selection),
            pcr_values: &[value],
            pin_bound: false,
        };
        let digest = expected_digest(&inputs).unwrap();
        assert_eq!(digest, policy_pcr(&ZERO_DIGEST, &selection, &[PcrValue::new(HashAlg::Sha256, 7, Some(vec![0u8; 32])).unwrap()]).unwrap());
    }

    #[test]
    fn composition_order_is_authorize_then_pcr_then_auth_value() {
        let selection = SelectionList::normalize([Selection::from_mask(1, HashAlg::Sha256)]);
        let value = PcrValue::new(HashAlg::Sha256, 0, Some(vec![1u8; 32])).unwrap();
        let public_area = b"fake public area bytes";

        let inputs = PolicyInputs {
            public_key: Some((0x000B, public_area, None)),
            pcr_selection: Some(&selection),
            pcr_values: &[value.clone()],
            pin_bound: true,
        };
        let digest = expected_digest(&inputs).unwrap();

        let mut expected = policy_authorize(0x000B, public_area, None);
        expected = policy_pcr(&expected, &selection, &[value]).unwrap();
        expected = policy_auth_value(&expected);

        assert_eq!(digest, expected);
    }

    #[test]
    fn policy_authorize_rehashes_when_policy_ref_absent_vs_extends_when_present() {
        let public_area = b"key bytes";
        let without_ref = policy_authorize(0x000B, public_area, None);
        let with_empty_ref = policy_authorize(0x000B, public_area, Some(&[]));
        let with_ref = policy_authorize(0x000B, public_area, Some(b"ref"));
        assert_eq!(without_ref, with_empty_ref);
        assert_ne!(without_ref, with_ref);
    }

    #[test]
    fn policy_pcr_requires_concrete_digests() {
        let selection = SelectionList::normalize([Selection::from_mask(1, HashAlg::Sha256)]);
        let value = PcrValue { bank: HashAlg::Sha256, index: 0, digest: None };
        assert!(policy_pcr(&ZERO_DIGEST, &selection, &[value]).is_err());
    }
}
