//! Signed-policy verification glue: loading a caller's public key as an
//! external TPM object, searching a signature collection for a matching
//! entry, and driving the verify-and-authorize handshake.

use serde::{Deserialize, Serialize};
use tpmseal_core::{Error, Result};

/// One signed-policy entry, keyed by the triple the lookup needs: which
/// PCR mask it was computed over, which key signed it, and the
/// resulting policy digest. Mirrors the external signature file shape
/// from the boundary contract (§6 `SignedPolicy` entries).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedPolicyEntry {
    pub pcr_mask: u32,
    pub key_fingerprint: String,
    #[serde(with = "hex_bytes")]
    pub policy_digest: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

/// A signature collection: a JSON object keyed by bank name, each value
/// an array of entries for that bank.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SignatureCollection(std::collections::BTreeMap<String, Vec<SignedPolicyEntry>>);

impl SignatureCollection {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(Error::Serialization)
    }

    /// Search for an entry matching `bank`, `pcr_mask`, `key_fingerprint`,
    /// and `policy_digest` exactly — all four must agree, since a
    /// signature is only valid for the precise policy it was produced
    /// against.
    pub fn find(
        &self,
        bank: &str,
        pcr_mask: u32,
        key_fingerprint: &str,
        policy_digest: &[u8],
    ) -> Option<&SignedPolicyEntry> {
        self.0.get(bank)?.iter().find(|e| {
            e.pcr_mask == pcr_mask && e.key_fingerprint == key_fingerprint && e.policy_digest == policy_digest
        })
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "hardware-tpm")]
pub mod live {
    //! Loading an external public key and completing the verify/ticket
    //! handshake against a live TPM. Feature-gated because it is the
    //! one part of signed-policy verification that genuinely requires
    //! a chip.

    use super::SignedPolicyEntry;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tpmseal_transport::{Handle, ReleaseMode};
    use tss_esapi::handles::ObjectHandle;
    use tss_esapi::interface_types::resource_handles::Hierarchy;
    use tss_esapi::structures::{Digest, Public, Signature};
    use tss_esapi::Context as EsysContext;

    /// Load `public` as an external key under the null hierarchy.
    pub fn load_external_key(
        context: Rc<RefCell<EsysContext>>,
        public: Public,
    ) -> tpmseal_core::Result<(Handle, ObjectHandle)> {
        let object = {
            let mut ctx = context.borrow_mut();
            ctx.execute_with_nullauth_session(|ctx| ctx.load_external_public(public, Hierarchy::Null))
                .map_err(|e| tpmseal_core::Error::Unrecoverable(format!("loading external key: {e}")))?
        };
        let handle = Handle::new(context, object.into(), ReleaseMode::Flush);
        Ok((handle, object.into()))
    }

    /// Ask the TPM to verify `entry.signature` over `approved_policy`
    /// using the loaded key, returning the verification ticket required
    /// by `PolicyAuthorize`.
    pub fn verify_signature(
        context: Rc<RefCell<EsysContext>>,
        key: ObjectHandle,
        approved_policy: &Digest,
        entry: &SignedPolicyEntry,
    ) -> tpmseal_core::Result<tss_esapi::structures::Ticket> {
        let signature = Signature::RsaSsa(
            tss_esapi::structures::RsaSignature::create(
                tss_esapi::interface_types::algorithm::HashingAlgorithm::Sha256,
                tss_esapi::structures::PublicKeyRsa::try_from(entry.signature.clone())
                    .map_err(|e| tpmseal_core::Error::BadArgument(format!("invalid signature bytes: {e}")))?,
            )
            .map_err(|e| tpmseal_core::Error::BadArgument(format!("invalid signature shape: {e}")))?,
        );

        let mut ctx = context.borrow_mut();
        ctx.verify_signature(key, approved_policy.clone(), signature)
            .map_err(|_| {
                tpmseal_core::Error::Denied("signature did not verify against the approved policy".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_requires_all_four_fields_to_match() {
        let mut collection = SignatureCollection::default();
        collection.0.insert(
            "sha256".to_string(),
            vec![SignedPolicyEntry {
                pcr_mask: 0x81,
                key_fingerprint: "abc123".to_string(),
                policy_digest: vec![0u8; 32],
                signature: vec![0xFF],
            }],
        );

        assert!(collection.find("sha256", 0x81, "abc123", &[0u8; 32]).is_some());
        assert!(collection.find("sha256", 0x82, "abc123", &[0u8; 32]).is_none());
        assert!(collection.find("sha1", 0x81, "abc123", &[0u8; 32]).is_none());
        assert!(collection.find("sha256", 0x81, "wrong", &[0u8; 32]).is_none());
    }

    #[test]
    fn hex_fields_round_trip_through_json() {
        let entry = SignedPolicyEntry {
            pcr_mask: 1,
            key_fingerprint: "fp".to_string(),
            policy_digest: vec![0xDE, 0xAD, 0xBE, 0xEF],
            signature: vec![0x01, 0x02],
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: SignedPolicyEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }
}
