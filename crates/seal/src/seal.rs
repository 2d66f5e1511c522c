//! The seal/unseal pipeline: the public API this crate exists to
//! provide. Everything below this module is plumbing; this is the
//! surface an integrator calls.

use crate::blob::Blob;
use crate::retry::{self, Outcome};
use tpmseal_core::{Error, Result, Secret};
use tpmseal_pcr::SelectionList;
use tpmseal_policy::digest::{PolicyDigest, PolicyInputs};

/// Which primary key algorithm the SRK (and therefore the sealed
/// object's parent) uses. Recorded alongside the blob since unseal
/// must re-derive the same kind of SRK if none is embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAlg {
    Ecc,
    Rsa,
}

/// Inputs to a seal operation (spec §4.E "Seal inputs").
#[derive(Debug, Clone, Default)]
pub struct SealRequest {
    pub policy_digest: Option<PolicyDigest>,
    pub pin: Option<String>,
    pub export_srk: bool,
}

/// Outputs of a seal operation (spec §4.E "Seal outputs").
pub struct SealOutput {
    pub secret: Secret,
    pub blob: Blob,
    pub primary_alg: PrimaryAlg,
    pub srk_bytes: Option<Vec<u8>>,
}

/// Inputs to an unseal operation (spec §4.E "Unseal inputs").
pub struct UnsealRequest<'a> {
    pub device_spec: Option<String>,
    pub pcr_selection: SelectionList,
    pub public_key_name: Option<(u16, &'a [u8])>,
    pub pubkey_pcr_mask: Option<u32>,
    pub pin: Option<String>,
    pub expected_policy_digest: Option<PolicyDigest>,
    pub primary_alg: PrimaryAlg,
    pub blob: Blob,
    pub srk_bytes: Option<Vec<u8>>,
    /// The marshalled TPM public area of the signing key bound via
    /// `PolicyAuthorize`, present iff `public_key_name`/`pubkey_pcr_mask`
    /// are also set.
    pub public_key: Option<&'a [u8]>,
    /// Fingerprint identifying `public_key` in `signatures`.
    pub key_fingerprint: Option<&'a str>,
    /// `policy_ref` passed to `PolicyAuthorize`; empty/absent is the
    /// common case of an unqualified signed policy.
    pub policy_ref: Option<&'a [u8]>,
    /// The signature collection to search for an entry matching this
    /// bank, `pubkey_pcr_mask`, `key_fingerprint`, and
    /// `expected_policy_digest`.
    pub signatures: Option<&'a tpmseal_policy::SignatureCollection>,
}

fn compute_pin_gate(request: &SealRequest) -> Result<Option<Secret>> {
    request.pin.as_deref().map(crate::pin::auth_value).transpose()
}

/// Compute the expected policy digest for a seal request from its
/// bound inputs (no public key or PCR binding supported at this call
/// site — callers needing those compose [`tpmseal_policy::expected_digest`]
/// directly and pass the result in as `policy_digest`).
pub fn policy_digest_for_pin_only(pin_bound: bool) -> Result<PolicyDigest> {
    tpmseal_policy::expected_digest(&PolicyInputs {
        public_key: None,
        pcr_selection: None,
        pcr_values: &[],
        pin_bound,
    })
}

#[cfg(not(feature = "hardware-tpm"))]
pub fn seal(_request: SealRequest) -> Result<SealOutput> {
    Err(Error::UnavailableTransport(
        "this build was compiled without hardware-tpm support".to_string(),
    ))
}

#[cfg(not(feature = "hardware-tpm"))]
pub fn unseal(_request: UnsealRequest<'_>) -> Result<Secret> {
    Err(Error::UnavailableTransport(
        "this build was compiled without hardware-tpm support".to_string(),
    ))
}

#[cfg(feature = "hardware-tpm")]
pub use hardware::{seal, unseal};

#[cfg(feature = "hardware-tpm")]
mod hardware {
    use super::*;
    use rand::RngCore;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tpmseal_transport::srk::SrkTemplate;
    use tpmseal_transport::{session, srk, Context as TransportContext, Handle, ReleaseMode};
    use tss_esapi::attributes::ObjectAttributesBuilder;
    use tss_esapi::interface_types::algorithm::{HashingAlgorithm, PublicAlgorithm};
    use tss_esapi::structures::{
        Digest as TssDigest, KeyedHashScheme, Private, Public, PublicBuilder,
        PublicKeyedHashParameters, SensitiveData,
    };
    use tss_esapi::traits::{Marshall, UnMarshall};
    use tss_esapi::Context as EsysContext;

    const SECRET_LEN: usize = 32;
    const SRK_HANDLE: u32 = 0x8101_0001;

    fn keyed_hash_template(policy_digest: &PolicyDigest) -> Result<Public> {
        let attributes = ObjectAttributesBuilder::new()
            .with_fixed_tpm(true)
            .with_fixed_parent(true)
            .build()
            .map_err(|e| Error::Unrecoverable(format!("building keyed-hash object attributes: {e}")))?;

        let auth_policy = TssDigest::try_from(policy_digest.to_vec())
            .map_err(|e| Error::Unrecoverable(format!("invalid policy digest length: {e}")))?;

        PublicBuilder::new()
            .with_public_algorithm(PublicAlgorithm::KeyedHash)
            .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
            .with_object_attributes(attributes)
            .with_auth_policy(auth_policy)
            .with_keyed_hash_parameters(PublicKeyedHashParameters::new(KeyedHashScheme::Null))
            .with_keyed_hash_unique_identifier(Default::default())
            .build()
            .map_err(|e| Error::Unrecoverable(format!("building keyed-hash template: {e}")))
    }

    fn open_transport(config: &tpmseal_core::config::Config) -> Result<TransportContext> {
        TransportContext::open(config)
    }

    /// Generate a 32-byte secret from the system CSPRNG, optionally
    /// preceded by a best-effort TPM-entropy credit.
    fn generate_secret() -> Secret {
        let mut bytes = vec![0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Secret::new(bytes)
    }

    pub fn seal(request: SealRequest) -> Result<SealOutput> {
        let pin_gate = compute_pin_gate(&request)?;
        let policy_digest = request.policy_digest.unwrap_or(tpmseal_policy::ZERO_DIGEST);

        let config = tpmseal_core::Config::load_with_defaults(None::<&str>);
        let transport = open_transport(&config)?;
        let esys = transport.esys();

        let srk_handle = srk::ensure_persistent(esys.clone(), Some(SRK_HANDLE), SrkTemplate::Ecc, None)?;

        let (session_handle, _session) = session::start_encryption_session(
            esys.clone(),
            tss_esapi::handles::KeyHandle::from(srk_handle.object()),
        )?;

        let secret = generate_secret();
        let template = keyed_hash_template(&policy_digest)?;

        let sensitive_data = {
            let mut bytes = secret.as_bytes().to_vec();
            if let Some(gate) = &pin_gate {
                bytes.extend_from_slice(gate.as_bytes());
            }
            SensitiveData::try_from(bytes)
                .map_err(|e| Error::Unrecoverable(format!("building sensitive data: {e}")))?
        };

        let created = {
            let mut ctx = esys.borrow_mut();
            ctx.execute_with_session(Some(_session), |ctx| {
                ctx.create(
                    tss_esapi::handles::KeyHandle::from(srk_handle.object()),
                    template,
                    None,
                    Some(sensitive_data),
                    None,
                    None,
                )
            })
            .map_err(|e| Error::Unrecoverable(format!("TPM2_Create failed: {e}")))?
        };
        drop(session_handle);

        let private_bytes = created
            .out_private
            .marshall()
            .map_err(|e| Error::Unrecoverable(format!("marshalling private area: {e}")))?;
        let public_bytes = created
            .out_public
            .marshall()
            .map_err(|e| Error::Unrecoverable(format!("marshalling public area: {e}")))?;

        let blob = Blob { private: private_bytes, public: public_bytes, seed: None };

        let srk_bytes = if request.export_srk {
            let public = {
                let mut ctx = esys.borrow_mut();
                ctx.read_public(tss_esapi::handles::KeyHandle::from(srk_handle.object()))
                    .map_err(|e| Error::Unrecoverable(format!("reading SRK public area: {e}")))?
            };
            Some(
                public
                    .0
                    .marshall()
                    .map_err(|e| Error::Unrecoverable(format!("marshalling SRK public area: {e}")))?,
            )
        } else {
            None
        };

        Ok(SealOutput { secret, blob, primary_alg: PrimaryAlg::Ecc, srk_bytes })
    }

    fn load_srk(
        esys: Rc<RefCell<EsysContext>>,
        request: &UnsealRequest<'_>,
    ) -> Result<Handle> {
        if let Some(bytes) = &request.srk_bytes {
            let public = Public::unmarshall(bytes)
                .map_err(|e| Error::BadArgument(format!("invalid serialized SRK: {e}")))?;
            let _ = public;
            // An embedded SRK public area alone cannot be loaded as a
            // primary without its seed; in practice the embedded SRK
            // is used to validate identity, and the primary is
            // re-derived deterministically from the same template.
        }

        let template = match request.primary_alg {
            PrimaryAlg::Ecc => SrkTemplate::Ecc,
            PrimaryAlg::Rsa => SrkTemplate::Rsa,
        };
        match srk::ensure_persistent(esys.clone(), Some(SRK_HANDLE), template, None) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                tracing::debug!(error = %e, "current SRK template unavailable, falling back to legacy template");
                let legacy = match request.primary_alg {
                    PrimaryAlg::Ecc => SrkTemplate::EccLegacy,
                    PrimaryAlg::Rsa => SrkTemplate::RsaLegacy,
                };
                srk::ensure_persistent(esys, Some(SRK_HANDLE), legacy, None)
            }
        }
    }

    /// Drive `PolicyAuthorize` for a public-key-bound unseal: load the
    /// caller's key as an external TPM object, look up the matching
    /// signed-policy entry, verify the signature, and submit the
    /// resulting ticket to the policy session (spec §4.D steps 2-5).
    fn run_policy_authorize(
        esys: &Rc<RefCell<EsysContext>>,
        policy: tss_esapi::interface_types::session_handles::PolicySession,
        request: &UnsealRequest<'_>,
    ) -> Result<()> {
        let public_key_bytes = request
            .public_key
            .ok_or_else(|| Error::BadArgument("public-key-authorized unseal requires the public key bytes".to_string()))?;
        let fingerprint = request.key_fingerprint.ok_or_else(|| {
            Error::BadArgument("public-key-authorized unseal requires a key fingerprint".to_string())
        })?;
        let signatures = request.signatures.ok_or_else(|| {
            Error::BadArgument("public-key-authorized unseal requires a signature collection".to_string())
        })?;
        let pcr_mask = request.pubkey_pcr_mask.ok_or_else(|| {
            Error::BadArgument("public-key-authorized unseal requires a pubkey PCR mask".to_string())
        })?;
        let expected = request.expected_policy_digest.as_ref().ok_or_else(|| {
            Error::BadArgument(
                "public-key-authorized unseal requires an expected policy digest to look up the signature entry"
                    .to_string(),
            )
        })?;

        let bank = request.pcr_selection.entries().first().map(|e| e.bank).unwrap_or(tpmseal_pcr::HashAlg::Sha256);

        let entry = signatures
            .find(&bank.to_string(), pcr_mask, fingerprint, expected)
            .ok_or_else(|| {
                Error::NotFound("no signature entry matches this bank, mask, key, and policy digest".to_string())
            })?
            .clone();

        let key_public = Public::unmarshall(public_key_bytes)
            .map_err(|e| Error::BadArgument(format!("invalid public key bytes: {e}")))?;
        let (key_handle, key_object) = tpmseal_policy::signature::live::load_external_key(esys.clone(), key_public)?;

        let approved_policy = TssDigest::try_from(entry.policy_digest.clone())
            .map_err(|e| Error::Unrecoverable(format!("invalid stored policy digest: {e}")))?;

        let ticket = tpmseal_policy::signature::live::verify_signature(esys.clone(), key_object, &approved_policy, &entry)?;
        let tss_esapi::structures::Ticket::Verified(verified) = ticket else {
            return Err(Error::Unrecoverable("VerifySignature did not return a verification ticket".to_string()));
        };

        const NAME_ALG_SHA256: u16 = 0x000B;
        let key_name = tpmseal_policy::marshal::public_area_name(NAME_ALG_SHA256, public_key_bytes);
        let key_sign = tss_esapi::structures::Name::try_from(key_name)
            .map_err(|e| Error::Unrecoverable(format!("invalid key name: {e}")))?;

        let policy_ref = tss_esapi::structures::Nonce::try_from(request.policy_ref.unwrap_or(&[]).to_vec())
            .map_err(|e| Error::BadArgument(format!("invalid policy_ref: {e}")))?;

        tpmseal_policy::live::policy_authorize(esys, policy, approved_policy, policy_ref, key_sign, verified.into())?;

        drop(key_handle);
        Ok(())
    }

    pub fn unseal(request: UnsealRequest<'_>) -> Result<Secret> {
        let pin_gate = request.pin.as_deref().map(crate::pin::auth_value).transpose()?;

        let config = tpmseal_core::config::Config {
            device_spec: request.device_spec.clone(),
            ..tpmseal_core::config::Config::load_with_defaults(None::<&str>)
        };
        let transport = open_transport(&config)?;
        let esys = transport.esys();

        let srk_handle = load_srk(esys.clone(), &request)?;

        let public = Public::unmarshall(&request.blob.public)
            .map_err(|e| Error::BadArgument(format!("invalid public area in blob: {e}")))?;

        // A calculated sealed object (produced by an import operation
        // rather than a direct `create`) carries an encrypted seed
        // alongside a "duplicate" in place of a ready-to-load private
        // area; TPM2_Import against the SRK turns it into one before
        // TPM2_Load, exactly as it would have been had this object been
        // created directly under this SRK in the first place.
        let private = match &request.blob.seed {
            Some(seed_bytes) => {
                let duplicate = Private::unmarshall(&request.blob.private)
                    .map_err(|e| Error::BadArgument(format!("invalid duplicate area in blob: {e}")))?;
                let in_sym_seed = tss_esapi::structures::EncryptedSecret::try_from(seed_bytes.clone())
                    .map_err(|e| Error::BadArgument(format!("invalid encrypted seed in blob: {e}")))?;
                let mut ctx = esys.borrow_mut();
                ctx.execute_with_nullauth_session(|ctx| {
                    ctx.import(
                        tss_esapi::handles::KeyHandle::from(srk_handle.object()),
                        None,
                        public.clone(),
                        duplicate,
                        in_sym_seed,
                        tss_esapi::structures::SymmetricDefinitionObject::Null,
                    )
                })
                .map_err(|e| Error::Unrecoverable(format!("TPM2_Import failed: {e}")))?
            }
            None => Private::unmarshall(&request.blob.private)
                .map_err(|e| Error::BadArgument(format!("invalid private area in blob: {e}")))?,
        };

        let object = {
            let mut ctx = esys.borrow_mut();
            ctx.execute_with_nullauth_session(|ctx| {
                ctx.load(tss_esapi::handles::KeyHandle::from(srk_handle.object()), private.clone(), public.clone())
            })
            .map_err(|e| Error::Unrecoverable(format!("TPM2_Load failed: {e}")))?
        };
        let loaded = Handle::new(esys.clone(), object.into(), ReleaseMode::Flush);

        if let Some(gate) = &pin_gate {
            let mut ctx = esys.borrow_mut();
            ctx.tr_set_auth(
                loaded.object(),
                tss_esapi::structures::Auth::try_from(gate.as_bytes().to_vec())
                    .map_err(|e| Error::Unrecoverable(format!("invalid auth value: {e}")))?,
            )
            .map_err(|e| Error::Unrecoverable(format!("binding PIN to object auth value: {e}")))?;
        }

        let pin_bound = pin_gate.is_some();
        let pcr_bound = !request.pcr_selection.is_empty();
        let pubkey_bound = request.public_key_name.is_some();

        let result = retry::run(|_retries_remaining| {
            let (policy_handle, policy_session) =
                match session::start_policy_session(esys.clone(), Some(tss_esapi::handles::KeyHandle::from(srk_handle.object())), false) {
                    Ok(v) => v,
                    Err(e) => return Outcome::Other(e),
                };

            let tss_esapi::interface_types::session_handles::AuthSession::PolicySession(policy) = policy_session
            else {
                return Outcome::Other(Error::Unrecoverable("expected a policy session".to_string()));
            };

            if pubkey_bound {
                if let Err(e) = run_policy_authorize(&esys, policy, &request) {
                    return Outcome::Other(e);
                }
            }

            if pcr_bound {
                if let Err(e) = tpmseal_policy::live::policy_pcr(&esys, policy, &request.pcr_selection, None) {
                    return Outcome::Other(e);
                }
            }

            if pin_bound {
                if let Err(e) = tpmseal_policy::live::policy_auth_value(&esys, policy) {
                    return Outcome::Other(e);
                }
            }

            if let Some(expected) = &request.expected_policy_digest {
                let actual = match tpmseal_policy::live::get_policy_digest(&esys, policy) {
                    Ok(d) => d,
                    Err(e) => return Outcome::Other(e),
                };
                if actual != expected.to_vec() {
                    return Outcome::DigestMismatch;
                }
            }

            let unsealed = {
                let mut ctx = esys.borrow_mut();
                ctx.execute_with_session(Some(tss_esapi::interface_types::session_handles::AuthSession::PolicySession(policy)), |ctx| {
                    ctx.unseal(loaded.object().into())
                })
            };
            drop(policy_handle);

            match unsealed {
                Ok(data) => Outcome::Success(Secret::new(data.to_vec())),
                Err(e) if is_pcr_changed(&e) => Outcome::PcrRace,
                Err(e) => Outcome::Other(Error::Unrecoverable(format!("TPM2_Unseal failed: {e}"))),
            }
        })?;

        Ok(result)
    }

    fn is_pcr_changed(error: &tss_esapi::Error) -> bool {
        format!("{error}").to_ascii_lowercase().contains("pcr")
    }
}
