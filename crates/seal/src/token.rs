//! The LUKS2 JSON token shape: the boundary contract this engine's
//! integrators (a keyslot layer, a CLI) serialize to and from. Every
//! field name here is part of an on-disk format and must not be
//! renamed casually.

use serde::{Deserialize, Serialize};

fn is_false(b: &bool) -> bool {
    !*b
}

/// A `systemd-tpm2` LUKS2 token. Optional fields are only written when
/// present, matching the boundary contract's "optional" fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tpm2Token {
    #[serde(rename = "type")]
    pub token_type: String,
    pub keyslots: Vec<String>,
    #[serde(rename = "tpm2-blob")]
    pub blob_base64: String,
    #[serde(rename = "tpm2-pcrs")]
    pub pcrs: Vec<u8>,
    #[serde(rename = "tpm2-policy-hash")]
    pub policy_hash_hex: String,
    #[serde(rename = "tpm2-pcr-bank", skip_serializing_if = "Option::is_none")]
    pub pcr_bank: Option<String>,
    #[serde(rename = "tpm2-primary-alg", skip_serializing_if = "Option::is_none")]
    pub primary_alg: Option<String>,
    #[serde(rename = "tpm2-pin", default, skip_serializing_if = "is_false")]
    pub pin: bool,
    #[serde(rename = "tpm2_pubkey_pcrs", skip_serializing_if = "Option::is_none")]
    pub pubkey_pcrs: Option<Vec<u8>>,
    #[serde(rename = "tpm2_pubkey", skip_serializing_if = "Option::is_none")]
    pub pubkey_base64: Option<String>,
    #[serde(rename = "tpm2_salt", skip_serializing_if = "Option::is_none")]
    pub salt_base64: Option<String>,
    #[serde(rename = "tpm2_srk", skip_serializing_if = "Option::is_none")]
    pub srk_base64: Option<String>,
}

pub const TOKEN_TYPE: &str = "systemd-tpm2";

impl Tpm2Token {
    pub fn to_json(&self) -> tpmseal_core::Result<String> {
        serde_json::to_string(self).map_err(tpmseal_core::Error::Serialization)
    }

    pub fn from_json(s: &str) -> tpmseal_core::Result<Self> {
        serde_json::from_str(s).map_err(tpmseal_core::Error::Serialization)
    }
}
