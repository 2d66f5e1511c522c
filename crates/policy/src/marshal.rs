//! TPM wire-format marshalling shared between the offline digest path
//! and the on-TPM trial-session path, so the two are byte-for-byte
//! identical by construction rather than by coincidence.
//!
//! TPM structures are big-endian throughout; this module never touches
//! host byte order implicitly.

use tpmseal_pcr::{HashAlg, SelectionList};

/// Command codes from the TPM 2.0 structures specification, part 2,
/// table "TPM_CC Constants". Only the three this engine issues.
pub const TPM2_CC_POLICY_AUTHORIZE: u32 = 0x0000_0116;
pub const TPM2_CC_POLICY_PCR: u32 = 0x0000_017F;
pub const TPM2_CC_POLICY_AUTH_VALUE: u32 = 0x0000_016B;

/// The TCG algorithm identifier for a hash bank, as it appears in a
/// `TPMS_PCR_SELECTION.hash` field.
pub fn alg_id(bank: HashAlg) -> u16 {
    match bank {
        HashAlg::Sha1 => 0x0004,
        HashAlg::Sha256 => 0x000B,
        HashAlg::Sha384 => 0x000C,
        HashAlg::Sha512 => 0x000D,
    }
}

pub fn marshal_u16(v: u16) -> [u8; 2] {
    v.to_be_bytes()
}

pub fn marshal_u32(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

pub fn marshal_command_code(cc: u32) -> Vec<u8> {
    marshal_u32(cc).to_vec()
}

/// `sizeofSelect` is the number of bytes needed to hold `MAX_PCR_INDEX + 1`
/// bits, rounded up; TPM implementations universally fix this at 3 for a
/// 24-PCR bank, which is what every `SelectionList` in this engine models.
const SIZEOF_SELECT: u8 = 3;

/// Marshal a `TPML_PCR_SELECTION`: a `u32` count followed by one
/// `TPMS_PCR_SELECTION` (hash alg `u16`, sizeofSelect `u8`, little-endian
/// bitmask of `sizeofSelect` bytes — the TPM spec fixes the *bitmask*
/// bytes themselves as little-endian even though everything else is
/// big-endian) per bank, in the order the selection list stores them.
pub fn marshal_pcr_selection_list(selection: &SelectionList) -> Vec<u8> {
    let normalized = SelectionList::normalize(selection.entries().iter().copied());
    let entries = normalized.entries();

    let mut out = Vec::with_capacity(4 + entries.len() * 6);
    out.extend_from_slice(&marshal_u32(entries.len() as u32));
    for entry in entries {
        out.extend_from_slice(&marshal_u16(alg_id(entry.bank)));
        out.push(SIZEOF_SELECT);
        let mask = entry.to_mask();
        out.push((mask & 0xFF) as u8);
        out.push(((mask >> 8) & 0xFF) as u8);
        out.push(((mask >> 16) & 0xFF) as u8);
    }
    out
}

/// The TPM "name" of a public area: `nameAlg || SHA-256(marshalled publicArea)`.
/// `name_alg` is the TCG algorithm id the object advertises as its name hash.
pub fn public_area_name(name_alg: u16, marshalled_public_area: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(marshalled_public_area);
    let mut out = Vec::with_capacity(2 + digest.len());
    out.extend_from_slice(&marshal_u16(name_alg));
    out.extend_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpmseal_pcr::Selection;

    #[test]
    fn command_code_marshals_big_endian() {
        assert_eq!(marshal_command_code(TPM2_CC_POLICY_AUTH_VALUE), vec![0x00, 0x00, 0x01, 0x6B]);
    }

    #[test]
    fn selection_list_marshal_matches_expected_shape() {
        let list = SelectionList::normalize([Selection::from_mask(0x0000_0081, HashAlg::Sha256)]); // PCRs 0 and 7
        let bytes = marshal_pcr_selection_list(&list);
        // count(4) + hash(2) + sizeofSelect(1) + mask(3)
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..6], &[0x00, 0x0B]);
        assert_eq!(bytes[6], 3);
        assert_eq!(&bytes[7..10], &[0x81, 0x00, 0x00]);
    }

    #[test]
    fn public_area_name_is_name_alg_then_sha256() {
        let name = public_area_name(0x000B, b"some public area bytes");
        assert_eq!(name.len(), 2 + 32);
        assert_eq!(&name[0..2], &[0x00, 0x0B]);
    }
}
