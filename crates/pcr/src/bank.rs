//! The bank quality heuristic used when a caller asks for "the best PCR
//! bank" instead of naming one explicitly.

use crate::hash::HashAlg;
use crate::selection::FULL_MASK;
use crate::value::PcrValue;
use tpmseal_core::{Error, Result};

/// A bank is *usable* iff it has at least 24 PCRs and all 24 bits are
/// enabled in its allocation mask.
pub fn is_usable(pcr_count: u32, allocated_mask: u32) -> bool {
    pcr_count >= 24 && allocated_mask & FULL_MASK == FULL_MASK
}

/// A bank is *good* iff usable and at least one of the sampled PCR
/// digests is neither all-zero nor all-0xFF.
pub fn is_good(usable: bool, sampled_values: &[PcrValue]) -> bool {
    usable && sampled_values.iter().any(|v| !v.is_boring_digest())
}

/// Observed status of one candidate bank.
#[derive(Debug, Clone, Copy)]
pub struct BankStatus {
    pub bank: HashAlg,
    pub usable: bool,
    pub good: bool,
}

/// Result of automatic bank selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankChoice {
    pub bank: HashAlg,
    /// True if this choice is a fallback that warrants the visible
    /// "reduces the security level substantially" warning.
    pub reduced_security: bool,
}

/// Pick a bank for automatic PCR binding, in preference order:
/// SHA-256 good > SHA-1 good > SHA-256 usable > SHA-1 usable.
///
/// Logs a warning at each fallback tier, and fails with `Unsupported` if
/// no SHA-1/SHA-256 bank qualifies at all.
pub fn select_bank(statuses: &[BankStatus]) -> Result<BankChoice> {
    let find = |bank: HashAlg, good_only: bool| {
        statuses
            .iter()
            .find(|s| s.bank == bank && (if good_only { s.good } else { s.usable }))
    };

    if let Some(s) = find(HashAlg::Sha256, true) {
        return Ok(BankChoice { bank: s.bank, reduced_security: false });
    }
    if let Some(s) = find(HashAlg::Sha1, true) {
        tracing::warn!(
            "falling back to the SHA-1 PCR bank (no good SHA-256 bank found); \
             this reduces the security level substantially"
        );
        return Ok(BankChoice { bank: s.bank, reduced_security: true });
    }
    if let Some(s) = find(HashAlg::Sha256, false) {
        tracing::warn!(
            "no PCR bank has a non-trivial measurement; binding to SHA-256 anyway; \
             this reduces the security level substantially"
        );
        return Ok(BankChoice { bank: s.bank, reduced_security: true });
    }
    if let Some(s) = find(HashAlg::Sha1, false) {
        tracing::warn!(
            "falling back to an unvalidated SHA-1 PCR bank; \
             this reduces the security level substantially"
        );
        return Ok(BankChoice { bank: s.bank, reduced_security: true });
    }

    Err(Error::Unsupported(
        "no SHA-1 or SHA-256 PCR bank qualifies for sealing".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boring(bank: HashAlg, index: u8) -> PcrValue {
        PcrValue { bank, index, digest: Some(vec![0u8; bank.digest_size()]) }
    }

    fn interesting(bank: HashAlg, index: u8) -> PcrValue {
        let mut d = vec![0u8; bank.digest_size()];
        d[0] = 0x42;
        PcrValue { bank, index, digest: Some(d) }
    }

    #[test]
    fn usable_requires_full_mask_and_24_pcrs() {
        assert!(is_usable(24, FULL_MASK));
        assert!(!is_usable(23, FULL_MASK));
        assert!(!is_usable(24, FULL_MASK >> 1));
    }

    #[test]
    fn good_requires_usable_and_a_non_boring_digest() {
        assert!(is_good(true, &[interesting(HashAlg::Sha256, 7)]));
        assert!(!is_good(true, &[boring(HashAlg::Sha256, 7)]));
        assert!(!is_good(false, &[interesting(HashAlg::Sha256, 7)]));
    }

    #[test]
    fn prefers_sha256_good_over_everything_else() {
        let statuses = [
            BankStatus { bank: HashAlg::Sha1, usable: true, good: true },
            BankStatus { bank: HashAlg::Sha256, usable: true, good: true },
        ];
        let choice = select_bank(&statuses).unwrap();
        assert_eq!(choice, BankChoice { bank: HashAlg::Sha256, reduced_security: false });
    }

    #[test]
    fn falls_back_to_sha1_good_with_warning() {
        let statuses = [
            BankStatus { bank: HashAlg::Sha256, usable: true, good: false },
            BankStatus { bank: HashAlg::Sha1, usable: true, good: true },
        ];
        let choice = select_bank(&statuses).unwrap();
        assert_eq!(choice, BankChoice { bank: HashAlg::Sha1, reduced_security: true });
    }

    #[test]
    fn falls_back_to_sha256_usable_when_nothing_is_good() {
        let statuses = [BankStatus { bank: HashAlg::Sha256, usable: true, good: false }];
        let choice = select_bank(&statuses).unwrap();
        assert_eq!(choice, BankChoice { bank: HashAlg::Sha256, reduced_security: true });
    }

    #[test]
    fn fails_when_no_bank_qualifies() {
        let statuses = [BankStatus { bank: HashAlg::Sha384, usable: true, good: true }];
        assert!(select_bank(&statuses).is_err());
    }
}
