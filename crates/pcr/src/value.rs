//! A single PCR reading: (bank, index, digest).

use crate::hash::HashAlg;

/// The maximum PCR index (TPM2 defines indices 0..23 inclusive).
pub const MAX_PCR_INDEX: u8 = 23;

/// One PCR reading.
///
/// `digest`, when present, must be exactly `bank.digest_size()` bytes —
/// callers building a `PcrValue` by hand (e.g. parsing a string token) are
/// expected to validate this with [`PcrValue::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrValue {
    pub bank: HashAlg,
    pub index: u8,
    pub digest: Option<Vec<u8>>,
}

impl PcrValue {
    pub fn new(bank: HashAlg, index: u8, digest: Option<Vec<u8>>) -> tpmseal_core::Result<Self> {
        let value = Self { bank, index, digest };
        value.validate()?;
        Ok(value)
    }

    /// Validate the index range and, if a digest is present, its length.
    pub fn validate(&self) -> tpmseal_core::Result<()> {
        if self.index > MAX_PCR_INDEX {
            return Err(tpmseal_core::Error::BadArgument(format!(
                "PCR index {} out of range 0..={}",
                self.index, MAX_PCR_INDEX
            )));
        }
        if let Some(digest) = &self.digest {
            let expected = self.bank.digest_size();
            if digest.len() != expected {
                return Err(tpmseal_core::Error::BadArgument(format!(
                    "PCR {}:{} digest is {} bytes, expected {expected}",
                    self.index,
                    self.bank,
                    digest.len()
                )));
            }
        }
        Ok(())
    }

    /// True iff the digest is present and every byte is the same value
    /// (all-zero or all-0xFF are the two "boring" placeholder digests the
    /// bank quality heuristic treats as non-informative).
    pub fn is_boring_digest(&self) -> bool {
        match &self.digest {
            Some(d) if !d.is_empty() => {
                let first = d[0];
                (first == 0x00 || first == 0xFF) && d.iter().all(|&b| b == first)
            }
            _ => true,
        }
    }
}

/// Sort a slice of [`PcrValue`] ascending by `(bank, index)`.
///
/// Stable and idempotent: sorting an already-sorted slice is a no-op, and
/// sorting twice yields the same result as sorting once.
pub fn sort(values: &mut [PcrValue]) {
    values.sort_by(|a, b| (a.bank, a.index).cmp(&(b.bank, b.index)));
}

/// A `PcrValue` array is valid iff it is sorted ascending by `(bank,
/// index)` and contains no duplicate `(bank, index)` pairs.
pub fn valid(values: &[PcrValue]) -> bool {
    values.windows(2).all(|w| (w[0].bank, w[0].index) < (w[1].bank, w[1].index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(bank: HashAlg, index: u8) -> PcrValue {
        PcrValue { bank, index, digest: None }
    }

    #[test]
    fn sort_is_stable_and_idempotent() {
        let mut values = vec![v(HashAlg::Sha256, 3), v(HashAlg::Sha1, 7), v(HashAlg::Sha256, 0)];
        sort(&mut values);
        let sorted_once = values.clone();
        sort(&mut values);
        assert_eq!(values, sorted_once);
        assert!(valid(&values));
    }

    #[test]
    fn valid_rejects_duplicates() {
        let values = vec![v(HashAlg::Sha256, 0), v(HashAlg::Sha256, 0)];
        assert!(!valid(&values));
    }

    #[test]
    fn valid_rejects_out_of_order() {
        let values = vec![v(HashAlg::Sha256, 1), v(HashAlg::Sha256, 0)];
        assert!(!valid(&values));
    }

    #[test]
    fn validate_rejects_out_of_range_index() {
        let pv = PcrValue { bank: HashAlg::Sha256, index: 24, digest: None };
        assert!(pv.validate().is_err());
    }

    #[test]
    fn validate_rejects_wrong_digest_length() {
        let pv = PcrValue { bank: HashAlg::Sha256, index: 7, digest: Some(vec![0; 20]) };
        assert!(pv.validate().is_err());
    }

    #[test]
    fn parses_worked_example_from_spec() {
        let digest = hex::decode("00".repeat(32)).unwrap();
        let pv = PcrValue::new(HashAlg::Sha256, 7, Some(digest.clone())).unwrap();
        assert_eq!(pv.index, 7);
        assert_eq!(pv.digest.unwrap(), digest);
    }

    #[test]
    fn boring_digest_detects_all_zero_and_all_ff() {
        assert!(PcrValue { bank: HashAlg::Sha256, index: 0, digest: Some(vec![0x00; 32]) }
            .is_boring_digest());
        assert!(PcrValue { bank: HashAlg::Sha256, index: 0, digest: Some(vec![0xFF; 32]) }
            .is_boring_digest());
        let mut interesting = vec![0x00; 32];
        interesting[5] = 0x01;
        assert!(!PcrValue { bank: HashAlg::Sha256, index: 0, digest: Some(interesting) }
            .is_boring_digest());
    }
}
