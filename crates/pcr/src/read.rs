//! The batched PCR read loop.
//!
//! The underlying TPM command returns at most 8 PCR values per call; this
//! module owns the "subtract what came back from what's still wanted"
//! loop so the transport layer only has to implement one call's worth of
//! read.

use crate::selection::{Selection, SelectionList};
use crate::value::{self, PcrValue};
use tpmseal_core::Result;

/// One round-trip's worth of PCR reading. Implemented by the transport
/// layer against the real TPM (or a test double against fixtures).
///
/// Returning an empty vector is the "these PCRs are not implemented"
/// signal from spec: the read loop stops rather than looping forever.
pub trait PcrReader {
    fn read_batch(&mut self, selection: &SelectionList) -> Result<Vec<PcrValue>>;
}

/// Read every PCR named by `want`, looping until satisfied or until the
/// reader signals "not implemented" by returning nothing for a
/// non-empty request.
pub fn read_all(reader: &mut dyn PcrReader, want: SelectionList) -> Result<Vec<PcrValue>> {
    let mut remaining = want;
    let mut out = Vec::new();

    while !remaining.is_empty() {
        let batch = reader.read_batch(&remaining)?;
        if batch.is_empty() {
            tracing::warn!(
                "TPM returned no PCR values for the remaining selection; \
                 treating the rest as not implemented"
            );
            break;
        }

        let read_selection = SelectionList::normalize(
            batch.iter().map(|v| Selection::from_mask(1 << v.index, v.bank)),
        );
        remaining = remaining.sub(&read_selection);
        out.extend(batch);
    }

    value::sort(&mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlg;

    /// A fake reader that hands back at most `batch_size` values per call,
    /// modelling the real command's 8-PCR-per-call ceiling.
    struct FakeReader {
        available: Vec<PcrValue>,
        batch_size: usize,
    }

    impl PcrReader for FakeReader {
        fn read_batch(&mut self, selection: &SelectionList) -> Result<Vec<PcrValue>> {
            let mut out = Vec::new();
            for value in &self.available {
                if out.len() >= self.batch_size {
                    break;
                }
                if selection.mask_for(value.bank) & (1 << value.index) != 0 {
                    out.push(value.clone());
                }
            }
            Ok(out)
        }
    }

    fn value(index: u8) -> PcrValue {
        PcrValue { bank: HashAlg::Sha256, index, digest: Some(vec![0u8; 32]) }
    }

    #[test]
    fn reads_everything_across_multiple_batches() {
        let available: Vec<PcrValue> = (0..16).map(value).collect();
        let mut reader = FakeReader { available, batch_size: 8 };
        let want = SelectionList::normalize([Selection::from_mask((1 << 16) - 1, HashAlg::Sha256)]);
        let got = read_all(&mut reader, want).unwrap();
        assert_eq!(got.len(), 16);
        assert!(crate::value::valid(&got));
    }

    #[test]
    fn stops_when_reader_reports_nothing_implemented() {
        let mut reader = FakeReader { available: vec![value(0)], batch_size: 8 };
        let want = SelectionList::normalize([Selection::from_mask(0b11, HashAlg::Sha256)]);
        let got = read_all(&mut reader, want).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].index, 0);
    }

    #[test]
    fn empty_selection_reads_nothing() {
        let mut reader = FakeReader { available: vec![], batch_size: 8 };
        let got = read_all(&mut reader, SelectionList::new()).unwrap();
        assert!(got.is_empty());
    }
}
