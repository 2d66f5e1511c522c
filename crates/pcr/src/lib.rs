//! PCR selection algebra: a typed representation of "which PCRs in which
//! banks", with union, difference, normalization, mask conversion, the
//! batched-read loop, and the bank quality heuristic used for automatic
//! bank selection.
//!
//! Nothing in this crate touches a TPM — [`read::PcrReader`] is the seam
//! the transport layer implements against the real chip.

pub mod bank;
pub mod hash;
pub mod names;
pub mod read;
pub mod selection;
pub mod value;

pub use bank::{is_good, is_usable, select_bank, BankChoice, BankStatus};
pub use hash::HashAlg;
pub use read::{read_all, PcrReader};
pub use selection::{
    mask_to_string, parse_selection_string, parse_value_string, string_to_mask, Selection,
    SelectionList, FULL_MASK,
};
pub use value::{PcrValue, MAX_PCR_INDEX};
