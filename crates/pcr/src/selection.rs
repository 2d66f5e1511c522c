//! PCR selection algebra: a typed bitfield-per-bank, with union,
//! difference, normalization, and mask/string conversion.

use crate::hash::HashAlg;
use crate::names::index_for_name;
use crate::value::{PcrValue, MAX_PCR_INDEX};
use std::collections::BTreeMap;
use tpmseal_core::{Error, Result};

/// Mask covering PCR indices 0..=23.
pub const FULL_MASK: u32 = (1 << 24) - 1;

/// A selection within a single bank: a hash algorithm plus a 24-bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub bank: HashAlg,
    pub mask: u32,
}

impl Selection {
    pub fn from_mask(mask: u32, bank: HashAlg) -> Self {
        Self { bank, mask: mask & FULL_MASK }
    }

    pub fn to_mask(&self) -> u32 {
        self.mask
    }

    pub fn is_set(&self, index: u8) -> bool {
        index <= MAX_PCR_INDEX && (self.mask & (1 << index)) != 0
    }

    pub fn set(&mut self, index: u8, on: bool) {
        if index > MAX_PCR_INDEX {
            return;
        }
        if on {
            self.mask |= 1 << index;
        } else {
            self.mask &= !(1 << index);
        }
    }

    /// Bitwise union. Both selections must be for the same bank.
    pub fn add(&self, other: &Selection) -> Result<Selection> {
        if self.bank != other.bank {
            return Err(Error::BadArgument(format!(
                "cannot union selections from different banks ({} vs {})",
                self.bank, other.bank
            )));
        }
        Ok(Selection { bank: self.bank, mask: self.mask | other.mask })
    }

    /// Bitwise difference (`self` minus `other`). Both selections must be
    /// for the same bank.
    pub fn sub(&self, other: &Selection) -> Result<Selection> {
        if self.bank != other.bank {
            return Err(Error::BadArgument(format!(
                "cannot subtract selections from different banks ({} vs {})",
                self.bank, other.bank
            )));
        }
        Ok(Selection { bank: self.bank, mask: self.mask & !other.mask })
    }

    /// Popcount of the mask.
    pub fn weight(&self) -> u32 {
        self.mask.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }
}

/// A list of at most one entry per distinct bank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionList(Vec<Selection>);

impl SelectionList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a normalized list from arbitrary entries, collapsing
    /// duplicate-hash entries by OR-combining their masks.
    pub fn normalize(entries: impl IntoIterator<Item = Selection>) -> Self {
        let mut by_bank: BTreeMap<HashAlg, u32> = BTreeMap::new();
        for entry in entries {
            *by_bank.entry(entry.bank).or_insert(0) |= entry.mask;
        }
        Self(by_bank.into_iter().map(|(bank, mask)| Selection { bank, mask }).collect())
    }

    pub fn entries(&self) -> &[Selection] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|s| s.is_empty())
    }

    pub fn banks(&self) -> Vec<HashAlg> {
        self.0.iter().map(|s| s.bank).collect()
    }

    /// The mask across all (post-normalization, at most one) entries for
    /// `bank`, OR-combined defensively in case normalization was bypassed.
    pub fn mask_for(&self, bank: HashAlg) -> u32 {
        self.0.iter().filter(|s| s.bank == bank).fold(0, |acc, s| acc | s.mask)
    }

    /// Union: per matching bank, bitwise OR; a bank present only in
    /// `other` is added as a new entry.
    pub fn add(&self, other: &SelectionList) -> SelectionList {
        let mut entries = self.0.clone();
        for o in &other.0 {
            if let Some(existing) = entries.iter_mut().find(|e| e.bank == o.bank) {
                existing.mask |= o.mask;
            } else {
                entries.push(*o);
            }
        }
        SelectionList::normalize(entries)
    }

    /// Difference: per matching bank, bitwise AND-NOT. A bank absent from
    /// `self` has nothing to subtract from and is left out.
    pub fn sub(&self, other: &SelectionList) -> SelectionList {
        let mut entries = self.0.clone();
        for entry in &mut entries {
            if let Some(o) = other.0.iter().find(|o| o.bank == entry.bank) {
                entry.mask &= !o.mask;
            }
        }
        SelectionList::normalize(entries)
    }

    /// Popcount of the union of all entries' masks, irrespective of bank.
    pub fn weight(&self) -> u32 {
        self.0.iter().fold(0u32, |acc, s| acc | s.mask).count_ones()
    }
}

fn split_tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c| c == ',' || c == '+').map(str::trim).filter(|t| !t.is_empty())
}

fn parse_hex_value(v: &str) -> Result<Vec<u8>> {
    let v = v.strip_prefix("0x").unwrap_or(v);
    hex::decode(v).map_err(|e| Error::BadArgument(format!("invalid hex digest: {e}")))
}

/// Parse one `index[:hash[=hexvalue]]` token.
fn parse_token(token: &str) -> Result<(u8, Option<HashAlg>, Option<Vec<u8>>)> {
    let (left, value) = match token.split_once('=') {
        Some((l, v)) => (l, Some(v)),
        None => (token, None),
    };
    let (index_part, hash_part) = match left.split_once(':') {
        Some((i, h)) => (i, Some(h)),
        None => (left, None),
    };
    let index: u8 = if let Ok(n) = index_part.parse::<u8>() {
        n
    } else {
        index_for_name(index_part)
            .ok_or_else(|| Error::BadArgument(format!("unknown PCR index or name: {index_part}")))?
    };
    if index > MAX_PCR_INDEX {
        return Err(Error::BadArgument(format!("PCR index {index} out of range 0..={MAX_PCR_INDEX}")));
    }
    let hash = hash_part.map(str::parse).transpose()?;
    let digest = value.map(parse_hex_value).transpose()?;
    Ok((index, hash, digest))
}

/// Parse a `,`/`+`-separated selection string into a mask over a single,
/// caller-supplied default bank (the hash portion of each token, if
/// present, is ignored — this is the simple "which indices" form used by
/// `mask_to_string`/`string_to_mask` round-tripping).
pub fn string_to_mask(s: &str) -> Result<u32> {
    let mut mask = 0u32;
    for token in split_tokens(s) {
        let (index, _hash, _value) = parse_token(token)?;
        mask |= 1 << index;
    }
    Ok(mask)
}

/// Render a mask in canonical form: ascending indices, `+`-separated.
pub fn mask_to_string(mask: u32) -> String {
    (0..=MAX_PCR_INDEX)
        .filter(|i| mask & (1 << i) != 0)
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("+")
}

/// Parse a selection string into a [`SelectionList`], grouping tokens by
/// their (explicit or default) bank.
pub fn parse_selection_string(s: &str, default_bank: HashAlg) -> Result<SelectionList> {
    let mut by_bank: BTreeMap<HashAlg, u32> = BTreeMap::new();
    for token in split_tokens(s) {
        let (index, hash, _value) = parse_token(token)?;
        let bank = hash.unwrap_or(default_bank);
        *by_bank.entry(bank).or_insert(0) |= 1 << index;
    }
    Ok(SelectionList(by_bank.into_iter().map(|(bank, mask)| Selection { bank, mask }).collect()))
}

/// Parse a PCR *value* string (each token must carry an explicit hash,
/// and may carry a hex digest) into a sorted, valid array of
/// [`PcrValue`].
pub fn parse_value_string(s: &str) -> Result<Vec<PcrValue>> {
    let mut out = Vec::new();
    for token in split_tokens(s) {
        let (index, hash, digest) = parse_token(token)?;
        let hash = hash.ok_or_else(|| {
            Error::BadArgument(format!("PCR value token '{token}' is missing a hash algorithm"))
        })?;
        out.push(PcrValue::new(hash, index, digest)?);
    }
    crate::value::sort(&mut out);
    Ok(out)
}
