//! The sealed-object blob: a self-describing concatenation of the
//! private area, public area, and an optional encrypted seed, each
//! length-prefixed so the blob never needs an external schema to
//! unmarshal.

use tpmseal_core::{Error, Result};

const LEN_PREFIX_BYTES: usize = 2;
const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// The three parts a sealed object marshals to and from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub private: Vec<u8>,
    pub public: Vec<u8>,
    /// Present only for a "calculated" sealed object produced via an
    /// import operation rather than a direct `create`.
    pub seed: Option<Vec<u8>>,
}

fn write_field(out: &mut Vec<u8>, field: &[u8]) -> Result<()> {
    if field.len() > MAX_FIELD_LEN {
        return Err(Error::BadArgument(format!(
            "blob field of {} bytes exceeds the {MAX_FIELD_LEN}-byte length-prefix limit",
            field.len()
        )));
    }
    out.extend_from_slice(&(field.len() as u16).to_be_bytes());
    out.extend_from_slice(field);
    Ok(())
}

fn read_field(bytes: &[u8], offset: &mut usize) -> Result<Vec<u8>> {
    if bytes.len() < *offset + LEN_PREFIX_BYTES {
        return Err(Error::BadArgument("truncated blob: missing length prefix".to_string()));
    }
    let len = u16::from_be_bytes([bytes[*offset], bytes[*offset + 1]]) as usize;
    *offset += LEN_PREFIX_BYTES;
    if bytes.len() < *offset + len {
        return Err(Error::BadArgument("truncated blob: field shorter than its length prefix".to_string()));
    }
    let field = bytes[*offset..*offset + len].to_vec();
    *offset += len;
    Ok(field)
}

impl Blob {
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_field(&mut out, &self.private)?;
        write_field(&mut out, &self.public)?;
        if let Some(seed) = &self.seed {
            write_field(&mut out, seed)?;
        }
        Ok(out)
    }

    /// Marshal and base64-encode, the form the `tpm2-blob` LUKS2 token
    /// field stores.
    pub fn to_base64(&self) -> Result<String> {
        use base64::Engine;
        Ok(base64::engine::general_purpose::STANDARD.encode(self.marshal()?))
    }

    /// Base64-decode and unmarshal, the inverse of [`Blob::to_base64`].
    pub fn from_base64(encoded: &str) -> Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::BadArgument(format!("invalid base64 blob: {e}")))?;
        Self::unmarshal(&bytes)
    }

    /// Unmarshal per the self-describing rule: a seed is present iff
    /// bytes remain after the public area field.
    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let private = read_field(bytes, &mut offset)?;
        let public = read_field(bytes, &mut offset)?;
        let seed = if offset < bytes.len() {
            Some(read_field(bytes, &mut offset)?)
        } else {
            None
        };
        if offset != bytes.len() {
            return Err(Error::BadArgument("blob has trailing bytes past the last recognized field".to_string()));
        }
        Ok(Self { private, public, seed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_without_seed() {
        let blob = Blob { private: vec![1, 2, 3], public: vec![4, 5], seed: None };
        let bytes = blob.marshal().unwrap();
        assert_eq!(Blob::unmarshal(&bytes).unwrap(), blob);
    }

    #[test]
    fn round_trip_with_seed_preserves_seed_bytes() {
        let blob = Blob { private: vec![9; 4], public: vec![8; 6], seed: Some(vec![7; 12]) };
        let bytes = blob.marshal().unwrap();
        let back = Blob::unmarshal(&bytes).unwrap();
        assert_eq!(back.seed.as_deref(), Some(&[7u8; 12][..]));
        assert_eq!(back, blob);
    }

    #[test]
    fn round_trip_with_empty_fields() {
        let blob = Blob { private: vec![], public: vec![], seed: None };
        let bytes = blob.marshal().unwrap();
        assert_eq!(Blob::unmarshal(&bytes).unwrap(), blob);
    }

    #[test]
    fn rejects_truncated_length_prefix() {
        assert!(Blob::unmarshal(&[0x00]).is_err());
    }

    #[test]
    fn rejects_field_shorter_than_declared_length() {
        let mut bytes = vec![0x00, 0x05];
        bytes.extend_from_slice(&[1, 2]);
        assert!(Blob::unmarshal(&bytes).is_err());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let blob = Blob { private: vec![1], public: vec![2], seed: None };
        let mut bytes = blob.marshal().unwrap();
        bytes.push(0xFF);
        assert!(Blob::unmarshal(&bytes).is_err());
    }

    #[test]
    fn rejects_field_larger_than_length_prefix_limit() {
        let blob = Blob { private: vec![0u8; MAX_FIELD_LEN + 1], public: vec![], seed: None };
        assert!(blob.marshal().is_err());
    }

    #[test]
    fn base64_round_trips() {
        let blob = Blob { private: vec![1, 2, 3], public: vec![4, 5], seed: Some(vec![6]) };
        let encoded = blob.to_base64().unwrap();
        assert_eq!(Blob::from_base64(&encoded).unwrap(), blob);
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(Blob::from_base64("not valid base64!!").is_err());
    }
}
