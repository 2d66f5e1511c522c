//! The small set of PCR bank hash algorithms the engine understands.

use std::fmt;
use std::str::FromStr;

/// A PCR bank's hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashAlg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    /// Digest size in bytes for this bank.
    pub fn digest_size(self) -> usize {
        match self {
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }

    /// All banks the engine is willing to consider, in the preference
    /// order used by the bank quality heuristic (best first).
    pub fn preference_order() -> [HashAlg; 2] {
        [HashAlg::Sha256, HashAlg::Sha1]
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HashAlg::Sha1 => "sha1",
            HashAlg::Sha256 => "sha256",
            HashAlg::Sha384 => "sha384",
            HashAlg::Sha512 => "sha512",
        };
        f.write_str(s)
    }
}

impl FromStr for HashAlg {
    type Err = tpmseal_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashAlg::Sha1),
            "sha256" => Ok(HashAlg::Sha256),
            "sha384" => Ok(HashAlg::Sha384),
            "sha512" => Ok(HashAlg::Sha512),
            other => Err(tpmseal_core::Error::BadArgument(format!(
                "unknown PCR bank hash algorithm: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        for alg in [HashAlg::Sha1, HashAlg::Sha256, HashAlg::Sha384, HashAlg::Sha512] {
            let s = alg.to_string();
            assert_eq!(s.parse::<HashAlg>().unwrap(), alg);
        }
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert!("md5".parse::<HashAlg>().is_err());
    }

    #[test]
    fn preference_order_prefers_sha256() {
        assert_eq!(HashAlg::preference_order()[0], HashAlg::Sha256);
    }
}
