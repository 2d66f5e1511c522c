//! Symbolic PCR index names (the conventional systemd-boot / firmware
//! measurement assignment), so selection strings can say
//! `boot-loader-code` instead of `4`.

/// `(symbolic name, PCR index)` pairs, in index order.
pub const PCR_NAMES: &[(&str, u8)] = &[
    ("platform-code", 0),
    ("platform-config", 1),
    ("external-code", 2),
    ("external-config", 3),
    ("boot-loader-code", 4),
    ("boot-loader-config", 5),
    ("host-platform", 6),
    ("secure-boot-policy", 7),
    ("kernel-initrd", 8),
    ("ima", 9),
];

/// Resolve a symbolic PCR name to its index, case-insensitively.
pub fn index_for_name(name: &str) -> Option<u8> {
    PCR_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, i)| *i)
}

/// Resolve a PCR index back to its canonical symbolic name, if any.
pub fn name_for_index(index: u8) -> Option<&'static str> {
    PCR_NAMES.iter().find(|(_, i)| *i == index).map(|(n, _)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_worked_example_names() {
        assert_eq!(index_for_name("boot-loader-code"), Some(4));
        assert_eq!(index_for_name("boot-loader-config"), Some(5));
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!(index_for_name("Boot-Loader-Code"), Some(4));
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        assert_eq!(index_for_name("not-a-real-pcr"), None);
    }

    #[test]
    fn name_and_index_round_trip() {
        for &(name, index) in PCR_NAMES {
            assert_eq!(name_for_index(index), Some(name));
            assert_eq!(index_for_name(name), Some(index));
        }
    }
}
