//! Name-aware ordering.
//!
//! Device names are compared the way a person reads them: runs of digits
//! are compared by value, so "/dev/sda2" sorts before "/dev/sda10".

use std::cmp::Ordering;

use super::device::Device;

/// Splits a name into alternating runs of digits and non-digits.
fn tokens(name: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_digits = None;

    for (i, c) in name.char_indices() {
        let is_digit = c.is_ascii_digit();
        match in_digits {
            Some(previous) if previous != is_digit => {
                tokens.push(&name[start..i]);
                start = i;
            }
            _ => (),
        }
        in_digits = Some(is_digit);
    }

    if start < name.len() {
        tokens.push(&name[start..]);
    }

    tokens
}

fn is_number(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit())
}

/// Compares two runs of digits by value without parsing them, so that
/// arbitrarily long numbers are supported.
fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Total order on names where embedded numbers compare by value.
///
/// Numbers sort before text at the same position. Names that only differ in
/// leading zeros are ordered by their raw text, so the order stays total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let a_tokens = tokens(a);
    let b_tokens = tokens(b);

    for (x, y) in a_tokens.iter().zip(b_tokens.iter()) {
        let ordering = match (is_number(x), is_number(y)) {
            (true, true) => compare_numbers(x, y),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a_tokens
        .len()
        .cmp(&b_tokens.len())
        .then_with(|| a.cmp(b))
}

/// Orders devices by display name, then by sid.
pub fn compare_devices(a: &Device, b: &Device) -> Ordering {
    compare_names(&a.display_name(), &b.display_name()).then_with(|| a.sid.cmp(&b.sid))
}

/// Sorts devices in place using `compare_devices`.
pub fn sort_devices(devices: &mut [&Device]) {
    devices.sort_by(|a, b| compare_devices(a, b));
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_tokens() {
        assert_eq!(tokens("/dev/sda10"), vec!["/dev/sda", "10"]);
        assert_eq!(tokens("nvme0n1p2"), vec!["nvme", "0", "n", "1", "p", "2"]);
        assert!(tokens("").is_empty());
    }

    #[test]
    fn test_compare_names() {
        let mut names = vec![
            "/dev/sda10",
            "/dev/sdb",
            "/dev/sda2",
            "/dev/sda",
            "/dev/sda1",
            "/dev/nvme0n1p1",
            "/dev/nvme10n1",
            "/dev/nvme2n1",
        ];
        names.sort_by(|a, b| compare_names(a, b));
        assert_eq!(
            names,
            vec![
                "/dev/nvme0n1p1",
                "/dev/nvme2n1",
                "/dev/nvme10n1",
                "/dev/sda",
                "/dev/sda1",
                "/dev/sda2",
                "/dev/sda10",
                "/dev/sdb",
            ]
        );
    }

    #[test]
    fn test_leading_zeros() {
        assert_eq!(compare_names("dev01", "dev1"), Ordering::Less);
        assert_eq!(compare_names("dev1", "dev01"), Ordering::Greater);
        assert_eq!(compare_names("dev2", "dev010"), Ordering::Less);
        assert_eq!(compare_names("dev1", "dev1"), Ordering::Equal);
    }

    proptest! {
        #[test]
        fn test_compare_names_is_antisymmetric(a in "[a-c0-9/]{0,8}", b in "[a-c0-9/]{0,8}") {
            prop_assert_eq!(compare_names(&a, &b), compare_names(&b, &a).reverse());
            prop_assert_eq!(compare_names(&a, &b) == Ordering::Equal, a == b);
        }

        #[test]
        fn test_compare_names_is_transitive(
            a in "[a-b0-9]{0,6}",
            b in "[a-b0-9]{0,6}",
            c in "[a-b0-9]{0,6}",
        ) {
            let mut names = [a, b, c];
            names.sort_by(|x, y| compare_names(x, y));
            prop_assert_ne!(compare_names(&names[0], &names[1]), Ordering::Greater);
            prop_assert_ne!(compare_names(&names[1], &names[2]), Ordering::Greater);
            prop_assert_ne!(compare_names(&names[0], &names[2]), Ordering::Greater);
        }
    }
}
