use std::fmt::Write as _;

use crate::Error;

/// Separator used by [`entity_key`] and the `_default` helpers
pub const DEFAULT_SEPARATOR: &str = "#";

/// A value that may be used as one part of a string composite key
///
/// `Option<T>` is accepted so that missing values are reported with their
/// position rather than turned into `"None"` or an empty string.
pub trait KeyPart {
    /// Textual form of the part, `None` when the value is missing
    fn key_part(&self) -> Option<String>;
}

impl KeyPart for str {
    fn key_part(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl KeyPart for String {
    fn key_part(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl<T: KeyPart + ?Sized> KeyPart for &T {
    fn key_part(&self) -> Option<String> {
        (**self).key_part()
    }
}

impl<T: KeyPart> KeyPart for Option<T> {
    fn key_part(&self) -> Option<String> {
        self.as_ref().and_then(KeyPart::key_part)
    }
}

macro_rules! impl_display_key_part {
    ($($ty:ty),*) => {
        $(
            impl KeyPart for $ty {
                fn key_part(&self) -> Option<String> {
                    Some(self.to_string())
                }
            }
        )*
    };
}

impl_display_key_part!(i32, i64, u32, u64, usize);

fn check_separator(separator: &str) -> Result<(), Error> {
    if separator.is_empty() {
        return Err(Error::validation("composite key separator must not be empty"));
    }
    if separator.contains('%') {
        return Err(Error::validation(
            "composite key separator must not contain the escape character `%`",
        ));
    }
    // escapes are spelled with hex digits, which must never read as a separator
    if separator.chars().any(|c| c.is_ascii_hexdigit()) {
        return Err(Error::validation(
            "composite key separator must not contain hex digits",
        ));
    }
    Ok(())
}

fn escape_part(part: &str, separator: &str, out: &mut String) {
    for c in part.chars() {
        if c == '%' || separator.contains(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{byte:02X}");
            }
        } else {
            out.push(c);
        }
    }
}

fn unescape_part(part: &str, position: usize) -> Result<String, Error> {
    let bytes = part.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hex = bytes
                .get(index + 1..index + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| Error::InvalidKey {
                    position,
                    reason: format!("malformed escape sequence at byte {index}"),
                })?;
            decoded.push(hex);
            index += 3;
        } else {
            decoded.push(bytes[index]);
            index += 1;
        }
    }

    String::from_utf8(decoded).map_err(|_| Error::InvalidKey {
        position,
        reason: "escape sequences do not decode to UTF-8".to_string(),
    })
}

/// Join parts into a single-attribute composite key
///
/// `%` and every character of the separator are percent-escaped inside each
/// part, which makes [`parse_composite_key`] an exact inverse.
///
/// # Example
///
/// ```
/// use dynamo_access::key::{composite_key, parse_composite_key};
///
/// let key = composite_key(&["ORDER", "2024#01"], "#").unwrap();
/// assert_eq!(key, "ORDER#2024%2301");
/// assert_eq!(parse_composite_key(&key, "#").unwrap(), vec!["ORDER", "2024#01"]);
/// ```
pub fn composite_key<P: KeyPart>(parts: &[P], separator: &str) -> Result<String, Error> {
    check_separator(separator)?;
    if parts.is_empty() {
        return Err(Error::InvalidKey {
            position: 0,
            reason: "a composite key needs at least one part".to_string(),
        });
    }

    let mut key = String::new();
    for (position, part) in parts.iter().enumerate() {
        let part = part.key_part().ok_or_else(|| Error::InvalidKey {
            position,
            reason: "key part is missing".to_string(),
        })?;
        if position > 0 {
            key.push_str(separator);
        }
        escape_part(&part, separator, &mut key);
    }

    Ok(key)
}

/// Split a composite key built by [`composite_key`] back into its parts
pub fn parse_composite_key(key: &str, separator: &str) -> Result<Vec<String>, Error> {
    check_separator(separator)?;
    key.split(separator)
        .enumerate()
        .map(|(position, part)| unescape_part(part, position))
        .collect()
}

/// `TYPE#id` style key for an entity
pub fn entity_key(entity_type: &str, id: impl KeyPart) -> Result<String, Error> {
    let id = id.key_part().ok_or_else(|| Error::InvalidKey {
        position: 1,
        reason: "entity id is missing".to_string(),
    })?;
    composite_key(&[entity_type, id.as_str()], DEFAULT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_entity_key() {
        assert_eq!(entity_key("USER", "123").unwrap(), "USER#123");
        assert_eq!(entity_key("ORDER", 42u64).unwrap(), "ORDER#42");
    }

    #[test]
    fn test_separator_inside_part_is_escaped() {
        let key = composite_key(&["a#b", "c"], "#").unwrap();
        assert_eq!(key, "a%23b#c");
        assert_eq!(parse_composite_key(&key, "#").unwrap(), vec!["a#b", "c"]);
    }

    #[test]
    fn test_escape_sequences_survive() {
        let parts = ["%23", "100%", ""];
        let key = composite_key(&parts, "#").unwrap();
        assert_eq!(key, "%2523#100%25#");
        assert_eq!(parse_composite_key(&key, "#").unwrap(), parts);
    }

    #[test]
    fn test_multi_char_separator() {
        let parts = ["a:", ":b", "::"];
        let key = composite_key(&parts, "::").unwrap();
        assert_eq!(parse_composite_key(&key, "::").unwrap(), parts);
    }

    #[test]
    fn test_missing_part_reports_position() {
        let parts = [Some("tenant"), None, Some("order")];
        let err = composite_key(&parts, "#").unwrap_err();
        assert!(matches!(err, Error::InvalidKey { position: 1, .. }));
    }

    #[test]
    fn test_invalid_separators_and_input() {
        assert!(composite_key(&["a"], "").is_err());
        assert!(composite_key(&["a"], "%").is_err());
        assert!(composite_key(&["3"], "3").unwrap_err().is_validation());
        assert!(composite_key(&["a"], "#f").unwrap_err().is_validation());
        assert!(parse_composite_key("%33", "3").unwrap_err().is_validation());
        assert!(composite_key::<&str>(&[], "#").is_err());
        assert!(matches!(
            parse_composite_key("ok#bad%2", "#").unwrap_err(),
            Error::InvalidKey { position: 1, .. }
        ));
    }

    proptest! {
        #[test]
        fn prop_separator_accepted_iff_no_hex_digit_or_escape(separator in ".{1,4}") {
            let accepted = composite_key(&["x"], &separator).is_ok();
            let expected = !separator.chars().any(|c| c == '%' || c.is_ascii_hexdigit());
            prop_assert_eq!(accepted, expected);
            if accepted {
                let parts = vec![separator.clone(), "%".to_string(), String::new()];
                let key = composite_key(&parts, &separator).unwrap();
                prop_assert_eq!(parse_composite_key(&key, &separator).unwrap(), parts);
            }
        }

        #[test]
        fn prop_parse_inverts_compose(
            parts in prop::collection::vec(".*", 1..6),
            separator in prop::sample::select(vec!["#", "|", "::", "é", "#|", "G", "xYz", "_-_"]),
        ) {
            let key = composite_key(&parts, separator).unwrap();
            prop_assert_eq!(parse_composite_key(&key, separator).unwrap(), parts);
        }
    }
}
