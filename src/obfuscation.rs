//! Key and value normalization for obfuscated configurations.
//!
//! An obfuscated configuration arrives with md5-hashed flag keys and attribute names,
//! md5-hashed set-membership values, and base64-encoded scalar literals, so raw flag and
//! variation names are not exposed in transit. Both the lookup path (flag key translation)
//! and the rule comparison path go through the helpers here, keeping the two sides from
//! drifting apart.

use std::borrow::Cow;

use base64::prelude::*;

/// Hex-encoded md5 digest of the input.
pub(crate) fn hex_md5(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

/// Translate a caller-supplied flag key to the form it is stored under in the configuration.
pub(crate) fn normalize_flag_key(flag_key: &str, obfuscated: bool) -> Cow<'_, str> {
    if obfuscated {
        Cow::Owned(hex_md5(flag_key))
    } else {
        Cow::Borrowed(flag_key)
    }
}

/// Decode a base64-encoded configuration literal. Returns `None` for invalid base64 or
/// non-UTF-8 payloads.
pub(crate) fn decode_base64(input: &str) -> Option<String> {
    let bytes = BASE64_STANDARD.decode(input).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_md5_is_stable() {
        assert_eq!(hex_md5("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn normalize_flag_key_passes_plain_keys_through() {
        assert_eq!(normalize_flag_key("my-flag", false), "my-flag");
        assert_eq!(
            normalize_flag_key("hello", true),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn decodes_base64_literals() {
        assert_eq!(decode_base64("MTg=").as_deref(), Some("18"));
        assert_eq!(decode_base64("not base64!"), None);
    }
}
