use serde::{Deserialize, Deserializer};
use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Normalize a string to Unicode NFC, reusing the allocation when the input
/// is already normalized (the common case for dump data).
pub(crate) fn nfc(s: String) -> String {
    if is_nfc(&s) {
        s
    } else {
        s.nfc().collect()
    }
}

/// Serde helper: deserialize a string field and normalize it to NFC.
pub(crate) fn de_nfc<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(nfc)
}

/// Repair a byte string into valid UTF-8 without changing its byte length.
///
/// Every byte that is not part of a valid UTF-8 sequence becomes a single
/// NUL byte. Length preservation matters because `img_metadata` blobs embed
/// PHP-serialized data whose framing is byte-length-prefixed; the usual
/// lossy conversion to U+FFFD would shift every following offset.
pub(crate) fn repair_utf8(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(first) => {
            let mut out = String::with_capacity(bytes.len());
            out.push_str(std::str::from_utf8(&bytes[..first.valid_up_to()]).unwrap_or_default());
            let mut rest = &bytes[first.valid_up_to()..];
            while !rest.is_empty() {
                match std::str::from_utf8(rest) {
                    Ok(s) => {
                        out.push_str(s);
                        break;
                    }
                    Err(e) => {
                        out.push_str(std::str::from_utf8(&rest[..e.valid_up_to()]).unwrap_or_default());
                        // One replacement byte per invalid byte keeps offsets stable.
                        out.push('\0');
                        rest = &rest[e.valid_up_to() + 1..];
                    }
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_leaves_valid_input_untouched() {
        assert_eq!(repair_utf8(b"hello"), "hello");
        assert_eq!(repair_utf8("snölök".as_bytes()), "snölök");
        assert_eq!(repair_utf8(b""), "");
    }

    #[test]
    fn repair_replaces_each_invalid_byte_with_one_nul() {
        assert_eq!(repair_utf8(b"a\xffb"), "a\0b");
        assert_eq!(repair_utf8(b"\xff\xfe"), "\0\0");
        // Truncated three-byte sequence: every bad byte counts once.
        assert_eq!(repair_utf8(b"a\xe2\x82"), "a\0\0");
    }

    #[test]
    fn repair_preserves_byte_length() {
        let inputs: &[&[u8]] = &[
            b"plain",
            b"\xff",
            b"a\xf0\x9f\x92id",
            b"\x80\x80\x80\x80",
            "mixed \u{30c6} text".as_bytes(),
        ];
        for input in inputs {
            assert_eq!(repair_utf8(input).len(), input.len());
        }
    }

    #[test]
    fn repair_keeps_multibyte_sequences_intact() {
        let s = "日本語";
        assert_eq!(repair_utf8(s.as_bytes()), s);
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0xff);
        assert_eq!(repair_utf8(&bytes), format!("{s}\0"));
    }

    #[test]
    fn nfc_normalizes_decomposed_input() {
        // "é" as 'e' + combining acute.
        let decomposed = "e\u{0301}".to_owned();
        assert_eq!(nfc(decomposed), "\u{00e9}");
        assert_eq!(nfc("already fine".to_owned()), "already fine");
    }
}
