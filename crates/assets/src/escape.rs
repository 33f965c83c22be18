//! Filename escaping.
//!
//! Entity ids become file stems, so every byte outside `[A-Za-z0-9]` is
//! rewritten as `_` followed by two hex digits (`_` itself included, since
//! it introduces escapes). The mapping is a byte-for-byte bijection:
//! `unescape(escape(s)) == s` for every string.

/// Escape an entity id into a filesystem-safe stem.
pub fn escape_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() {
            out.push(byte as char);
        } else {
            out.push('_');
            out.push_str(&format!("{byte:02x}"));
        }
    }
    out
}

/// Invert [`escape_filename`]. Malformed escapes pass through verbatim so
/// foreign filenames still produce a usable id.
pub fn unescape_filename(stem: &str) -> String {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            if let (Some(&h), Some(&l)) = (bytes.get(i + 1), bytes.get(i + 2)) {
                if let (Some(high), Some(low)) =
                    ((h as char).to_digit(16), (l as char).to_digit(16))
                {
                    out.push((high * 16 + low) as u8);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for name in ["plain", "with space", "a_b", "Ünïcode", "dots.and/slashes", ""] {
            assert_eq!(unescape_filename(&escape_filename(name)), name);
        }
    }

    #[test]
    fn test_escaped_form_is_safe() {
        let escaped = escape_filename("../etc/passwd");
        assert!(escaped.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn test_underscore_is_escaped() {
        assert_eq!(escape_filename("a_b"), "a_5fb");
        assert_eq!(unescape_filename("a_5fb"), "a_b");
    }
}
