//! RFC 1738 (§2.2) escaping for invalidation paths.

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Whether `c` must be percent-encoded inside a URL path.
const fn should_escape(c: u8) -> bool {
    if c.is_ascii_alphanumeric() {
        return false;
    }

    match c {
        b'$' | b'-' | b'_' | b'.' | b'+' | b'!' | b'*' | b'\'' | b'(' | b')' | b',' => false,
        b'/' | b':' | b'@' | b'=' | b'&' => false,
        _ => true,
    }
}

/// Escapes `s` so it can be placed in a URL path.
///
/// Alphanumerics, `$-_.+!*'(),` and the reserved characters `/:@=&` are
/// kept as-is; every other byte (including `?`, spaces and each byte of a
/// multi-byte UTF-8 sequence) becomes `%XX` with uppercase hex digits.
#[must_use]
pub fn path_escape_rfc1738(s: &str) -> String {
    if !s.bytes().any(should_escape) {
        return s.to_string();
    }

    let mut escaped = String::with_capacity(s.len() * 3);
    for c in s.bytes() {
        if should_escape(c) {
            escaped.push('%');
            escaped.push(char::from(HEX[usize::from(c >> 4)]));
            escaped.push(char::from(HEX[usize::from(c & 15)]));
        } else {
            escaped.push(char::from(c));
        }
    }
    escaped
}
