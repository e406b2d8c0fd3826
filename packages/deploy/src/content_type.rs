//! Content-type resolution for uploads.
//!
//! Resolution order: an explicit `Content-Type` route header, then the file
//! extension, then the leading bytes of the (uncompressed) content.

use crate::routes::Route;

/// Number of leading bytes inspected when sniffing.
pub const SNIFF_LEN: usize = 512;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Determines the content type for `rel_path`.
///
/// `content` is the raw file content, before any compression.
#[must_use]
pub fn resolve(rel_path: &str, route: Option<&Route>, content: &[u8]) -> String {
    if let Some(explicit) = route.and_then(|r| r.header("Content-Type")) {
        return explicit.to_string();
    }

    if let Some(by_extension) = by_extension(rel_path) {
        return by_extension;
    }

    sniff(&content[..content.len().min(SNIFF_LEN)]).to_string()
}

/// Content type from the file extension, with an explicit UTF-8 charset for
/// text types.
fn by_extension(rel_path: &str) -> Option<String> {
    let mime = mime_guess::from_path(rel_path).first()?;
    if mime.type_() == mime_guess::mime::TEXT
        && mime.get_param(mime_guess::mime::CHARSET).is_none()
    {
        Some(format!("{mime}; charset=utf-8"))
    } else {
        Some(mime.to_string())
    }
}

/// Signatures checked after leading whitespace is skipped. A match must be
/// followed by a space or `>`.
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Exact prefix signatures.
const MAGIC: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", TEXT_PLAIN),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x00asm", "application/wasm"),
];

/// Guesses a content type from leading bytes.
#[must_use]
pub fn sniff(data: &[u8]) -> &'static str {
    let trimmed = trim_leading_whitespace(data);

    for tag in HTML_TAGS {
        if starts_with_tag(trimmed, tag) {
            return "text/html; charset=utf-8";
        }
    }

    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    for &(signature, content_type) in MAGIC {
        if data.starts_with(signature) {
            return content_type;
        }
    }

    if data.len() >= 14 && &data[..4] == b"RIFF" && &data[8..14] == b"WEBPVP" {
        return "image/webp";
    }

    if data.iter().any(|b| is_binary(*b)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

/// Case-insensitive `tag` prefix followed by a tag terminator.
fn starts_with_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() < tag.len() + 1 {
        return false;
    }
    data[..tag.len()].eq_ignore_ascii_case(tag) && matches!(data[tag.len()], b' ' | b'>')
}

const fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
