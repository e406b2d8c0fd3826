//! Mapping between bucket keys and the paths a CDN distribution serves.
//!
//! A distribution's origin may point at a sub path of the bucket (its
//! `OriginPath`), and the site may be deployed under a bucket path of its
//! own. Invalidation paths are expressed relative to what the CDN serves, so
//! the part of each key covered by the origin path has to be stripped.

/// Splits the deploy bucket path into the web root the CDN serves it under
/// and the origin sub path that prefixes every key.
///
/// Returns `(web_root, sub_path)`:
///
/// - `("temp/forsale", "temp")` gives `("/forsale", "temp")`
/// - `("root", "/root")` gives `("/", "root")`
/// - an origin path that is not a prefix of the bucket path gives
///   `("/<bucket_path>", "")`
#[must_use]
pub fn determine_root_and_sub_path(bucket_path: &str, origin_path: &str) -> (String, String) {
    let bucket = bucket_path.trim_matches('/');
    let origin = origin_path.trim_matches('/');

    if !origin.is_empty()
        && let Some(rest) = bucket.strip_prefix(origin)
        && (rest.is_empty() || rest.starts_with('/'))
    {
        let root = rest.trim_matches('/');
        return (format!("/{root}"), origin.to_string());
    }

    (format!("/{bucket}"), String::new())
}

/// Strips the origin `sub_path` from an object key, yielding the path the
/// CDN serves it at (always with a leading slash).
#[must_use]
pub fn key_to_cdn_path(key: &str, sub_path: &str) -> String {
    let key = key.trim_start_matches('/');
    let stripped = if sub_path.is_empty() {
        key
    } else {
        key.strip_prefix(sub_path)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(key)
    };

    if stripped.starts_with('/') {
        stripped.to_string()
    } else {
        format!("/{stripped}")
    }
}
