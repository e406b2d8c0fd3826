//! Reduction of changed object keys into a bounded list of CDN invalidation
//! paths.
//!
//! CDN providers bill (or rate-limit) invalidations per path, so a deploy
//! that touched hundreds of files should not send hundreds of paths. The
//! reducer keeps exact paths for small change sets and progressively
//! replaces deep paths with directory wildcards until the list fits the
//! threshold. If it never fits, everything under the web root is purged.

use std::collections::BTreeSet;

/// Default maximum number of invalidation paths sent per request.
pub const DEFAULT_THRESHOLD: usize = 8;

/// Reduces `paths` to at most `threshold` invalidation patterns under
/// `root`.
///
/// - `force` always yields the single root wildcard (e.g. `/*` or
///   `/blog/*`).
/// - A path to an `index.html` file becomes its directory with a trailing
///   slash, since that is how the page is requested.
/// - When more than `threshold` paths remain, paths deeper than level `k`
///   are collapsed into a wildcard on their ancestor, for `k` from the
///   deepest level observed down to `1`, stopping as soon as the list fits.
/// - A list that never fits, or that ends up containing the root wildcard,
///   becomes the root wildcard alone.
///
/// The result is deduplicated and sorted.
#[must_use]
pub fn normalize_invalidation_paths(
    root: &str,
    threshold: usize,
    force: bool,
    paths: &[String],
) -> Vec<String> {
    let root = if root.starts_with('/') {
        root.to_string()
    } else {
        format!("/{root}")
    };

    let match_all = format!("{}/*", root.trim_end_matches('/'));

    if force {
        return vec![match_all];
    }

    let mut max_levels = 0;
    let mut normalized = BTreeSet::new();

    for p in paths {
        let mut p = clean(p);
        if !p.starts_with('/') {
            p.insert(0, '/');
        }

        max_levels = max_levels.max(levels(&p));

        if p.rsplit('/').next() == Some("index.html") {
            let mut dir = dir(&p);
            if !dir.ends_with('/') {
                dir.push('/');
            }
            normalized.insert(dir);
        } else {
            normalized.insert(p);
        }
    }

    if normalized.len() > threshold {
        for k in (1..=max_levels).rev() {
            normalized = normalized
                .into_iter()
                .map(|p| {
                    if levels(&p) > k {
                        collapse(&p, k)
                    } else {
                        p
                    }
                })
                .collect();

            if normalized.len() <= threshold {
                break;
            }
        }

        if normalized.len() > threshold {
            log::debug!(
                "{} invalidation paths exceed threshold {threshold}, purging {match_all}",
                normalized.len()
            );
            return vec![match_all];
        }
    }

    if normalized.contains(&match_all) {
        return vec![match_all];
    }

    normalized.into_iter().collect()
}

/// Number of `/` separators in `p`.
fn levels(p: &str) -> usize {
    p.matches('/').count()
}

/// Replaces `p` (deeper than level `k`) with a wildcard on its ancestor
/// directory, keeping `levels(p) - k` leading directory segments.
fn collapse(p: &str, k: usize) -> String {
    let dir = dir(p);
    let parts: Vec<&str> = dir.trim_start_matches('/').split('/').collect();
    let keep = (parts.len() + 1).saturating_sub(k).max(1).min(parts.len());
    format!("/{}/*", parts[..keep].join("/"))
}

/// Everything up to the last `/` of `p`, cleaned. The parent of a
/// top-level entry is `/`.
fn dir(p: &str) -> String {
    match p.rfind('/') {
        Some(idx) => {
            let parent = clean(&p[..=idx]);
            if parent.is_empty() {
                "/".to_string()
            } else {
                parent
            }
        }
        None => ".".to_string(),
    }
}

/// Lexically cleans a slash-separated path: collapses repeated slashes,
/// resolves `.` and `..` segments and drops any trailing slash (except for
/// the root itself).
fn clean(p: &str) -> String {
    let absolute = p.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in p.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
