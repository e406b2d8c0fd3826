//! Local source tree: walking, reading and per-file transformation.
//!
//! Walking only collects metadata. Content is read later, one processing
//! group at a time, by the producer task that feeds the planner. That is
//! where gzip and content-type detection happen, turning a [`WalkedFile`]
//! into a ready-to-compare [`LocalFile`].

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use flate2::Compression;
use flate2::write::GzEncoder;
use regex::Regex;

use crate::content_type;
use crate::routes::{Route, compile_pattern};
use crate::{DeployError, UploadReason};

/// Default pattern for files that are never deployed.
pub const DEFAULT_SKIP_LOCAL_FILES: &str = r"(^|/)\.DS_Store$";

/// Default pattern for directories that are never descended into: any
/// directory whose own name starts with a dot, at any depth.
pub const DEFAULT_SKIP_LOCAL_DIRS: &str = r"(^|/)\.[^/]*$";

/// Skip rules applied while walking. Both patterns match the slash-separated
/// path relative to the source root.
#[derive(Debug, Clone)]
pub struct WalkFilter {
    skip_files: Regex,
    skip_dirs: Regex,
}

impl WalkFilter {
    /// Compiles the file and directory skip patterns.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::InvalidPattern`] if either pattern is invalid.
    pub fn new(skip_files: &str, skip_dirs: &str) -> Result<Self, DeployError> {
        Ok(Self {
            skip_files: compile_pattern("'skip-local-files' flag", skip_files)?,
            skip_dirs: compile_pattern("'skip-local-dirs' flag", skip_dirs)?,
        })
    }

    /// Whether the file at `rel_path` is skipped.
    #[must_use]
    pub fn skip_file(&self, rel_path: &str) -> bool {
        self.skip_files.is_match(rel_path)
    }

    /// Whether the directory at `rel_path` (and everything below it) is
    /// skipped.
    #[must_use]
    pub fn skip_dir(&self, rel_path: &str) -> bool {
        self.skip_dirs.is_match(rel_path)
    }

    /// Whether a file at `rel_path` survives both the file rule and the
    /// directory rule for each of its ancestors. For stores that list files
    /// without walking directories.
    #[must_use]
    pub fn accepts(&self, rel_path: &str) -> bool {
        if self.skip_file(rel_path) {
            return false;
        }

        let mut end = 0;
        while let Some(idx) = rel_path[end..].find('/') {
            end += idx;
            if self.skip_dir(&rel_path[..end]) {
                return false;
            }
            end += 1;
        }

        true
    }
}

/// A file found by the walker, before its content has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Slash-separated path relative to the source root.
    pub rel_path: String,
    /// Path used to read the file.
    pub abs_path: PathBuf,
    /// Size on disk in bytes.
    pub size: u64,
}

/// Access to the local source tree.
///
/// Methods are synchronous; the engine calls them from blocking threads.
pub trait LocalStore: Send + Sync {
    /// Lists every file under `root` that `filter` accepts. Skipped
    /// directories are not descended into.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Io`] if the tree cannot be traversed.
    fn walk(&self, root: &Path, filter: &WalkFilter) -> Result<Vec<WalkedFile>, DeployError>;

    /// Reads the full content of a walked file.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Io`] if the file cannot be read.
    fn read(&self, path: &Path) -> Result<Vec<u8>, DeployError>;
}

/// [`LocalStore`] backed by the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsStore;

impl LocalStore for OsStore {
    fn walk(&self, root: &Path, filter: &WalkFilter) -> Result<Vec<WalkedFile>, DeployError> {
        let mut files = Vec::new();

        let walker = walkdir::WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !filter.skip_dir(&relative_slash_path(root, entry.path()))
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                DeployError::io(path, e.into())
            })?;

            if entry.file_type().is_dir() {
                continue;
            }

            let rel_path = relative_slash_path(root, entry.path());
            if filter.skip_file(&rel_path) {
                log::debug!("{rel_path} skipped by local file filter");
                continue;
            }

            let size = entry
                .metadata()
                .map_err(|e| DeployError::io(entry.path(), e.into()))?
                .len();

            files.push(WalkedFile {
                rel_path,
                abs_path: entry.path().to_path_buf(),
                size,
            });
        }

        Ok(files)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, DeployError> {
        std::fs::read(path).map_err(|e| DeployError::io(path, e))
    }
}

/// `path` relative to `root`, slash-separated and name-normalised.
fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    normalise_name(&joined)
}

/// Canonicalises filename encoding. macOS filesystems may hand back
/// decomposed (NFD) names; keys are always NFC.
#[cfg(target_os = "macos")]
#[must_use]
pub fn normalise_name(name: &str) -> String {
    use unicode_normalization::UnicodeNormalization as _;
    name.nfc().collect()
}

/// Canonicalises filename encoding (a no-op outside macOS).
#[cfg(not(target_os = "macos"))]
#[must_use]
pub fn normalise_name(name: &str) -> String {
    name.to_string()
}

/// A local file, read and transformed, ready for comparison and upload.
///
/// Owned by exactly one stage at a time: producer, then planner, then one
/// upload worker.
#[derive(Debug)]
pub struct LocalFile {
    rel_path: String,
    key: String,
    abs_path: PathBuf,
    body: Vec<u8>,
    content_type: String,
    headers: BTreeMap<String, String>,
    fingerprint: OnceLock<String>,
    reason: Option<UploadReason>,
}

impl LocalFile {
    /// Builds an upload-ready file from its raw content.
    ///
    /// Gzip routes compress `raw`; the compressed bytes become the body,
    /// the size and the fingerprint input.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Io`] if compression fails.
    pub fn new(
        rel_path: String,
        key: String,
        abs_path: PathBuf,
        raw: Vec<u8>,
        route: Option<&Route>,
    ) -> Result<Self, DeployError> {
        let content_type = content_type::resolve(&rel_path, route, &raw);
        let gzip = route.is_some_and(|r| r.gzip);

        let body = if gzip {
            gzip_bytes(&raw).map_err(|e| DeployError::io(&abs_path, e))?
        } else {
            raw
        };

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.clone());
        if gzip {
            headers.insert("Content-Encoding".to_string(), "gzip".to_string());
        }
        if let Some(route) = route {
            for (name, value) in &route.headers {
                headers.retain(|k: &String, _| !k.eq_ignore_ascii_case(name));
                headers.insert(name.clone(), value.clone());
            }
        }

        Ok(Self {
            rel_path,
            key,
            abs_path,
            body,
            content_type,
            headers,
            fingerprint: OnceLock::new(),
            reason: None,
        })
    }

    /// Path relative to the source root.
    #[must_use]
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    /// Destination object key (bucket path prefix included).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Where the file was read from.
    #[must_use]
    pub fn abs_path(&self) -> &Path {
        &self.abs_path
    }

    /// Upload body (compressed for gzip routes).
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.body
    }

    /// Size of the upload body in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }

    /// Resolved content type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Headers to send with the upload, `Content-Type` included.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Quoted MD5 hex digest of the body, in S3 `ETag` form. Computed on
    /// first use and cached.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        self.fingerprint.get_or_init(|| {
            let mut context = md5::Context::new();
            context.consume(&self.body);
            format!("\"{:x}\"", context.finalize())
        })
    }

    /// Whether [`Self::fingerprint`] has been computed.
    #[must_use]
    pub fn is_fingerprinted(&self) -> bool {
        self.fingerprint.get().is_some()
    }

    /// Why the file is being uploaded, once classified.
    #[must_use]
    pub const fn reason(&self) -> Option<UploadReason> {
        self.reason
    }

    pub(crate) const fn set_reason(&mut self, reason: UploadReason) {
        self.reason = Some(reason);
    }
}

fn gzip_bytes(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}
