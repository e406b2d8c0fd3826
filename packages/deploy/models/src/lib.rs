#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Plain data types shared across the site deploy toolchain.
//!
//! Nothing in here performs I/O. The engine (`site_deploy`), the storage
//! adapters and the CLI all speak in terms of these types:
//!
//! - [`DeployStats`]: the counters reported at the end of a run.
//! - [`UploadReason`]: why a local file was scheduled for upload.
//! - [`RemoteObject`]: a snapshot of one object in the bucket.
//! - [`FileConfig`]: the deserialized `.s3deploy.yml` file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Counters describing the outcome of one deploy run.
///
/// `uploaded + skipped` is the number of local files considered and
/// `deleted + stale` is the number of delete candidates found. The summary
/// is computable at any point, including after a failed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeployStats {
    /// Number of remote objects deleted.
    pub deleted: u64,
    /// Number of remote objects not present locally that were left in place
    /// because the max-delete ceiling was reached.
    pub stale: u64,
    /// Number of files uploaded.
    pub uploaded: u64,
    /// Number of files skipped because the remote copy was identical.
    pub skipped: u64,
}

impl DeployStats {
    /// Human-readable one-line summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Deleted {} of {}, uploaded {}, skipped {} ({:.0}% changed)",
            self.deleted,
            self.deleted + self.stale,
            self.uploaded,
            self.skipped,
            self.percentage_changed()
        )
    }

    /// Total number of files changed on the remote.
    #[must_use]
    pub const fn file_count_changed(&self) -> u64 {
        self.deleted + self.uploaded
    }

    /// Total number of files touched or inspected, local and remote.
    #[must_use]
    pub const fn file_count(&self) -> u64 {
        self.file_count_changed() + self.skipped
    }

    /// Percentage of files that changed, `0.0` when nothing was considered.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // display-only percentage
    pub fn percentage_changed(&self) -> f64 {
        if self.file_count() == 0 {
            return 0.0;
        }
        self.file_count_changed() as f64 / self.file_count() as f64 * 100.0
    }
}

impl std::fmt::Display for DeployStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Why a local file is uploaded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
pub enum UploadReason {
    /// No remote object exists under the file's key.
    #[strum(serialize = "not found")]
    NotFound,
    /// The force flag is set; no comparison was made.
    #[strum(serialize = "force")]
    Force,
    /// Local and remote sizes differ.
    #[strum(serialize = "size")]
    Size,
    /// Sizes match but the content fingerprints differ.
    #[strum(serialize = "fingerprint")]
    Fingerprint,
}

/// Snapshot of one object in the bucket, taken when the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Full object key, including any bucket path prefix.
    pub key: String,
    /// Content fingerprint as reported by the backend (an S3 `ETag`,
    /// quotes included).
    pub fingerprint: String,
    /// Object size in bytes.
    pub size: u64,
}

/// One entry of the `routes:` list in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Regular expression matched against the local relative path.
    pub route: String,
    /// Headers to set on matching uploads.
    pub headers: BTreeMap<String, String>,
    /// Gzip the content before upload.
    pub gzip: bool,
    /// Leave matching files alone: never uploaded, never deleted.
    pub ignore: bool,
}

/// Connection and source settings that may be given in the config file
/// instead of on the command line. Command-line flags win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    /// Destination bucket name.
    pub bucket: Option<String>,
    /// Bucket sub path.
    pub path: Option<String>,
    /// AWS region.
    pub region: Option<String>,
    /// Local source directory.
    pub source: Option<String>,
    /// Access key id.
    pub key: Option<String>,
    /// Secret access key.
    pub secret: Option<String>,
}

/// The deserialized `.s3deploy.yml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Optional fallbacks for command-line settings.
    #[serde(flatten)]
    pub settings: FileSettings,
    /// Route table, evaluated in declaration order.
    pub routes: Vec<RouteConfig>,
    /// Processing-group regexes; files matching later entries upload later.
    pub order: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_counts_and_percentage() {
        let stats = DeployStats {
            deleted: 1,
            stale: 0,
            uploaded: 2,
            skipped: 1,
        };
        assert_eq!(
            stats.summary(),
            "Deleted 1 of 1, uploaded 2, skipped 1 (75% changed)"
        );
    }

    #[test]
    fn summary_counts_stale_in_delete_total() {
        let stats = DeployStats {
            deleted: 42,
            stale: 158,
            uploaded: 4,
            skipped: 0,
        };
        assert_eq!(
            stats.summary(),
            "Deleted 42 of 200, uploaded 4, skipped 0 (100% changed)"
        );
    }

    #[test]
    fn empty_run_is_zero_percent() {
        let stats = DeployStats::default();
        assert!(stats.percentage_changed().abs() < f64::EPSILON);
        assert_eq!(
            stats.summary(),
            "Deleted 0 of 0, uploaded 0, skipped 0 (0% changed)"
        );
    }

    #[test]
    fn upload_reason_display() {
        assert_eq!(UploadReason::NotFound.to_string(), "not found");
        assert_eq!(UploadReason::Fingerprint.to_string(), "fingerprint");
        assert_eq!(UploadReason::Size.as_ref(), "size");
    }
}
