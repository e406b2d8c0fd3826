#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reconciliation engine for deploying a static site to an object-storage
//! bucket.
//!
//! A deploy makes the bucket (optionally a sub path of it) match a local
//! directory tree:
//!
//! 1. The remote inventory is listed once ([`store::RemoteStore::file_map`]).
//! 2. The local tree is walked ([`local::LocalStore`]) and split into
//!    processing groups ([`config::Rules::group_of`]).
//! 3. For each group, a producer reads and transforms files while the
//!    planner compares them to the inventory ([`detector`]) and feeds a
//!    bounded pool of upload workers.
//! 4. Remote keys with no local counterpart are deleted in batches, up to
//!    the max-delete ceiling ([`delete`]).
//! 5. Every uploaded or deleted key is invalidated on the CDN, if one is
//!    configured ([`store::CdnClient`]).
//!
//! Storage, CDN and filesystem access all go through traits so that the
//! same engine drives real backends, dry runs and in-memory test doubles.

pub mod config;
pub mod content_type;
pub mod delete;
pub mod deployer;
pub mod detector;
pub mod local;
mod planner;
pub mod progress;
pub mod routes;
mod state;
pub mod stats;
pub mod store;
mod upload;

#[cfg(test)]
mod testing;

pub use config::{Config, Rules};
pub use deployer::Deployer;
pub use site_deploy_models::{DeployStats, RemoteObject, UploadReason};

/// Error type returned by the storage and CDN collaborator traits.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during a deploy.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Invalid combination or missing value in the resolved configuration.
    #[error("{message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// A configured regular expression does not compile.
    #[error("cannot compile {name} pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// Which setting the pattern came from (e.g. `'ignore' flag`,
        /// `route`).
        name: String,
        /// The offending pattern.
        pattern: String,
        /// Underlying regex error.
        source: regex::Error,
    },

    /// The config file exists but could not be read or parsed.
    #[error("Failed to load config from {path}: {source}")]
    ConfigFile {
        /// Config file path.
        path: String,
        /// Underlying read or YAML error.
        source: BoxError,
    },

    /// Local filesystem error while walking or reading the source tree.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Listing the remote inventory failed.
    #[error("Failed to list remote objects under {prefix:?}: {source}")]
    List {
        /// Key prefix that was listed.
        prefix: String,
        /// Underlying store error.
        source: BoxError,
    },

    /// Uploading a file failed.
    #[error("Failed to upload {key}: {source}")]
    Upload {
        /// Object key.
        key: String,
        /// Underlying store error.
        source: BoxError,
    },

    /// Deleting a batch of objects failed.
    #[error("Failed to delete {count} objects: {source}")]
    Delete {
        /// Number of keys in the failed batch.
        count: usize,
        /// Underlying store error.
        source: BoxError,
    },

    /// CDN invalidation failed (the sync itself already completed).
    #[error("CDN invalidation failed: {source}")]
    Cdn {
        /// Underlying CDN error.
        source: BoxError,
    },

    /// A background task panicked or was aborted.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DeployError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
