//! Storage and CDN collaborators.
//!
//! The engine never talks to a concrete backend. Remote inventory, uploads
//! and deletions go through [`RemoteStore`]; cache invalidation goes through
//! [`CdnClient`]. Dry runs wrap the real store in [`DryRunStore`] so that the
//! planner sees the live inventory while no mutation is issued.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use site_deploy_cdn::invalidation::{DEFAULT_THRESHOLD, normalize_invalidation_paths};
use site_deploy_cdn::origin::determine_root_and_sub_path;

use crate::local::LocalFile;
use crate::{BoxError, RemoteObject};

/// An object-storage bucket.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Lists every object under `prefix`, keyed by object key.
    ///
    /// # Errors
    ///
    /// Returns the backend error if listing fails.
    async fn file_map(&self, prefix: &str) -> Result<HashMap<String, RemoteObject>, BoxError>;

    /// Uploads `file` under its key with its headers and the optional
    /// canned ACL.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the upload fails.
    async fn put(&self, file: &LocalFile, acl: Option<&str>) -> Result<(), BoxError>;

    /// Deletes `keys` in one request.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the request, or any key in it, fails.
    async fn delete_objects(&self, keys: &[String]) -> Result<(), BoxError>;
}

/// A CDN in front of the bucket.
#[async_trait]
pub trait CdnClient: Send + Sync {
    /// Purges the cached copies of `keys`.
    ///
    /// # Errors
    ///
    /// Returns the CDN error if the invalidation request fails.
    async fn invalidate_cdn_cache(&self, keys: &[String]) -> Result<(), BoxError>;
}

#[async_trait]
impl CdnClient for site_deploy_cdn::CloudFrontClient {
    async fn invalidate_cdn_cache(&self, keys: &[String]) -> Result<(), BoxError> {
        self.invalidate(keys).await.map_err(Into::into)
    }
}

/// Read-through store that turns every mutation into a no-op.
///
/// Without an inner store the inventory is empty, which makes every local
/// file a "not found" upload.
#[derive(Clone, Default)]
pub struct DryRunStore {
    inner: Option<Arc<dyn RemoteStore>>,
}

impl DryRunStore {
    /// Wraps `inner`, keeping its listing and dropping its mutations.
    #[must_use]
    pub fn new(inner: Arc<dyn RemoteStore>) -> Self {
        Self { inner: Some(inner) }
    }

    /// A dry-run store with no backing bucket.
    #[must_use]
    pub const fn empty() -> Self {
        Self { inner: None }
    }
}

#[async_trait]
impl RemoteStore for DryRunStore {
    async fn file_map(&self, prefix: &str) -> Result<HashMap<String, RemoteObject>, BoxError> {
        match &self.inner {
            Some(inner) => inner.file_map(prefix).await,
            None => Ok(HashMap::new()),
        }
    }

    async fn put(&self, _file: &LocalFile, _acl: Option<&str>) -> Result<(), BoxError> {
        Ok(())
    }

    async fn delete_objects(&self, _keys: &[String]) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Logs the invalidation paths a real CDN client would send.
#[derive(Debug, Clone)]
pub struct DryRunCdn {
    bucket_path: String,
    force: bool,
}

impl DryRunCdn {
    /// `bucket_path` stands in for the served root, as if the origin had no
    /// origin path.
    #[must_use]
    pub fn new(bucket_path: &str, force: bool) -> Self {
        Self {
            bucket_path: bucket_path.to_string(),
            force,
        }
    }

    /// The paths that would be invalidated for `keys`.
    #[must_use]
    pub fn paths(&self, keys: &[String]) -> Vec<String> {
        let (root, _) = determine_root_and_sub_path(&self.bucket_path, "");
        normalize_invalidation_paths(&root, DEFAULT_THRESHOLD, self.force, keys)
    }
}

#[async_trait]
impl CdnClient for DryRunCdn {
    async fn invalidate_cdn_cache(&self, keys: &[String]) -> Result<(), BoxError> {
        if keys.is_empty() {
            return Ok(());
        }
        log::info!("Would invalidate CDN paths {:?}", self.paths(keys));
        Ok(())
    }
}
