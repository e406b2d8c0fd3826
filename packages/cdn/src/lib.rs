#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CDN cache invalidation for site deploys.
//!
//! After a deploy, every key that was uploaded or deleted may be stale in
//! the CDN's edge caches. [`CloudFrontClient`] turns that change set into
//! one invalidation request per configured distribution:
//!
//! 1. Fetch the distribution config and read the first origin's
//!    `OriginPath`.
//! 2. Map bucket keys to served paths ([`origin::determine_root_and_sub_path`]).
//! 3. Reduce the paths to at most [`invalidation::DEFAULT_THRESHOLD`]
//!    patterns ([`invalidation::normalize_invalidation_paths`]).
//! 4. Escape them ([`escape::path_escape_rfc1738`]) and create the
//!    invalidation batch.

pub mod escape;
pub mod invalidation;
pub mod origin;

use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};

/// Errors that can occur during CDN operations.
#[derive(Debug, thiserror::Error)]
pub enum CdnError {
    /// `GetDistribution` failed.
    #[error("Failed to get CloudFront distribution {distribution_id}: {source}")]
    Distribution {
        /// Distribution ID.
        distribution_id: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The distribution has no origin to derive the served root from.
    #[error("CloudFront distribution {distribution_id} has no origins")]
    NoOrigin {
        /// Distribution ID.
        distribution_id: String,
    },

    /// `CreateInvalidation` failed.
    #[error("Failed to invalidate {count} paths on CloudFront distribution {distribution_id}: {source}")]
    Invalidation {
        /// Distribution ID.
        distribution_id: String,
        /// Number of paths in the rejected batch.
        count: usize,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Invalidates changed paths on one or more CloudFront distributions.
pub struct CloudFrontClient {
    client: aws_sdk_cloudfront::Client,
    distribution_ids: Vec<String>,
    bucket_path: String,
    force: bool,
}

impl CloudFrontClient {
    /// Creates a client for `distribution_ids` from a loaded AWS config.
    ///
    /// `bucket_path` is the deploy's bucket sub path; `force` invalidates the
    /// whole served root regardless of what changed.
    #[must_use]
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        distribution_ids: Vec<String>,
        bucket_path: &str,
        force: bool,
    ) -> Self {
        Self {
            client: aws_sdk_cloudfront::Client::new(sdk_config),
            distribution_ids,
            bucket_path: bucket_path.to_string(),
            force,
        }
    }

    /// The configured distribution IDs.
    #[must_use]
    pub fn distribution_ids(&self) -> &[String] {
        &self.distribution_ids
    }

    /// Invalidates the CDN paths for `keys` on every configured
    /// distribution. Does nothing when `keys` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`CdnError`] on the first distribution that fails.
    pub async fn invalidate(&self, keys: &[String]) -> Result<(), CdnError> {
        if keys.is_empty() {
            return Ok(());
        }

        for id in &self.distribution_ids {
            self.invalidate_distribution(id, keys).await?;
        }

        Ok(())
    }

    async fn invalidate_distribution(&self, id: &str, keys: &[String]) -> Result<(), CdnError> {
        let origin_path = self.origin_path(id).await?;
        let (root, sub_path) = origin::determine_root_and_sub_path(&self.bucket_path, &origin_path);

        let served: Vec<String> = keys
            .iter()
            .map(|key| origin::key_to_cdn_path(key, &sub_path))
            .collect();

        let paths: Vec<String> = invalidation::normalize_invalidation_paths(
            &root,
            invalidation::DEFAULT_THRESHOLD,
            self.force,
            &served,
        )
        .iter()
        .map(|p| escape::path_escape_rfc1738(p))
        .collect();

        if paths.len() > 10 {
            log::info!(
                "Create CloudFront invalidation request for {} paths on {id}",
                paths.len()
            );
        } else {
            log::info!("Create CloudFront invalidation request for {paths:?} on {id}");
        }

        let count = paths.len();
        let batch = invalidation_batch(&caller_reference(), paths).map_err(|e| {
            CdnError::Invalidation {
                distribution_id: id.to_string(),
                count,
                source: Box::new(e),
            }
        })?;

        self.client
            .create_invalidation()
            .distribution_id(id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| CdnError::Invalidation {
                distribution_id: id.to_string(),
                count,
                source: Box::new(e),
            })?;

        Ok(())
    }

    /// The `OriginPath` of the distribution's first origin (empty when
    /// unset).
    async fn origin_path(&self, id: &str) -> Result<String, CdnError> {
        let output = self
            .client
            .get_distribution()
            .id(id)
            .send()
            .await
            .map_err(|e| CdnError::Distribution {
                distribution_id: id.to_string(),
                source: Box::new(e),
            })?;

        let origin = output
            .distribution()
            .and_then(|d| d.distribution_config())
            .and_then(|c| c.origins())
            .and_then(|o| o.items().first())
            .ok_or_else(|| CdnError::NoOrigin {
                distribution_id: id.to_string(),
            })?;

        Ok(origin.origin_path().unwrap_or_default().to_string())
    }
}

/// Caller reference for an invalidation batch: the current UTC time as
/// `YYYYMMDDhhmmss`.
fn caller_reference() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string()
}

/// Builds the invalidation batch for `paths`.
fn invalidation_batch(
    reference: &str,
    paths: Vec<String>,
) -> Result<InvalidationBatch, aws_sdk_cloudfront::error::BuildError> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)] // bounded by the reducer
    let quantity = paths.len() as i32;

    let paths = Paths::builder()
        .quantity(quantity)
        .set_items(Some(paths))
        .build()?;

    InvalidationBatch::builder()
        .paths(paths)
        .caller_reference(reference)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_carries_reference_and_quantity() {
        let batch =
            invalidation_batch("myref", vec!["/path1/".to_string(), "/path2/".to_string()])
                .unwrap();

        assert_eq!(batch.caller_reference(), "myref");
        let paths = batch.paths().unwrap();
        assert_eq!(paths.quantity(), 2);
        assert_eq!(
            paths.items(),
            &["/path1/".to_string(), "/path2/".to_string()]
        );
    }

    #[test]
    fn caller_reference_is_a_timestamp() {
        let reference = caller_reference();
        assert_eq!(reference.len(), 14);
        assert!(reference.bytes().all(|b| b.is_ascii_digit()));
    }
}
