#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Amazon S3 (and S3-compatible) backend for site deploys.
//!
//! [`S3Store`] implements [`site_deploy::store::RemoteStore`]:
//!
//! - the inventory comes from paginated `ListObjectsV2` calls, with each
//!   object's `ETag` as its fingerprint;
//! - uploads are single `PutObject` calls carrying the file's headers and
//!   the canned ACL;
//! - deletions are `DeleteObjects` calls of up to 1000 keys each.
//!
//! Credentials and region come from the loaded AWS config (environment,
//! profile, or static keys set by the caller). A custom endpoint switches to
//! path-style addressing for S3-compatible stores.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectCannedAcl, ObjectIdentifier};
use site_deploy::local::LocalFile;
use site_deploy::store::RemoteStore;
use site_deploy::{BoxError, RemoteObject};

/// Errors that can occur during S3 operations.
#[derive(Debug, thiserror::Error)]
pub enum S3Error {
    /// S3 `ListObjectsV2` failed.
    #[error("Failed to list s3://{bucket}/{prefix}: {source}")]
    List {
        /// Bucket name.
        bucket: String,
        /// Key prefix.
        prefix: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `DeleteObjects` failed, or reported a failure for some key.
    #[error("Failed to delete {count} objects from s3://{bucket}: {source}")]
    Delete {
        /// Bucket name.
        bucket: String,
        /// Number of keys in the request.
        count: usize,
        /// Underlying SDK error or per-key error message.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Upload headers split into the fields `PutObject` models explicitly and
/// user metadata.
#[derive(Debug, Default, PartialEq, Eq)]
struct ObjectHeaders {
    content_type: Option<String>,
    cache_control: Option<String>,
    content_encoding: Option<String>,
    content_disposition: Option<String>,
    content_language: Option<String>,
    metadata: HashMap<String, String>,
}

impl ObjectHeaders {
    fn from_headers(headers: &BTreeMap<String, String>) -> Self {
        let mut split = Self::default();

        for (name, value) in headers {
            let slot = match name.to_ascii_lowercase().as_str() {
                "content-type" => &mut split.content_type,
                "cache-control" => &mut split.cache_control,
                "content-encoding" => &mut split.content_encoding,
                "content-disposition" => &mut split.content_disposition,
                "content-language" => &mut split.content_language,
                _ => {
                    split.metadata.insert(name.clone(), value.clone());
                    continue;
                }
            };
            *slot = Some(value.clone());
        }

        split
    }
}

/// Converts one listed object into the engine's inventory entry.
fn remote_object(key: &str, e_tag: Option<&str>, size: Option<i64>) -> RemoteObject {
    #[allow(clippy::cast_sign_loss)] // S3 object sizes are non-negative
    let size = size.unwrap_or(0).max(0) as u64;
    RemoteObject {
        key: key.to_string(),
        fingerprint: e_tag.unwrap_or_default().to_string(),
        size,
    }
}

/// A bucket accessed through `aws-sdk-s3`.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    /// Creates a store for `bucket` from a loaded AWS config.
    ///
    /// With `endpoint_url`, requests go to that endpoint using path-style
    /// addressing.
    #[must_use]
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        bucket: &str,
        endpoint_url: Option<&str>,
    ) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
        }
    }

    /// The bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Lists every object under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::List`] on S3 failures.
    pub async fn list(&self, prefix: &str) -> Result<HashMap<String, RemoteObject>, S3Error> {
        log::debug!("Listing s3://{}/{prefix}*", self.bucket);

        let mut objects = HashMap::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|e| S3Error::List {
                bucket: self.bucket.clone(),
                prefix: prefix.to_string(),
                source: Box::new(e),
            })?;

            for obj in output.contents() {
                if let Some(key) = obj.key() {
                    objects.insert(key.to_string(), remote_object(key, obj.e_tag(), obj.size()));
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        log::debug!("  found {} objects", objects.len());
        Ok(objects)
    }

    /// Uploads `file` with its headers and the optional canned ACL.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::Upload`] on S3 failures.
    pub async fn upload(&self, file: &LocalFile, acl: Option<&str>) -> Result<(), S3Error> {
        let headers = ObjectHeaders::from_headers(file.headers());

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(file.key())
            .body(ByteStream::from(file.content().to_vec()))
            .set_content_type(headers.content_type)
            .set_cache_control(headers.cache_control)
            .set_content_encoding(headers.content_encoding)
            .set_content_disposition(headers.content_disposition)
            .set_content_language(headers.content_language);

        for (name, value) in headers.metadata {
            request = request.metadata(name, value);
        }

        if let Some(acl) = acl {
            request = request.acl(ObjectCannedAcl::from(acl));
        }

        request.send().await.map_err(|e| S3Error::Upload {
            bucket: self.bucket.clone(),
            key: file.key().to_string(),
            source: Box::new(e),
        })?;

        log::debug!("  uploaded {}", file.key());
        Ok(())
    }

    /// Deletes `keys` in one `DeleteObjects` request.
    ///
    /// # Errors
    ///
    /// Returns [`S3Error::Delete`] if the request fails or S3 reports an
    /// error for any key.
    pub async fn delete(&self, keys: &[String]) -> Result<(), S3Error> {
        let delete_error = |source: Box<dyn std::error::Error + Send + Sync>| S3Error::Delete {
            bucket: self.bucket.clone(),
            count: keys.len(),
            source,
        };

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| delete_error(Box::new(e)))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| delete_error(Box::new(e)))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| delete_error(Box::new(e)))?;

        if let Some(failed) = output.errors().first() {
            return Err(delete_error(
                format!(
                    "{}: {}",
                    failed.key().unwrap_or_default(),
                    failed.message().unwrap_or("unknown error")
                )
                .into(),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn file_map(&self, prefix: &str) -> Result<HashMap<String, RemoteObject>, BoxError> {
        Ok(self.list(prefix).await?)
    }

    async fn put(&self, file: &LocalFile, acl: Option<&str>) -> Result<(), BoxError> {
        Ok(self.upload(file, acl).await?)
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), BoxError> {
        Ok(self.delete(keys).await?)
    }
}
