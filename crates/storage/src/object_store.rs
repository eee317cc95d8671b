//! Object storage interface for remote inputs (S3 compatible).

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{aws::AmazonS3Builder, path::Path, ObjectMeta, ObjectStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::StorageResult;

/// Connection settings shared by every bucket the run touches.
///
/// Credentials are picked up from the standard `AWS_*` variables by the S3
/// builder; these fields only cover what the builder cannot infer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// Custom endpoint URL (MinIO, localstack); `None` for AWS
    pub endpoint: Option<String>,
    /// AWS region override
    pub region: Option<String>,
    /// Allow HTTP (for local endpoints)
    pub allow_http: bool,
}

impl ObjectStorageConfig {
    /// Read settings from `S3_ENDPOINT`, `S3_REGION` and `S3_ALLOW_HTTP`.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            region: std::env::var("S3_REGION").ok().filter(|v| !v.is_empty()),
            allow_http: std::env::var("S3_ALLOW_HTTP")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Object storage client bound to one bucket.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create an S3 client for `bucket`.
    pub fn connect(config: &ObjectStorageConfig, bucket: &str) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder.build()?;
        Ok(Self::from_store(Arc::new(store), bucket))
    }

    /// Wrap an existing store, e.g. an in-memory store in tests.
    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The underlying store, for opening Zarr stores in place.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> StorageResult<Bytes> {
        let location = Path::from(path);
        let bytes = self.store.get(&location).await?.bytes().await?;
        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Write bytes to a path in the bucket.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> StorageResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing object");
        self.store.put(&location, data.into()).await?;
        Ok(())
    }

    /// List objects with a given prefix.
    #[instrument(skip(self), fields(bucket = %self.bucket, prefix = %prefix))]
    pub async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectMeta>> {
        let prefix = prefix.trim_matches('/');
        let prefix_path = (!prefix.is_empty()).then(|| Path::from(prefix));
        let objects: Vec<ObjectMeta> = self.store.list(prefix_path.as_ref()).try_collect().await?;
        debug!(count = objects.len(), "Listed objects");
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    #[tokio::test]
    async fn test_put_get_list() {
        let storage = ObjectStorage::from_store(Arc::new(InMemory::new()), "test");
        storage.put("a/one.nc", Bytes::from_static(b"1")).await.unwrap();
        storage.put("a/two.nc", Bytes::from_static(b"22")).await.unwrap();
        storage.put("b/three.nc", Bytes::from_static(b"333")).await.unwrap();

        assert_eq!(storage.get("a/two.nc").await.unwrap(), Bytes::from_static(b"22"));
        let listed = storage.list("a/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(storage.list("").await.unwrap().len(), 3);
    }

    #[test]
    fn test_default_config_is_plain_aws() {
        let config = ObjectStorageConfig::default();
        assert!(config.endpoint.is_none());
        assert!(!config.allow_http);
    }
}
