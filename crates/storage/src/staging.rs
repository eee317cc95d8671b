//! Scoped local copies of remote inputs.
//!
//! Remote prefixes are downloaded into a fresh temporary directory owned by
//! a [`StagedDirectory`]. Dropping the handle (or calling
//! [`StagedDirectory::close`]) removes the copy. Local paths are used in
//! place and never deleted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::ObjectMeta;
use tempfile::TempDir;
use tracing::{debug, info, instrument};

use crate::error::{StorageError, StorageResult};
use crate::locator::Locator;
use crate::object_store::{ObjectStorage, ObjectStorageConfig};

/// Default number of concurrent downloads.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Handle to an input available on local disk.
#[derive(Debug)]
pub struct StagedDirectory {
    path: PathBuf,
    temp: Option<TempDir>,
}

impl StagedDirectory {
    /// Wrap a local path that needs no staging.
    pub fn in_place(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temp: None,
        }
    }

    /// Local path of the staged input.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the path is a temporary copy that will be removed.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Remove the temporary copy now, reporting any error.
    pub fn close(self) -> StorageResult<()> {
        if let Some(temp) = self.temp {
            debug!(path = %temp.path().display(), "Removing staged directory");
            temp.close()?;
        }
        Ok(())
    }
}

/// Resolves locators to local paths, downloading remote ones.
#[derive(Debug, Clone)]
pub struct Stager {
    config: ObjectStorageConfig,
    concurrency: usize,
}

impl Stager {
    pub fn new(config: ObjectStorageConfig) -> Self {
        Self {
            config,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn config(&self) -> &ObjectStorageConfig {
        &self.config
    }

    /// Client for the bucket of a remote locator.
    pub fn storage_for(&self, bucket: &str) -> StorageResult<ObjectStorage> {
        ObjectStorage::connect(&self.config, bucket)
    }

    /// Make `locator` available locally.
    pub async fn stage(&self, locator: &Locator) -> StorageResult<StagedDirectory> {
        match locator {
            Locator::Local(path) => Ok(StagedDirectory::in_place(path.clone())),
            Locator::S3 { bucket, key } => {
                let storage = self.storage_for(bucket)?;
                stage_prefix(&storage, key, self.concurrency).await
            }
        }
    }

    /// Read a single small object (e.g. a manifest) from either kind of locator.
    pub async fn fetch(&self, locator: &Locator) -> StorageResult<Bytes> {
        match locator {
            Locator::Local(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
            Locator::S3 { bucket, key } => self.storage_for(bucket)?.get(key).await,
        }
    }
}

/// Download every object under `prefix` into a new temporary directory.
///
/// Keys are made relative to the prefix's parent folder, so staging
/// `stores/cube.zarr` yields `<tmp>/cube.zarr/...` and the returned path
/// points at `<tmp>/cube.zarr`. Zero-length keys ending in `/` are folder
/// markers and are skipped.
#[instrument(skip(storage), fields(bucket = %storage.bucket()))]
pub async fn stage_prefix(
    storage: &ObjectStorage,
    prefix: &str,
    concurrency: usize,
) -> StorageResult<StagedDirectory> {
    let trimmed = prefix.trim_matches('/');
    let listed = storage.list(trimmed).await?;
    let folders = folder_keys(&listed);
    let objects: Vec<ObjectMeta> = listed
        .into_iter()
        .filter(|meta| !is_folder_marker(meta, &folders))
        .collect();
    if objects.is_empty() {
        return Err(StorageError::EmptyPrefix(format!(
            "s3://{}/{}",
            storage.bucket(),
            prefix
        )));
    }

    let parent = parent_folder(trimmed);
    let temp = tempfile::Builder::new().prefix("staging-").tempdir()?;
    let root = temp.path().to_path_buf();

    let total: usize = objects.iter().map(|m| m.size).sum();
    futures::stream::iter(objects.iter().map(Ok::<_, StorageError>))
        .map_ok(|meta| {
            let key = meta.location.to_string();
            let target = root.join(relative_key(&key, parent));
            async move {
                let bytes = storage.get(&key).await?;
                if let Some(dir) = target.parent() {
                    tokio::fs::create_dir_all(dir).await?;
                }
                tokio::fs::write(&target, &bytes).await?;
                Ok::<(), StorageError>(())
            }
        })
        .try_buffer_unordered(concurrency.max(1))
        .try_collect::<Vec<()>>()
        .await?;

    let path = root.join(relative_key(trimmed, parent));
    info!(
        objects = objects.len(),
        bytes = total,
        path = %path.display(),
        "Staged remote prefix"
    );
    Ok(StagedDirectory {
        path,
        temp: Some(temp),
    })
}

/// Every ancestor folder of the listed keys.
fn folder_keys(objects: &[ObjectMeta]) -> HashSet<String> {
    let mut folders = HashSet::new();
    for meta in objects {
        let key = meta.location.as_ref();
        for (idx, _) in key.match_indices('/') {
            folders.insert(key[..idx].to_string());
        }
    }
    folders
}

/// Zero-length placeholder objects that stand for folders.
fn is_folder_marker(meta: &ObjectMeta, folders: &HashSet<String>) -> bool {
    let key = meta.location.as_ref();
    meta.size == 0 && (key.ends_with('/') || folders.contains(key))
}

/// Everything up to and including the last `/` of `prefix`.
fn parent_folder(prefix: &str) -> &str {
    match prefix.rfind('/') {
        Some(idx) => &prefix[..=idx],
        None => "",
    }
}

fn relative_key<'a>(key: &'a str, parent: &str) -> &'a str {
    key.strip_prefix(parent).unwrap_or(key)
}
