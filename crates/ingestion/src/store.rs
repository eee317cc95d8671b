//! Opening previously persisted stores from local or remote locators.

use std::str::FromStr;

use cube_processor::{open_remote_storage, Cube, ZarrReader};
use serde::{Deserialize, Serialize};
use storage::{Locator, StagedDirectory, Stager};
use tracing::info;

use crate::error::{IngestionError, Result};

/// How a remote store is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Download the store into a temporary directory first.
    #[default]
    Stage,
    /// Read chunks directly from object storage.
    Mount,
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stage" => Ok(Self::Stage),
            "mount" => Ok(Self::Mount),
            other => Err(format!("unknown store access mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage => write!(f, "stage"),
            Self::Mount => write!(f, "mount"),
        }
    }
}

/// Open the store at `locator` as a cube.
///
/// Local stores are read in place. With [`AccessMode::Stage`] remote stores
/// are copied locally and the returned handle owns the copy; keep it alive
/// for as long as the cube's source should remain on disk. Mounted stores
/// must carry consolidated metadata.
pub async fn open_store(
    stager: &Stager,
    reader: &ZarrReader,
    locator: &Locator,
    mode: AccessMode,
) -> Result<(Cube, Option<StagedDirectory>)> {
    let (cube, staged) = match (locator, mode) {
        (Locator::Local(path), _) => (reader.read_path(path)?, None),
        (Locator::S3 { .. }, AccessMode::Stage) => {
            let staged = stager.stage(locator).await?;
            let cube = reader.read_path(staged.path())?;
            (cube, Some(staged))
        }
        (Locator::S3 { bucket, key }, AccessMode::Mount) => {
            let storage = stager.storage_for(bucket)?;
            let remote = open_remote_storage(storage.store(), key);
            (reader.read_storage(remote)?, None)
        }
    };
    info!(
        store = %locator,
        access = %mode,
        steps = cube.time_len(),
        variables = ?cube.variable_names(),
        "Opened store"
    );
    Ok((cube, staged))
}

/// Read a JSON manifest listing store locators.
pub async fn read_manifest(stager: &Stager, locator: &Locator) -> Result<Vec<Locator>> {
    let bytes = stager.fetch(locator).await?;
    let entries: Vec<String> = serde_json::from_slice(&bytes)
        .map_err(|e| IngestionError::Manifest(format!("{}: {}", locator, e)))?;
    if entries.is_empty() {
        return Err(IngestionError::Manifest(format!("{} lists no stores", locator)));
    }
    entries
        .iter()
        .map(|entry| entry.parse::<Locator>().map_err(IngestionError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::ObjectStorageConfig;

    #[test]
    fn test_access_mode_from_str() {
        assert_eq!("stage".parse::<AccessMode>(), Ok(AccessMode::Stage));
        assert_eq!("MOUNT".parse::<AccessMode>(), Ok(AccessMode::Mount));
        assert!("copy".parse::<AccessMode>().is_err());
        assert_eq!(AccessMode::default().to_string(), "stage");
    }

    #[tokio::test]
    async fn test_read_local_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"["/data/a.zarr", "s3://bucket/stores/b.zarr"]"#).unwrap();

        let stager = Stager::new(ObjectStorageConfig::default());
        let stores = read_manifest(&stager, &Locator::Local(path)).await.unwrap();
        assert_eq!(stores.len(), 2);
        assert!(!stores[0].is_remote());
        assert!(stores[1].is_remote());
    }

    #[tokio::test]
    async fn test_bad_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"stores": []}"#).unwrap();

        let stager = Stager::new(ObjectStorageConfig::default());
        let err = read_manifest(&stager, &Locator::Local(path)).await.unwrap_err();
        assert!(matches!(err, IngestionError::Manifest(_)));
    }
}
