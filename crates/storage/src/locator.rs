//! Source locators: local paths or `s3://bucket/prefix` URLs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::StorageError;

/// Where an input lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Local(PathBuf),
    S3 { bucket: String, key: String },
}

impl Locator {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::S3 { .. })
    }

    /// Last path component, e.g. the store name of `s3://b/stores/cube.zarr/`.
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            Self::S3 { key, .. } => key
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

impl FromStr for Locator {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StorageError::InvalidLocator(s.to_string()));
        }
        match s.strip_prefix("s3://") {
            Some(rest) => {
                let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(StorageError::InvalidLocator(s.to_string()));
                }
                Ok(Self::S3 {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            None if s.contains("://") => Err(StorageError::InvalidLocator(s.to_string())),
            None => Ok(Self::Local(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3() {
        let loc: Locator = "s3://bucket/path/to/cube.zarr/".parse().unwrap();
        assert_eq!(
            loc,
            Locator::S3 {
                bucket: "bucket".to_string(),
                key: "path/to/cube.zarr/".to_string()
            }
        );
        assert!(loc.is_remote());
        assert_eq!(loc.file_name().as_deref(), Some("cube.zarr"));
    }

    #[test]
    fn test_parse_local_and_invalid() {
        let loc: Locator = "./data/granules".parse().unwrap();
        assert_eq!(loc, Locator::Local(PathBuf::from("./data/granules")));
        assert!("gs://bucket/key".parse::<Locator>().is_err());
        assert!("s3:///key".parse::<Locator>().is_err());
        assert!("".parse::<Locator>().is_err());
    }
}
