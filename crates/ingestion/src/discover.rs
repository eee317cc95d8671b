//! Granule discovery in a staged input directory.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{IngestionError, Result};

/// Default pattern for raster granules.
pub const DEFAULT_RASTER_PATTERN: &str = "*.tif";

/// Default pattern for NetCDF granules.
pub const DEFAULT_NETCDF_PATTERN: &str = "*.nc";

/// Recursively collect files under `root` matching `pattern`, sorted by path.
///
/// The pattern is matched against the trailing path components, as many as
/// the pattern has, so `*.tif` matches any file name and `2024/*.tif` matches
/// files directly inside any `2024` folder. `*` never crosses a `/`.
pub fn discover(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();
    let depth = pattern.trim_matches('/').split('/').count();

    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if matches_tail(&matcher, relative, depth) {
            found.push(entry.into_path());
        }
    }
    found.sort();

    if found.is_empty() {
        return Err(IngestionError::NoInputs {
            root: root.display().to_string(),
            pattern: pattern.to_string(),
        });
    }
    debug!(root = %root.display(), pattern, count = found.len(), "Discovered granules");
    Ok(found)
}

fn matches_tail(matcher: &GlobMatcher, relative: &Path, depth: usize) -> bool {
    let components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if components.len() < depth {
        return false;
    }
    let tail = components[components.len() - depth..].join("/");
    matcher.is_match(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_discover_matches_file_names_recursively() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.tif");
        touch(dir.path(), "nested/a.tif");
        touch(dir.path(), "nested/a.tif.aux.xml");
        touch(dir.path(), "notes.txt");

        let found = discover(dir.path(), "*.tif").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("b.tif"), PathBuf::from("nested/a.tif")]);
    }

    #[test]
    fn test_discover_multi_component_pattern() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "2024/x.nc");
        touch(dir.path(), "2023/x.nc");
        touch(dir.path(), "deep/2024/y.nc");

        let found = discover(dir.path(), "2024/*.nc").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.parent().unwrap().ends_with("2024")));
    }

    #[test]
    fn test_discover_nothing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.nc");
        let err = discover(dir.path(), "*.tif").unwrap_err();
        assert!(matches!(err, IngestionError::NoInputs { .. }));
    }

    #[test]
    fn test_invalid_glob() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover(dir.path(), "[unclosed").unwrap_err(),
            IngestionError::Glob(_)
        ));
    }
}
