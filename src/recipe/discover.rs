// src/recipe/discover.rs

//! Finding packages under a package root
//!
//! Every directory holding a `recipe.toml` is one package. Its build and
//! dist directories mirror its location relative to the package root, so
//! two packages never share a directory as long as neither recipe directory
//! contains the other.

use crate::error::{Error, Result};
use crate::recipe::format::Recipe;
use crate::recipe::parser::parse_recipe_file;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Name of the per-package manifest
pub const RECIPE_FILE: &str = "recipe.toml";

/// Per-package directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    /// Directory holding the recipe
    pub source_path: PathBuf,
    /// Scratch space for download, unpack, build and venv
    pub build_path: PathBuf,
    /// Where the finished artifact goes
    pub dist_path: PathBuf,
}

/// A package found under the package root
#[derive(Debug, Clone)]
pub struct DiscoveredPackage {
    /// Recipe directory relative to the package root, e.g. `pandas/1.5.0`
    pub relative: PathBuf,
    pub paths: BuildPaths,
}

impl DiscoveredPackage {
    pub fn recipe_path(&self) -> PathBuf {
        self.paths.source_path.join(RECIPE_FILE)
    }

    /// Load and parse this package's recipe
    pub fn load_recipe(&self) -> Result<Recipe> {
        parse_recipe_file(&self.recipe_path())
    }

    /// Display label used in logs and reports
    pub fn label(&self) -> String {
        if self.relative.as_os_str().is_empty() {
            ".".to_string()
        } else {
            self.relative.display().to_string()
        }
    }
}

/// Discover every package under `package_root`, sorted by path
pub fn discover_packages(
    package_root: &Path,
    build_root: &Path,
    dist_root: &Path,
) -> Result<Vec<DiscoveredPackage>> {
    let root = fs::canonicalize(package_root).map_err(|e| {
        Error::NotFound(format!("package root {}: {}", package_root.display(), e))
    })?;
    info!("Discovering packages under {}", root.display());

    let mut dirs = Vec::new();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::IoError(format!("Failed to walk {}: {}", root.display(), e)))?;
        if entry.file_type().is_file() && entry.file_name() == RECIPE_FILE {
            if let Some(dir) = entry.path().parent() {
                dirs.push(dir.to_path_buf());
            }
        }
    }
    dirs.sort();

    for pair in dirs.windows(2) {
        if pair[1].starts_with(&pair[0]) {
            return Err(Error::InvalidPath(format!(
                "package {} is nested inside package {}; their build directories would overlap",
                pair[1].display(),
                pair[0].display()
            )));
        }
    }

    let packages = dirs
        .into_iter()
        .map(|dir| {
            let relative = dir.strip_prefix(&root).map(Path::to_path_buf).unwrap_or_default();
            let paths = BuildPaths {
                build_path: build_root.join(&relative),
                dist_path: dist_root.join(&relative),
                source_path: dir,
            };
            debug!(
                "Discovered package at {}, building in {}, dist to {}",
                paths.source_path.display(),
                paths.build_path.display(),
                paths.dist_path.display()
            );
            DiscoveredPackage { relative, paths }
        })
        .collect::<Vec<_>>();

    info!("Found {} package(s)", packages.len());
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn recipe_at(root: &Path, rel: &str) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(RECIPE_FILE), "").unwrap();
    }

    #[test]
    fn test_discover_sorted_with_mirrored_paths() {
        let tmp = TempDir::new().unwrap();
        let packages = tmp.path().join("packages");
        recipe_at(&packages, "prefect/3.3.4");
        recipe_at(&packages, "pandas/1.5.0");
        fs::write(packages.join("README"), "not a package").unwrap();

        let found = discover_packages(&packages, Path::new("/b"), Path::new("/d")).unwrap();
        let labels: Vec<_> = found.iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec!["pandas/1.5.0", "prefect/3.3.4"]);

        assert_eq!(found[0].paths.build_path, PathBuf::from("/b/pandas/1.5.0"));
        assert_eq!(found[0].paths.dist_path, PathBuf::from("/d/pandas/1.5.0"));
        assert!(found[0].paths.source_path.is_absolute());
        assert!(found[0].recipe_path().ends_with("pandas/1.5.0/recipe.toml"));
    }

    #[test]
    fn test_nested_packages_rejected() {
        let tmp = TempDir::new().unwrap();
        recipe_at(tmp.path(), "pandas");
        recipe_at(tmp.path(), "pandas/vendored");

        let err = discover_packages(tmp.path(), Path::new("/b"), Path::new("/d")).unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn test_sibling_prefix_is_not_nesting() {
        let tmp = TempDir::new().unwrap();
        recipe_at(tmp.path(), "numpy");
        recipe_at(tmp.path(), "numpy-quaternion");

        let found = discover_packages(tmp.path(), Path::new("/b"), Path::new("/d")).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_missing_root() {
        let err = discover_packages(Path::new("/nonexistent/packages"), Path::new("/b"), Path::new("/d"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
