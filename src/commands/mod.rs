// src/commands/mod.rs
//! Command handlers for the crossbake CLI

mod cook;
mod unpack;
mod validate;

pub use cook::cmd_cook;
pub use unpack::cmd_unpack;
pub use validate::cmd_validate;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Canonicalize the package root and return it with its parent
///
/// Relative build and dist roots are taken relative to that parent, so a
/// checkout laid out as `repo/packages`, `repo/build`, `repo/dist` works
/// from any working directory.
fn package_base(packages: &Path) -> Result<(PathBuf, PathBuf)> {
    let packages = std::fs::canonicalize(packages)
        .with_context(|| format!("Package root not found: {}", packages.display()))?;
    let base = packages
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| packages.clone());
    Ok((packages, base))
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
