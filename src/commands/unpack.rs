// src/commands/unpack.rs

//! Unpack command - extract one source archive

use anyhow::{Context, Result};
use crossbake::unpack::{unpack, Archive};
use std::path::Path;
use std::process::ExitCode;

/// Extract `archive` into `destination`, keeping only members under `subpath`
pub fn cmd_unpack(archive: &Path, destination: &Path, subpath: &Path) -> Result<ExitCode> {
    let archive = Archive::open(archive)
        .with_context(|| format!("Failed to open archive: {}", archive.display()))?;
    println!("Unpacking {} ({})", archive.path().display(), archive.format());

    let root = unpack(destination, &archive, subpath)
        .with_context(|| format!("Failed to unpack {}", archive.path().display()))?;

    println!("[COMPLETE] Source root: {}", root.display());
    Ok(ExitCode::SUCCESS)
}
