// src/unpack/mod.rs

//! Safe extraction of untrusted source archives
//!
//! Upstream sources arrive as tar-family archives (sdists, release tarballs)
//! or zip files (GitHub tag archives). Neither is trusted: every write is
//! confined to the extraction root, and only members under the requested
//! sub-path are written, with that prefix stripped.
//!
//! Tar archives are validated in full before anything is written. Zip
//! members are sanitized individually since zip has no link members.

mod resolve;
mod tar;
mod zip;

use crate::compression::CompressionFormat;
use crate::error::{Error, Result};
use crate::filesystem::path::{common_ancestor, sanitize_subpath, strip_subpath};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// Container format of a source archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// A tar stream, possibly compressed
    Tar(CompressionFormat),
    /// A zip file
    Zip,
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tar(CompressionFormat::None) => write!(f, "tar"),
            Self::Tar(compression) => write!(f, "tar+{}", compression),
            Self::Zip => write!(f, "zip"),
        }
    }
}

/// A downloaded archive on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    path: PathBuf,
    format: ArchiveFormat,
}

impl Archive {
    /// Reference an archive, detecting its format from name and content
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = detect_format(&path)?;
        Ok(Self { path, format })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }
}

/// Detect archive format
///
/// Anything whose name mentions `.tar` (or the `.tgz`/`.tbz2`/`.txz` short forms) is
/// tar. Otherwise `.zip` or a `PK` signature means zip, and any other file
/// is treated as tar, compressed according to its magic bytes.
pub fn detect_format(path: &Path) -> Result<ArchiveFormat> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if name.contains(".tar")
        || [".tgz", ".tbz", ".tbz2", ".txz"].iter().any(|ext| name.ends_with(ext))
    {
        return tar_format(path);
    }
    if name.ends_with(".zip") {
        return Ok(ArchiveFormat::Zip);
    }

    let mut magic = Vec::with_capacity(4);
    File::open(path)
        .map_err(|e| integrity(path, e))?
        .take(4)
        .read_to_end(&mut magic)
        .map_err(|e| integrity(path, e))?;

    if magic.starts_with(b"PK\x03\x04") || magic.starts_with(b"PK\x05\x06") {
        Ok(ArchiveFormat::Zip)
    } else {
        tar_format(path)
    }
}

fn tar_format(path: &Path) -> Result<ArchiveFormat> {
    CompressionFormat::detect(path)
        .map(ArchiveFormat::Tar)
        .map_err(|e| integrity(path, e))
}

/// Extract `archive` into `destination`, keeping only members under `subpath`
///
/// `destination` is created if needed. `subpath` is relative to the archive
/// root; `.` or an empty path selects the whole archive. Members under the
/// sub-path are written relative to `destination` with the prefix stripped.
///
/// Returns the absolute path of the deepest directory containing everything
/// that was written. For a GitHub-style archive whose content sits under a
/// single top-level directory, that is the directory itself.
///
/// On error the destination's contents are undefined and it should be
/// removed before retrying. Tar archives are fully validated first, so a
/// rejected tar leaves nothing behind.
pub fn unpack(destination: &Path, archive: &Archive, subpath: impl AsRef<Path>) -> Result<PathBuf> {
    let subpath = sanitize_subpath(subpath)?;

    fs::create_dir_all(destination)?;
    let root = fs::canonicalize(destination)?;

    info!(
        "Unpacking {} ({}) to {}",
        archive.path().display(),
        archive.format(),
        root.display()
    );

    let written = match archive.format() {
        ArchiveFormat::Tar(compression) => self::tar::extract(&root, archive.path(), compression, &subpath)?,
        ArchiveFormat::Zip => self::zip::extract(&root, archive.path(), &subpath)?,
    };

    extracted_root(&written).ok_or_else(|| Error::EmptyExtraction {
        archive: archive.path().to_path_buf(),
        subpath: subpath.clone(),
    })
}

/// The directory holding all written paths, or `None` if nothing was written
fn extracted_root(written: &[PathBuf]) -> Option<PathBuf> {
    let ancestor = common_ancestor(written)?;
    let is_dir = fs::symlink_metadata(&ancestor)
        .map(|m| m.is_dir())
        .unwrap_or(false);

    if is_dir {
        Some(ancestor)
    } else {
        ancestor.parent().map(Path::to_path_buf)
    }
}

pub(crate) fn integrity(archive: &Path, reason: impl std::fmt::Display) -> Error {
    Error::ArchiveIntegrity {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Where a member lands relative to the extraction root, if it is selected
///
/// A non-directory member that is itself the sub-path keeps its file name,
/// so selecting a single file writes that file into the root.
pub(crate) fn member_destination(rel: &Path, subpath: &Path, is_dir: bool) -> Option<PathBuf> {
    let stripped = strip_subpath(rel, subpath)?;
    if stripped.as_os_str().is_empty() && !is_dir {
        return rel.file_name().map(PathBuf::from);
    }
    Some(stripped)
}

/// Remove whatever non-directory entry sits at `path` so it can be replaced
pub(crate) fn clear_entry(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => {
            fs::remove_file(path)?;
            Ok(())
        }
        _ => Ok(()),
    }
}
