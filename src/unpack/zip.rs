// src/unpack/zip.rs

//! Zip extraction
//!
//! Zip archives have no link members, so each member is checked on its own:
//! `enclosed_name` must accept it, the normalized name must be free of
//! `..`, and its parent directories must not pass through a symlink that
//! already exists under the root.

use super::resolve::VirtualTree;
use super::{clear_entry, integrity, member_destination};
use crate::error::{Error, Result};
use crate::filesystem::path::normalize_member_name;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extract the members of `archive` under `subpath` into `root`
///
/// `root` must be canonical. Returns the absolute paths written.
pub(super) fn extract(root: &Path, archive: &Path, subpath: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).map_err(|e| integrity(archive, e))?;
    let mut zip = ::zip::ZipArchive::new(file).map_err(|e| integrity(archive, e))?;
    let tree = VirtualTree::new(root);

    let mut written = Vec::new();
    for index in 0..zip.len() {
        let mut member = zip.by_index(index).map_err(|e| integrity(archive, e))?;
        let name = member.name().to_string();

        let enclosed = member.enclosed_name().ok_or_else(|| Error::PathTraversal {
            member: name.clone(),
            resolved: root.join(&name),
            reason: "member name is unsafe".to_string(),
        })?;
        let rel = normalize_member_name(&enclosed.to_string_lossy())?;

        let is_dir = member.is_dir();
        let Some(dest) = member_destination(&rel, subpath, is_dir) else {
            continue;
        };
        tree.resolve(&dest, false).map_err(|e| Error::PathTraversal {
            member: name.clone(),
            resolved: root.join(&dest),
            reason: e.to_string(),
        })?;

        let path = root.join(&dest);
        debug!("unpack: {} -> {}", name, path.display());

        if is_dir {
            fs::create_dir_all(&path)?;
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            clear_entry(&path)?;
            let mut out = File::create(&path)?;
            io::copy(&mut member, &mut out).map_err(|e| integrity(archive, e))?;
            if let Some(mode) = member.unix_mode() {
                fs::set_permissions(&path, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
        written.push(path);
    }

    Ok(written)
}
