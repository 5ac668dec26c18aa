// src/unpack/tar.rs

//! Two-pass tar extraction
//!
//! Pass one reads only headers. Every member name is normalized, the
//! symlinks the archive will create are planted in a [`VirtualTree`], and
//! members are checked in reverse lexicographic order of name. The members
//! are then replayed in archive order against the tree as each write will
//! find it. Pass two re-reads the archive and writes the selected members in
//! archive order. A single bad member fails the whole archive before
//! anything is written.

use super::resolve::VirtualTree;
use super::{clear_entry, integrity, member_destination};
use crate::compression::{open_decoded, CompressionFormat};
use crate::error::{Error, Result};
use crate::filesystem::path::{normalize_member_name, strip_subpath};
use ::tar::EntryType;
use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemberKind {
    File,
    Directory,
    Symlink(PathBuf),
    HardLink(PathBuf),
    /// pax global headers carry metadata only
    Metadata,
}

/// One member as seen by the header scan
#[derive(Debug)]
struct Member {
    name: String,
    kind: MemberKind,
}

/// What pass two should do with a member
#[derive(Debug)]
struct Placement {
    /// Destination relative to the root
    dest: PathBuf,
    /// `dest` with every parent link resolved
    path: PathBuf,
    action: Action,
}

#[derive(Debug)]
enum Action {
    File,
    Directory,
    Symlink(PathBuf),
    /// Existing path (relative to root) to link to
    HardLink(PathBuf),
}

/// Validate, then extract, the members of `archive` under `subpath` into `root`
///
/// `root` must be canonical. Returns the absolute paths written.
pub(super) fn extract(
    root: &Path,
    archive: &Path,
    compression: CompressionFormat,
    subpath: &Path,
) -> Result<Vec<PathBuf>> {
    let members = scan(archive, compression)?;
    let placements = validate(root, &members, subpath)?;

    let mut reader = ::tar::Archive::new(open_decoded(archive, compression).map_err(|e| integrity(archive, e))?);
    let entries = reader.entries().map_err(|e| integrity(archive, e))?;

    let mut written = Vec::new();
    for (index, entry) in entries.enumerate() {
        let mut entry = entry.map_err(|e| integrity(archive, e))?;
        let member = members
            .get(index)
            .ok_or_else(|| integrity(archive, "archive changed while unpacking"))?;
        let name = entry.path().map_err(|e| integrity(archive, e))?;
        if name.to_string_lossy() != member.name {
            return Err(integrity(archive, "archive changed while unpacking"));
        }

        let Some(placement) = &placements[index] else {
            continue;
        };
        let path = root.join(&placement.path);

        match &placement.action {
            Action::Directory => {
                debug!("unpack: {} -> {} (directory)", member.name, path.display());
                fs::create_dir_all(&path)?;
            }
            Action::File => {
                debug!("unpack: {} -> {}", member.name, path.display());
                prepare(&path)?;
                entry.unpack(&path)?;
            }
            Action::Symlink(target) => {
                debug!("unpack: {} -> {} (symlink to {})", member.name, path.display(), target.display());
                prepare(&path)?;
                symlink(target, &path)?;
            }
            Action::HardLink(target) => {
                debug!("unpack: {} -> {} (hard link to {})", member.name, path.display(), target.display());
                prepare(&path)?;
                fs::hard_link(root.join(target), &path)?;
            }
        }
        written.push(root.join(&placement.dest));
    }

    Ok(written)
}

/// Read every header without writing anything
fn scan(archive: &Path, compression: CompressionFormat) -> Result<Vec<Member>> {
    let mut reader = ::tar::Archive::new(open_decoded(archive, compression).map_err(|e| integrity(archive, e))?);
    let mut members = Vec::new();

    for entry in reader.entries().map_err(|e| integrity(archive, e))? {
        let entry = entry.map_err(|e| integrity(archive, e))?;
        let name = entry
            .path()
            .map_err(|e| integrity(archive, e))?
            .to_string_lossy()
            .into_owned();
        let link = entry
            .link_name()
            .map_err(|e| integrity(archive, e))?
            .map(|l| l.into_owned());

        let kind = match entry.header().entry_type() {
            EntryType::Regular | EntryType::Continuous => MemberKind::File,
            EntryType::Directory => MemberKind::Directory,
            EntryType::Symlink => MemberKind::Symlink(link.unwrap_or_default()),
            EntryType::Link => MemberKind::HardLink(link.unwrap_or_default()),
            EntryType::XGlobalHeader | EntryType::XHeader => MemberKind::Metadata,
            other => {
                return Err(integrity(
                    archive,
                    format!("cannot handle archive member {} of type {:?}", name, other),
                ));
            }
        };

        members.push(Member { name, kind });
    }

    Ok(members)
}

/// Check every member and decide where selected ones go
///
/// Returns one slot per member, `None` for members that are not written.
fn validate(root: &Path, members: &[Member], subpath: &Path) -> Result<Vec<Option<Placement>>> {
    let mut selected = Vec::with_capacity(members.len());
    for member in members {
        if member.kind == MemberKind::Metadata {
            selected.push(None);
            continue;
        }
        let rel = normalize_member_name(&member.name)?;
        let dest = member_destination(&rel, subpath, member.kind == MemberKind::Directory);
        selected.push(Some((rel, dest)));
    }

    check_final_tree(root, members, &selected)?;
    replay(root, members, &selected, subpath)
}

type Selection = Option<(PathBuf, Option<PathBuf>)>;

/// Check members in reverse lexicographic order against the finished tree
fn check_final_tree(root: &Path, members: &[Member], selected: &[Selection]) -> Result<()> {
    let mut tree = VirtualTree::new(root);
    for (member, slot) in members.iter().zip(selected) {
        if let (Some((_, Some(dest))), MemberKind::Symlink(target)) = (slot, &member.kind) {
            tree.plant(dest.clone(), target.clone());
        }
    }

    let mut order: Vec<usize> = (0..members.len()).collect();
    order.sort_by(|&a, &b| members[b].name.cmp(&members[a].name));

    for index in order {
        let member = &members[index];
        let Some((_, Some(dest))) = &selected[index] else {
            continue;
        };
        let resolved = tree
            .resolve(dest, false)
            .map_err(|e| traversal(member, root.join(dest), e.to_string()))?;
        if let MemberKind::Symlink(target) = &member.kind {
            let link_dir = resolved.parent().unwrap_or(Path::new(""));
            tree.resolve_link_target(link_dir, target)
                .map_err(|e| traversal(member, root.join(dest), format!("links outside unpack dir: {}", e)))?;
        }
    }

    Ok(())
}

/// Walk members in archive order against the tree as it stands at each write
///
/// Repeated names and links through links only see what earlier members
/// left behind, so every write is checked against the tree it lands in.
fn replay(
    root: &Path,
    members: &[Member],
    selected: &[Selection],
    subpath: &Path,
) -> Result<Vec<Option<Placement>>> {
    let mut tree = VirtualTree::new(root);
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut placements = Vec::with_capacity(members.len());

    for (member, slot) in members.iter().zip(selected) {
        let Some((rel, dest)) = slot else {
            placements.push(None);
            continue;
        };
        let Some(dest) = dest else {
            seen.insert(rel.clone());
            placements.push(None);
            continue;
        };

        let resolved = tree
            .resolve(dest, false)
            .map_err(|e| traversal(member, root.join(dest), e.to_string()))?;

        let action = match &member.kind {
            MemberKind::File => {
                tree.replace(resolved.clone());
                Action::File
            }
            MemberKind::Directory => Action::Directory,
            MemberKind::Symlink(target) => {
                let link_dir = resolved.parent().unwrap_or(Path::new(""));
                let points_to = tree
                    .resolve_link_target(link_dir, target)
                    .map_err(|e| traversal(member, root.join(dest), format!("links outside unpack dir: {}", e)))?;
                debug!(
                    "unpack: {} symlink to {} ok",
                    member.name,
                    root.join(points_to).display()
                );
                tree.plant(resolved.clone(), target.clone());
                Action::Symlink(target.clone())
            }
            MemberKind::HardLink(target) => {
                let points_to = hard_link_target(root, &tree, &seen, member, dest, target, subpath)?;
                tree.replace(resolved.clone());
                Action::HardLink(points_to)
            }
            MemberKind::Metadata => {
                placements.push(None);
                continue;
            }
        };

        seen.insert(rel.clone());
        placements.push(Some(Placement {
            dest: dest.clone(),
            path: resolved,
            action,
        }));
    }

    Ok(placements)
}

/// Resolve where a hard link member points, relative to the root
///
/// The target must be an earlier member under the sub-path, and must not be
/// a symlink: linking a symlink copies its text into a new directory.
fn hard_link_target(
    root: &Path,
    tree: &VirtualTree,
    seen: &HashSet<PathBuf>,
    member: &Member,
    dest: &Path,
    target: &Path,
    subpath: &Path,
) -> Result<PathBuf> {
    let target_name = target.to_string_lossy();
    let target_rel = normalize_member_name(&target_name).map_err(|_| {
        traversal(member, root.join(dest), format!("hard link target {} is not a safe member name", target_name))
    })?;
    let target_dest = strip_subpath(&target_rel, subpath)
        .filter(|_| seen.contains(&target_rel))
        .ok_or_else(|| {
            traversal(
                member,
                root.join(dest),
                format!("hard link target {} is not an earlier member under the extracted sub-path", target_name),
            )
        })?;
    let points_to = tree
        .resolve(&target_dest, false)
        .map_err(|e| traversal(member, root.join(&target_dest), format!("links outside unpack dir: {}", e)))?;
    if tree.is_link(&points_to) {
        return Err(traversal(
            member,
            root.join(&points_to),
            format!("hard link target {} is a symbolic link", target_name),
        ));
    }
    Ok(points_to)
}

fn traversal(member: &Member, resolved: PathBuf, reason: String) -> Error {
    Error::PathTraversal {
        member: member.name.clone(),
        resolved,
        reason,
    }
}

/// Make room for a non-directory entry at `path`
fn prepare(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    clear_entry(path)
}
