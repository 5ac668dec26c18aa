// src/unpack/resolve.rs

//! Symlink-aware path resolution inside an extraction root
//!
//! Resolution happens against a virtual view of the tree: the symbolic
//! links an archive is going to create are overlaid on whatever already
//! exists on disk. A member path is trusted only if walking it through that
//! view, link by link, never leaves the root.

use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Maximum symlink hops before a path is considered a loop (matches Linux MAXSYMLINKS)
const MAX_LINK_HOPS: usize = 40;

/// Why a path could not be resolved inside the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Escape {
    /// The walk climbed above the root
    OutsideRoot(PathBuf),
    /// A symlink pointed at an absolute location outside the root
    AbsoluteTarget(PathBuf),
    /// Too many symlinks were followed
    LinkLoop,
}

impl std::fmt::Display for Escape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutsideRoot(p) => write!(f, "path leaves the unpack directory via {}", p.display()),
            Self::AbsoluteTarget(p) => write!(f, "symbolic link points outside the unpack directory to {}", p.display()),
            Self::LinkLoop => write!(f, "too many levels of symbolic links"),
        }
    }
}

/// What the archive puts at a path, overriding the disk
#[derive(Debug, Clone)]
enum Node {
    Link(PathBuf),
    /// A file or hard link replaced whatever was on disk
    Replaced,
}

/// Root directory plus the entries an archive has planted in it
pub(crate) struct VirtualTree {
    root: PathBuf,
    planted: HashMap<PathBuf, Node>,
}

impl VirtualTree {
    /// `root` must already be canonical
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            planted: HashMap::new(),
        }
    }

    /// Record that a symlink at `rel` (relative to root) will point to `target`
    pub fn plant(&mut self, rel: PathBuf, target: PathBuf) {
        self.planted.insert(rel, Node::Link(target));
    }

    /// Record that a non-link entry will replace whatever sits at `rel`
    pub fn replace(&mut self, rel: PathBuf) {
        self.planted.insert(rel, Node::Replaced);
    }

    /// Whether `rel` is a symlink in this view
    pub fn is_link(&self, rel: &Path) -> bool {
        self.link_at(rel).is_some()
    }

    /// Resolve `rel`, following links in every parent component
    ///
    /// The final component is left alone unless `follow_last` is set. The
    /// result is relative to the root.
    pub fn resolve(&self, rel: &Path, follow_last: bool) -> Result<PathBuf, Escape> {
        self.resolve_from(&[], rel, follow_last)
    }

    /// Resolve a symlink target relative to the directory holding the link
    pub fn resolve_link_target(&self, link_dir: &Path, target: &Path) -> Result<PathBuf, Escape> {
        if target.is_absolute() {
            return Err(Escape::AbsoluteTarget(target.to_path_buf()));
        }
        let base: Vec<OsString> = link_dir
            .components()
            .map(|c| c.as_os_str().to_os_string())
            .collect();
        self.resolve_from(&base, target, true)
    }

    fn resolve_from(&self, base: &[OsString], rel: &Path, follow_last: bool) -> Result<PathBuf, Escape> {
        let mut resolved: Vec<OsString> = base.to_vec();
        let mut pending: VecDeque<OsString> = VecDeque::new();
        prepend(&mut pending, rel);
        let mut hops = 0;

        while let Some(part) = pending.pop_front() {
            if part == "." {
                continue;
            }
            if part == ".." {
                if resolved.pop().is_none() {
                    return Err(Escape::OutsideRoot(rel.to_path_buf()));
                }
                continue;
            }
            if part == "/" {
                return Err(Escape::AbsoluteTarget(rel.to_path_buf()));
            }

            let is_last = pending.is_empty();
            let mut candidate: PathBuf = resolved.iter().collect();
            candidate.push(&part);

            let link = if is_last && !follow_last {
                None
            } else {
                self.link_at(&candidate)
            };

            let Some(target) = link else {
                resolved.push(part);
                continue;
            };

            hops += 1;
            if hops > MAX_LINK_HOPS {
                return Err(Escape::LinkLoop);
            }
            if target.is_absolute() {
                let inside = target
                    .strip_prefix(&self.root)
                    .map_err(|_| Escape::AbsoluteTarget(target.clone()))?;
                resolved.clear();
                prepend(&mut pending, inside);
            } else {
                prepend(&mut pending, &target);
            }
        }

        Ok(resolved.iter().collect())
    }

    /// Symlink target at `rel`, preferring what the archive planted
    fn link_at(&self, rel: &Path) -> Option<PathBuf> {
        match self.planted.get(rel) {
            Some(Node::Link(target)) => return Some(target.clone()),
            Some(Node::Replaced) => return None,
            None => {}
        }
        let on_disk = self.root.join(rel);
        match fs::symlink_metadata(&on_disk) {
            Ok(meta) if meta.file_type().is_symlink() => fs::read_link(&on_disk).ok(),
            _ => None,
        }
    }
}

/// Push the components of `path` onto the front of `queue`, in order
fn prepend(queue: &mut VecDeque<OsString>, path: &Path) {
    let parts: Vec<OsString> = path
        .components()
        .map(|c| match c {
            Component::RootDir | Component::Prefix(_) => OsString::from("/"),
            other => other.as_os_str().to_os_string(),
        })
        .collect();
    for part in parts.into_iter().rev() {
        queue.push_front(part);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn tree() -> (TempDir, VirtualTree) {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        (dir, VirtualTree::new(&root))
    }

    #[test]
    fn test_plain_path() {
        let (_dir, tree) = tree();
        assert_eq!(
            tree.resolve(Path::new("pkg/src/a.c"), false).unwrap(),
            PathBuf::from("pkg/src/a.c")
        );
    }

    #[test]
    fn test_planted_link_in_parent_inside_root() {
        let (_dir, mut tree) = tree();
        tree.plant(PathBuf::from("pkg/lib"), PathBuf::from("lib64"));
        assert_eq!(
            tree.resolve(Path::new("pkg/lib/libfoo.so"), false).unwrap(),
            PathBuf::from("pkg/lib64/libfoo.so")
        );
    }

    #[test]
    fn test_planted_link_escape_through_parent() {
        let (_dir, mut tree) = tree();
        tree.plant(PathBuf::from("evil"), PathBuf::from("../.."));
        assert!(matches!(
            tree.resolve(Path::new("evil/etc/passwd"), false),
            Err(Escape::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_last_component_not_followed() {
        let (_dir, mut tree) = tree();
        tree.plant(PathBuf::from("link"), PathBuf::from("../outside"));
        assert_eq!(tree.resolve(Path::new("link"), false).unwrap(), PathBuf::from("link"));
        assert!(tree.resolve(Path::new("link"), true).is_err());
    }

    #[test]
    fn test_link_target_relative_to_link_dir() {
        let (_dir, tree) = tree();
        assert_eq!(
            tree.resolve_link_target(Path::new("pkg/bin"), Path::new("../lib/tool")).unwrap(),
            PathBuf::from("pkg/lib/tool")
        );
        assert!(tree.resolve_link_target(Path::new("pkg"), Path::new("../../x")).is_err());
        assert!(matches!(
            tree.resolve_link_target(Path::new("pkg"), Path::new("/etc/passwd")),
            Err(Escape::AbsoluteTarget(_))
        ));
    }

    #[test]
    fn test_existing_symlink_on_disk() {
        let (dir, tree) = tree();
        let outside = TempDir::new().unwrap();
        symlink(outside.path(), dir.path().join("sneaky")).unwrap();
        assert!(matches!(
            tree.resolve(Path::new("sneaky/file"), false),
            Err(Escape::AbsoluteTarget(_))
        ));

        fs::create_dir(dir.path().join("real")).unwrap();
        symlink("real", dir.path().join("alias")).unwrap();
        assert_eq!(
            tree.resolve(Path::new("alias/file"), false).unwrap(),
            PathBuf::from("real/file")
        );
    }

    #[test]
    fn test_replaced_entry_hides_disk_link() {
        let (dir, mut tree) = tree();
        let outside = TempDir::new().unwrap();
        symlink(outside.path(), dir.path().join("pkg")).unwrap();
        assert!(tree.is_link(Path::new("pkg")));

        tree.replace(PathBuf::from("pkg"));
        assert!(!tree.is_link(Path::new("pkg")));

        tree.plant(PathBuf::from("pkg"), PathBuf::from("real"));
        assert_eq!(
            tree.resolve(Path::new("pkg/file"), false).unwrap(),
            PathBuf::from("real/file")
        );
    }

    #[test]
    fn test_link_loop() {
        let (_dir, mut tree) = tree();
        tree.plant(PathBuf::from("a"), PathBuf::from("b"));
        tree.plant(PathBuf::from("b"), PathBuf::from("a"));
        assert_eq!(tree.resolve(Path::new("a/file"), false), Err(Escape::LinkLoop));
    }
}
