// src/filesystem/path.rs

//! Path sanitization utilities for security
//!
//! Archive member names, sub-path filters and download file names all come
//! from untrusted sources (upstream tarballs, recipe files, URLs). These
//! helpers normalize them and reject anything that could climb out of the
//! directory it is meant to live in.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Normalize an archive member name into a relative path
///
/// - `.` components are dropped, so `./pkg/setup.py` becomes `pkg/setup.py`
/// - the archive root itself (`.`, `./`) normalizes to an empty path
/// - absolute names and any `..` component are rejected outright
///
/// # Examples
///
/// ```
/// use crossbake::filesystem::path::normalize_member_name;
/// use std::path::PathBuf;
///
/// assert_eq!(normalize_member_name("./pkg-1.0/setup.py").unwrap(), PathBuf::from("pkg-1.0/setup.py"));
/// assert!(normalize_member_name("../../etc/passwd").is_err());
/// assert!(normalize_member_name("/etc/passwd").is_err());
/// ```
pub fn normalize_member_name(name: &str) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();

    for component in Path::new(name).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal {
                    member: name.to_string(),
                    resolved: PathBuf::from(name),
                    reason: "member name contains a parent directory component".to_string(),
                });
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(Error::PathTraversal {
                    member: name.to_string(),
                    resolved: PathBuf::from(name),
                    reason: "member name is absolute".to_string(),
                });
            }
        }
    }

    Ok(normalized)
}

/// Sanitize a sub-path filter
///
/// `.` and the empty path select the whole archive and normalize to an
/// empty path. Absolute paths and `..` are rejected.
pub fn sanitize_subpath(subpath: impl AsRef<Path>) -> Result<PathBuf> {
    let subpath = subpath.as_ref();
    let mut normalized = PathBuf::new();

    for component in subpath.components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                return Err(Error::InvalidPath(format!(
                    "archive sub-path must be relative and stay inside the archive: {}",
                    subpath.display()
                )));
            }
        }
    }

    Ok(normalized)
}

/// Strip `subpath` from a normalized member path
///
/// Returns `None` when the member does not live under `subpath`. The
/// comparison is component-wise, so `pkg` does not match `pkg-extra/file`.
pub fn strip_subpath(member: &Path, subpath: &Path) -> Option<PathBuf> {
    member.strip_prefix(subpath).ok().map(Path::to_path_buf)
}

/// Compute the deepest directory that contains every path in `paths`
///
/// All paths must be of the same kind (all absolute or all relative).
/// Returns `None` for an empty input.
pub fn common_ancestor<P: AsRef<Path>>(paths: &[P]) -> Option<PathBuf> {
    let (first, rest) = paths.split_first()?;
    let mut common: Vec<Component<'_>> = first.as_ref().components().collect();

    for path in rest {
        let shared = common
            .iter()
            .zip(path.as_ref().components())
            .take_while(|(a, b)| **a == *b)
            .count();
        common.truncate(shared);
    }

    Some(common.iter().collect())
}

/// Sanitize a filename (single path component) from an untrusted source
///
/// Used for the local name of downloaded archives, which is taken from
/// the last URL segment.
///
/// # Examples
///
/// ```
/// use crossbake::filesystem::path::sanitize_filename;
///
/// assert_eq!(sanitize_filename("pandas-1.5.0.tar.gz").unwrap(), "pandas-1.5.0.tar.gz");
/// assert!(sanitize_filename("../pandas.tar.gz").is_err());
/// assert!(sanitize_filename("subdir/pandas.tar.gz").is_err());
/// ```
pub fn sanitize_filename(name: &str) -> Result<String> {
    if name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidPath(format!(
            "Filename contains path separator: {}",
            name
        )));
    }

    if name == ".." || name == "." {
        return Err(Error::InvalidPath(format!("Invalid filename: {}", name)));
    }

    if name.is_empty() {
        return Err(Error::InvalidPath("Empty filename".to_string()));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_member_name_normal() {
        assert_eq!(
            normalize_member_name("pkg-1.0/src/a.c").unwrap(),
            PathBuf::from("pkg-1.0/src/a.c")
        );
        assert_eq!(
            normalize_member_name("pkg-1.0/./src/").unwrap(),
            PathBuf::from("pkg-1.0/src")
        );
    }

    #[test]
    fn test_normalize_member_name_root() {
        assert_eq!(normalize_member_name(".").unwrap(), PathBuf::new());
        assert_eq!(normalize_member_name("./").unwrap(), PathBuf::new());
    }

    #[test]
    fn test_normalize_member_name_traversal_rejected() {
        assert!(normalize_member_name("..").is_err());
        assert!(normalize_member_name("../etc/passwd").is_err());
        assert!(normalize_member_name("pkg/../../etc/passwd").is_err());
        assert!(normalize_member_name("pkg/../setup.py").is_err());
        assert!(normalize_member_name("/etc/passwd").is_err());
    }

    #[test]
    fn test_normalize_member_name_error_names_member() {
        match normalize_member_name("a/../../b") {
            Err(Error::PathTraversal { member, .. }) => assert_eq!(member, "a/../../b"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_sanitize_subpath() {
        assert_eq!(sanitize_subpath(".").unwrap(), PathBuf::new());
        assert_eq!(sanitize_subpath("").unwrap(), PathBuf::new());
        assert_eq!(sanitize_subpath("./pkg-1.0/").unwrap(), PathBuf::from("pkg-1.0"));
        assert!(sanitize_subpath("../outside").is_err());
        assert!(sanitize_subpath("/abs").is_err());
    }

    #[test]
    fn test_strip_subpath() {
        let sub = Path::new("pkg-1.0");
        assert_eq!(
            strip_subpath(Path::new("pkg-1.0/src/a.c"), sub),
            Some(PathBuf::from("src/a.c"))
        );
        assert_eq!(strip_subpath(Path::new("pkg-1.0"), sub), Some(PathBuf::new()));
        assert_eq!(strip_subpath(Path::new("pkg-1.0-docs/readme"), sub), None);
        assert_eq!(strip_subpath(Path::new("other/file"), sub), None);
        assert_eq!(
            strip_subpath(Path::new("anything/at/all"), Path::new("")),
            Some(PathBuf::from("anything/at/all"))
        );
    }

    #[test]
    fn test_common_ancestor() {
        let paths = [
            PathBuf::from("/x/unpack/pkg/setup.py"),
            PathBuf::from("/x/unpack/pkg/src/a.c"),
        ];
        assert_eq!(common_ancestor(&paths), Some(PathBuf::from("/x/unpack/pkg")));

        let single = [PathBuf::from("/x/unpack/pkg")];
        assert_eq!(common_ancestor(&single), Some(PathBuf::from("/x/unpack/pkg")));

        let diverging = [PathBuf::from("/x/a"), PathBuf::from("/y/b")];
        assert_eq!(common_ancestor(&diverging), Some(PathBuf::from("/")));

        let empty: [PathBuf; 0] = [];
        assert_eq!(common_ancestor(&empty), None);
    }

    #[test]
    fn test_sanitize_filename_path_rejected() {
        assert!(sanitize_filename("../package.tar.gz").is_err());
        assert!(sanitize_filename("subdir/package.tar.gz").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename(".").is_err());
        assert!(sanitize_filename("").is_err());
    }
}
