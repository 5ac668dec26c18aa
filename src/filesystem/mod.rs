// src/filesystem/mod.rs

//! Filesystem helpers for handling paths from untrusted archives

pub mod path;

pub use path::{common_ancestor, normalize_member_name, sanitize_filename, sanitize_subpath, strip_subpath};
