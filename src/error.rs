// src/error.rs

//! Error types for crossbake

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while unpacking sources, driving the SDK shell, or cooking packages
#[derive(Error, Debug)]
pub enum Error {
    /// The archive is malformed, truncated, or in an unreadable format
    #[error("archive {} is unreadable: {reason}", archive.display())]
    ArchiveIntegrity { archive: PathBuf, reason: String },

    /// An archive member or link tried to escape the extraction root
    ///
    /// This may indicate a compromised upstream artifact and is never retried.
    #[error("will not unpack archive member {member}: {reason} (resolves to {})", resolved.display())]
    PathTraversal {
        member: String,
        resolved: PathBuf,
        reason: String,
    },

    /// Nothing in the archive matched the requested sub-path
    #[error("no members of {} are under sub-path {}", archive.display(), subpath.display())]
    EmptyExtraction { archive: PathBuf, subpath: PathBuf },

    /// The shell process exited or became unreachable outside a command
    #[error("shell session failed: {0}")]
    SessionProcess(String),

    /// A command did not finish before the session timeout and the shell was terminated
    #[error("command timed out after {secs}s and the shell was terminated: {command}")]
    SessionTimedOut { command: String, secs: u64 },

    /// The run was interrupted and its shell sessions were terminated
    #[error("build run cancelled")]
    Cancelled,

    /// A command completed with a non-zero exit status
    #[error("command failed: {command} returned code {status}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },

    /// Sourcing the SDK activation script failed
    #[error("toolchain activation failed: {0}")]
    ToolchainActivation(String),

    /// The build finished but no artifact could be located
    #[error("build produced no artifact: {0}")]
    ArtifactNotFound(String),

    /// Downloaded content does not match the declared checksum
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("download failed: {0}")]
    DownloadError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Captured output of a failed command, if this error carries any
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}
