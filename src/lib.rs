// src/lib.rs

//! Crossbake
//!
//! Cross-builds Python packages into wheels for an embedded Linux target.
//! Each package is fetched, unpacked and built inside a long-lived shell
//! with the target SDK's environment sourced into it.
//!
//! # Architecture
//!
//! - Unpack: validated extraction of untrusted tar and zip sources
//! - Shell: one persistent shell per package, with per-command exit status
//! - Kitchen: the per-package pipeline from recipe to collected wheel

pub mod compression;
mod error;
pub mod filesystem;
pub mod recipe;
pub mod shell;
pub mod unpack;

pub use error::{Error, Result};
pub use recipe::{
    Cook, CookFailure, CookResult, CookState, Kitchen, KitchenConfig, Recipe, RunReport,
};
pub use shell::{CommandResult, ShellConfig, ShellSession};
pub use unpack::{unpack, Archive, ArchiveFormat};
