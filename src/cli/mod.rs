// src/cli/mod.rs
//! CLI definitions for crossbake
//!
//! This module contains the command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `cook` - Discover packages and cross-build a wheel for each
//! - `unpack` - Safely extract one source archive
//! - `validate` - Parse and check every recipe without building

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crossbake")]
#[command(author = "Crossbake Contributors")]
#[command(version)]
#[command(about = "Cross-build Python wheels inside an activated SDK shell", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every package under a package root
    Cook {
        /// Directory tree holding one recipe.toml per package
        #[arg(long)]
        packages: PathBuf,

        /// Cross SDK directory containing the activation script
        #[arg(long)]
        sdk: PathBuf,

        /// Scratch root for per-package build trees (relative to the parent of --packages)
        #[arg(long, default_value = "build")]
        build_root: PathBuf,

        /// Output root for built wheels (relative to the parent of --packages)
        #[arg(long, default_value = "dist")]
        dist_root: PathBuf,

        /// Number of packages to build in parallel
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Per-command timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Target and kitchen configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stream every build output line
        #[arg(short, long)]
        verbose: bool,

        /// Only build packages with this name or path label (repeatable)
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,
    },

    /// Extract a source archive, refusing anything that escapes the destination
    Unpack {
        /// Archive file (tar, tar.gz, tar.bz2, tar.xz, tar.zst or zip)
        archive: PathBuf,

        /// Destination directory
        destination: PathBuf,

        /// Only extract members under this path, with the prefix stripped
        #[arg(long, default_value = ".")]
        subpath: PathBuf,

        /// Log every extracted member
        #[arg(short, long)]
        verbose: bool,
    },

    /// Parse and validate every recipe under a package root
    Validate {
        /// Directory tree holding one recipe.toml per package
        #[arg(long)]
        packages: PathBuf,
    },
}

impl Commands {
    /// Whether verbose logging was requested
    pub fn verbose(&self) -> bool {
        match self {
            Self::Cook { verbose, .. } | Self::Unpack { verbose, .. } => *verbose,
            Self::Validate { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cook_defaults() {
        let cli = Cli::parse_from(["crossbake", "cook", "--packages", "pkgs", "--sdk", "/opt/sdk"]);
        match cli.command {
            Commands::Cook {
                build_root,
                dist_root,
                jobs,
                only,
                verbose,
                ..
            } => {
                assert_eq!(build_root, PathBuf::from("build"));
                assert_eq!(dist_root, PathBuf::from("dist"));
                assert_eq!(jobs, None);
                assert!(only.is_empty());
                assert!(!verbose);
            }
            _ => panic!("expected cook"),
        }
    }

    #[test]
    fn test_cook_repeatable_only() {
        let cli = Cli::parse_from([
            "crossbake", "cook", "--packages", "p", "--sdk", "s", "--only", "pandas", "--only",
            "prefect", "-v",
        ]);
        assert!(cli.command.verbose());
        match cli.command {
            Commands::Cook { only, .. } => assert_eq!(only, vec!["pandas", "prefect"]),
            _ => panic!("expected cook"),
        }
    }

    #[test]
    fn test_unpack_verbose_sets_log_level() {
        let cli = Cli::parse_from(["crossbake", "unpack", "pkg.tar.bz2", "out", "-v"]);
        assert!(cli.command.verbose());

        let quiet = Cli::parse_from(["crossbake", "unpack", "pkg.tar.bz2", "out"]);
        assert!(!quiet.command.verbose());
        match quiet.command {
            Commands::Unpack { subpath, .. } => assert_eq!(subpath, PathBuf::from(".")),
            _ => panic!("expected unpack"),
        }
    }
}
