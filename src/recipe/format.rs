// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Each package directory carries a `recipe.toml` describing where its
//! source comes from and which `setup.py` stages build it.

use crate::error::Result;
use crate::filesystem::path::sanitize_filename;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete recipe for building a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Package metadata
    pub package: PackageSection,

    /// Where the source archive comes from
    pub source: SourceSpec,

    /// Build instructions
    #[serde(default)]
    pub build: BuildSection,
}

impl Recipe {
    /// Package name, falling back to the repository name for GitHub sources
    pub fn name(&self) -> &str {
        match (&self.package.name, &self.source) {
            (Some(name), _) => name,
            (None, SourceSpec::GithubRelease { repo, .. })
            | (None, SourceSpec::GithubArchive { repo, .. }) => repo,
            (None, SourceSpec::Url { .. }) => "",
        }
    }

    pub fn version(&self) -> &str {
        &self.package.version
    }
}

/// Package metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSection {
    /// Package name (defaults to the repo for GitHub sources)
    #[serde(default)]
    pub name: Option<String>,

    /// Package version
    pub version: String,
}

/// Source descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceSpec {
    /// An sdist attached to a GitHub release
    GithubRelease {
        org: String,
        repo: String,
        tag: String,
        /// Asset file name, e.g. `pandas-1.5.0.tar.gz`
        archive: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        checksum: Option<String>,
    },

    /// The zip GitHub generates for a tag
    GithubArchive {
        org: String,
        repo: String,
        tag: String,
        /// Directory inside the archive holding `setup.py`
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        checksum: Option<String>,
    },

    /// Any other downloadable archive
    Url {
        url: String,
        /// Local file name; defaults to the last URL segment
        #[serde(default)]
        archive_name: Option<String>,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        checksum: Option<String>,
    },
}

impl SourceSpec {
    /// Download URL
    pub fn url(&self) -> String {
        match self {
            Self::GithubRelease {
                org,
                repo,
                tag,
                archive,
                ..
            } => format!(
                "https://github.com/{}/{}/releases/download/{}/{}",
                org, repo, tag, archive
            ),
            Self::GithubArchive { org, repo, tag, .. } => format!(
                "https://github.com/{}/{}/archive/refs/tags/{}.zip",
                org, repo, tag
            ),
            Self::Url { url, .. } => url.clone(),
        }
    }

    /// File name the download is saved under
    pub fn archive_name(&self) -> Result<String> {
        let name = match self {
            Self::GithubRelease { archive, .. } => archive.clone(),
            Self::GithubArchive { tag, .. } => format!("{}.zip", tag),
            Self::Url {
                archive_name: Some(name),
                ..
            } => name.clone(),
            Self::Url { url, .. } => {
                let trimmed = url.split(['?', '#']).next().unwrap_or(url);
                trimmed.rsplit('/').next().unwrap_or_default().to_string()
            }
        };
        sanitize_filename(&name)
    }

    /// Sub-path inside the archive to unpack; `.` for the whole archive
    pub fn subpath(&self) -> &str {
        let path = match self {
            Self::GithubRelease { path, .. }
            | Self::GithubArchive { path, .. }
            | Self::Url { path, .. } => path.as_deref(),
        };
        path.filter(|p| !p.is_empty()).unwrap_or(".")
    }

    /// Declared checksum, as `sha256:<hex>`
    pub fn checksum(&self) -> Option<&str> {
        match self {
            Self::GithubRelease { checksum, .. }
            | Self::GithubArchive { checksum, .. }
            | Self::Url { checksum, .. } => checksum.as_deref(),
        }
    }

    /// Short description for log lines
    pub fn describe(&self) -> String {
        match self {
            Self::GithubRelease { org, repo, tag, archive, .. } => {
                format!("sdist {} from github {}/{}@{}", archive, org, repo, tag)
            }
            Self::GithubArchive { org, repo, tag, .. } => {
                format!("tag archive of github {}/{}@{}", org, repo, tag)
            }
            Self::Url { url, .. } => format!("archive {}", url),
        }
    }
}

/// Build instructions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSection {
    /// `setup.py` subcommands, run in order
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,

    /// Build-time pip requirements
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Extra variables exported before the build stages
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Regex with one capture group that finds the artifact name in the build output
    #[serde(default)]
    pub artifact_pattern: Option<String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            dependencies: Vec::new(),
            environment: BTreeMap::new(),
            artifact_pattern: None,
        }
    }
}

fn default_stages() -> Vec<String> {
    vec!["bdist_wheel".to_string()]
}
