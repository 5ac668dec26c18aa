// src/recipe/mod.rs

//! Recipe system for cross-building Python packages from source
//!
//! Every package directory carries a declarative `recipe.toml` naming:
//! - Where the source archive comes from, and its checksum
//! - The sub-path inside the archive that holds `setup.py`
//! - Build-time pip dependencies and extra environment
//! - The `setup.py` stages to run
//!
//! # Culinary Terminology
//!
//! - **Recipe**: The build specification
//! - **Cook**: Build one package from its recipe
//! - **Kitchen**: The configured SDK environment that runs cooks
//!
//! # Example Recipe
//!
//! ```toml
//! [package]
//! name = "pandas"
//! version = "1.5.0"
//!
//! [source]
//! type = "github-release"
//! org = "pandas-dev"
//! repo = "pandas"
//! tag = "v1.5.0"
//! archive = "pandas-1.5.0.tar.gz"
//!
//! [build]
//! stages = ["build_ext", "bdist_wheel"]
//! dependencies = ["numpy", "Cython>=0.29.32,<3", "setuptools>=51.0.0"]
//! ```

pub mod discover;
pub mod format;
pub mod kitchen;
pub mod parser;

pub use discover::{discover_packages, BuildPaths, DiscoveredPackage, RECIPE_FILE};
pub use format::{BuildSection, PackageSection, Recipe, SourceSpec};
pub use kitchen::{
    Cook, CookFailure, CookResult, CookState, Kitchen, KitchenConfig, RunReport, TargetConfig,
};
pub use parser::{parse_recipe, parse_recipe_file, validate_recipe};
