// src/recipe/kitchen/stages.rs

//! `setup.py` stage arguments and build dependency adjustments

use super::config::TargetConfig;
use std::path::Path;

/// Stages that take directory arguments
const KNOWN_STAGES: &[&str] = &["build_ext", "bdist_wheel"];

/// numpy as a build dependency means the package compiles against its C API
const NUMPY_PIN: &str = "numpy>=1.19.0,<1.25";

pub fn is_known_stage(stage: &str) -> bool {
    KNOWN_STAGES.contains(&stage)
}

/// Extra `setup.py` arguments for a stage
///
/// Unknown stages get no arguments.
pub fn args_for_stage(stage: &str, build_dir: &Path, dist_dir: &Path, target: &TargetConfig) -> Vec<String> {
    match stage {
        "build_ext" => vec![
            format!("--build-lib={}", build_dir.display()),
            format!("--build-temp={}", build_dir.display()),
        ],
        "bdist_wheel" => vec![
            format!("--dist-dir={}", dist_dir.display()),
            format!("--bdist-dir={}", build_dir.display()),
            format!("--plat-name={}", target.plat_name),
        ],
        _ => Vec::new(),
    }
}

/// Rewrite build dependencies to versions that work against the target
pub fn pin_build_dependency(dep: &str) -> String {
    if dep == "numpy" {
        NUMPY_PIN.to_string()
    } else {
        dep.to_string()
    }
}
