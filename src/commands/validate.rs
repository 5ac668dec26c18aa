// src/commands/validate.rs

//! Validate command - check every recipe without building

use super::package_base;
use anyhow::{Context, Result};
use crossbake::recipe::{discover_packages, validate_recipe};
use std::path::Path;
use std::process::ExitCode;

/// Parse and validate the recipe of every package under `packages`
pub fn cmd_validate(packages: &Path) -> Result<ExitCode> {
    let (packages, base) = package_base(packages)?;
    let discovered = discover_packages(&packages, &base.join("build"), &base.join("dist"))
        .with_context(|| format!("Failed to discover packages in {}", packages.display()))?;

    let mut invalid = 0;
    for package in &discovered {
        let checked = package
            .load_recipe()
            .and_then(|recipe| validate_recipe(&recipe).map(|warnings| (recipe, warnings)));
        match checked {
            Ok((recipe, warnings)) => {
                println!(
                    "[OK] {} {} ({})",
                    recipe.name(),
                    recipe.version(),
                    recipe.source.describe()
                );
                for warning in &warnings {
                    println!("  Warning: {}", warning);
                }
            }
            Err(e) => {
                invalid += 1;
                println!("[INVALID] {}: {}", package.label(), e);
            }
        }
    }

    println!(
        "\n{} recipe(s) checked, {} invalid",
        discovered.len(),
        invalid
    );
    if invalid == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}
