// src/commands/cook.rs

//! Cook command - cross-build every discovered package

use super::{package_base, resolve_against};
use anyhow::{Context, Result};
use crossbake::recipe::kitchen::ConfigFile;
use crossbake::recipe::{discover_packages, DiscoveredPackage, Kitchen, KitchenConfig, RunReport};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

/// Cook all packages under a package root
///
/// # Arguments
/// * `packages` - Package root holding one `recipe.toml` per package
/// * `sdk` - Cross SDK directory
/// * `build_root` / `dist_root` - Output roots, relative to the package root's parent
/// * `jobs` - Parallel package builds (None = config file or 1)
/// * `timeout` - Per-command timeout in seconds
/// * `config_path` - Optional TOML file with `[target]` and `[kitchen]` tables
/// * `verbose` - Stream build output instead of printing it only on failure
/// * `only` - Restrict the run to these package names or labels
#[allow(clippy::too_many_arguments)]
pub fn cmd_cook(
    packages: &Path,
    sdk: &Path,
    build_root: &Path,
    dist_root: &Path,
    jobs: Option<usize>,
    timeout: Option<u64>,
    config_path: Option<&Path>,
    verbose: bool,
    only: &[String],
) -> Result<ExitCode> {
    let (packages, base) = package_base(packages)?;
    let build_root = resolve_against(&base, build_root);
    let dist_root = resolve_against(&base, dist_root);
    let sdk = std::fs::canonicalize(sdk)
        .with_context(|| format!("SDK directory not found: {}", sdk.display()))?;

    let mut config = KitchenConfig::new(sdk).with_verbose(verbose);
    if let Some(path) = config_path {
        config = ConfigFile::load(path)
            .and_then(|file| file.apply(config))
            .with_context(|| format!("Failed to load configuration: {}", path.display()))?;
    }
    if let Some(jobs) = jobs {
        config = config.with_jobs(jobs);
    }
    if let Some(secs) = timeout {
        config = config.with_command_timeout(Some(Duration::from_secs(secs)));
    }

    let discovered = discover_packages(&packages, &build_root, &dist_root)
        .with_context(|| format!("Failed to discover packages in {}", packages.display()))?;
    let selected = select_packages(discovered, only);
    if selected.is_empty() {
        anyhow::bail!("No packages to build in {}", packages.display());
    }

    println!(
        "Cooking {} package(s) with {} job(s) using SDK {}",
        selected.len(),
        config.jobs,
        config.sdk_path.display()
    );
    println!("  - build root: {}", build_root.display());
    println!("  - dist root:  {}", dist_root.display());

    crossbake::shell::install_signal_handlers().context("Failed to install signal handlers")?;
    let kitchen = Kitchen::with_http(config).context("Failed to set up the kitchen")?;
    let report = kitchen.cook_all(&selected).context("Build run aborted")?;

    print_report(&report, verbose);
    info!(
        "Run finished: {} built, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

/// Keep packages whose label or top-level directory is named in `only`
fn select_packages(packages: Vec<DiscoveredPackage>, only: &[String]) -> Vec<DiscoveredPackage> {
    if only.is_empty() {
        return packages;
    }
    packages
        .into_iter()
        .filter(|package| {
            let label = package.label();
            let top = package
                .relative
                .components()
                .next()
                .map(|c| c.as_os_str().to_string_lossy().into_owned());
            only.iter()
                .any(|name| *name == label || top.as_deref() == Some(name.as_str()))
        })
        .collect()
}

fn print_report(report: &RunReport, verbose: bool) {
    if !report.succeeded.is_empty() {
        println!("\n[COMPLETE] Built {} package(s):", report.succeeded.len());
        for result in &report.succeeded {
            println!(
                "  - {} {}: {}",
                result.package,
                result.version,
                result.artifact.display()
            );
            for warning in &result.warnings {
                println!("      warning: {}", warning);
            }
        }
    }

    if !report.failed.is_empty() {
        println!("\n[FAILED] {} package(s) failed:", report.failed.len());
        for failure in &report.failed {
            println!("  - {}", failure);
            // Verbose runs already streamed this output
            if !verbose && let Some(output) = failure.error.command_output() {
                for line in output.lines() {
                    println!("      | {}", line);
                }
            }
        }
    }
}
