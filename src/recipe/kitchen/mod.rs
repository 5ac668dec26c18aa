// src/recipe/kitchen/mod.rs

//! Kitchen: where discovered packages are cooked into wheels
//!
//! The Kitchen owns the run-wide configuration and the source fetcher and
//! hands both to each [`Cook`]. It handles:
//! - Cooking a single package through every pipeline state
//! - Running a whole package set, sequentially or on a worker pool
//! - Aborting the run when the toolchain itself is unusable

mod config;
mod cook;
pub mod fetch;
pub mod stages;

pub use config::{ConfigFile, KitchenConfig, KitchenSection, TargetConfig};
pub use cook::{artifact_name, Cook, CookFailure, CookResult, CookState, DEFAULT_ARTIFACT_PATTERN};
pub use fetch::{HttpFetcher, SourceFetcher};

use crate::error::{Error, Result};
use crate::recipe::discover::DiscoveredPackage;
use crate::shell::is_cancelled;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of one cook
pub type CookOutcome = std::result::Result<CookResult, CookFailure>;

/// Per-package outcomes of a run, in discovery order
#[derive(Debug, Default)]
pub struct RunReport {
    pub succeeded: Vec<CookResult>,
    pub failed: Vec<CookFailure>,
}

impl RunReport {
    fn record(&mut self, outcome: CookOutcome) {
        match outcome {
            Ok(result) => self.succeeded.push(result),
            Err(failure) => {
                error!("Failed to build {}", failure);
                self.failed.push(failure);
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
    fetcher: Arc<dyn SourceFetcher>,
}

impl Kitchen {
    /// Create a new Kitchen with the given configuration and source fetcher
    pub fn new(config: KitchenConfig, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Create a Kitchen that downloads sources over HTTPS
    pub fn with_http(config: KitchenConfig) -> Result<Self> {
        Ok(Self::new(config, Arc::new(HttpFetcher::new()?)))
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    /// Cook one package
    pub fn cook(&self, package: &DiscoveredPackage) -> CookOutcome {
        info!("Cooking {}", package.label());
        Cook::new(self, package).run()
    }

    /// Cook every package, isolating failures from each other
    ///
    /// The first package runs alone. If its toolchain activation fails the
    /// SDK is unusable, so the run stops with [`Error::ToolchainActivation`]
    /// instead of failing every remaining package the same way. A cancelled
    /// run returns [`Error::Cancelled`].
    pub fn cook_all(&self, packages: &[DiscoveredPackage]) -> Result<RunReport> {
        let mut report = RunReport::default();
        let Some((first, rest)) = packages.split_first() else {
            info!("No packages to cook");
            return Ok(report);
        };

        match self.cook(first) {
            Err(failure) if failure.is_activation_failure() => {
                let reason = match failure.error {
                    Error::ToolchainActivation(reason) => reason,
                    other => other.to_string(),
                };
                return Err(Error::ToolchainActivation(format!(
                    "{} (first package {}); not building the remaining {} package(s)",
                    reason,
                    failure.package,
                    rest.len()
                )));
            }
            outcome => report.record(outcome),
        }

        if self.config.jobs > 1 && rest.len() > 1 {
            info!("Cooking {} packages with {} jobs", rest.len(), self.config.jobs);
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.jobs)
                .build()
                .map_err(|e| Error::IoError(format!("Failed to start build workers: {}", e)))?;
            let outcomes: Vec<CookOutcome> =
                pool.install(|| rest.par_iter().map(|package| self.cook(package)).collect());
            for outcome in outcomes {
                report.record(outcome);
            }
        } else {
            for package in rest {
                report.record(self.cook(package));
            }
        }

        if is_cancelled() {
            return Err(Error::Cancelled);
        }
        info!(
            "Cooked {} of {} package(s)",
            report.succeeded.len(),
            report.total()
        );
        Ok(report)
    }
}
