// src/recipe/kitchen/cook.rs

//! Cook: the build pipeline for a single package
//!
//! A cook walks one package through fetch, unpack, toolchain activation,
//! the `setup.py` stages and artifact collection. The state it reached is
//! kept so a failure can say how far the package got.

use super::Kitchen;
use super::stages::{args_for_stage, pin_build_dependency};
use crate::error::{Error, Result};
use crate::filesystem::path::sanitize_filename;
use crate::recipe::discover::DiscoveredPackage;
use crate::recipe::format::Recipe;
use crate::recipe::parser::validate_recipe;
use crate::shell::{ShellSession, TracingEcho, is_cancelled, join, quote};
use crate::unpack::{Archive, unpack as unpack_archive};
use regex::RegexBuilder;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Matches the line `bdist_wheel` prints when it writes the wheel
pub const DEFAULT_ARTIFACT_PATTERN: &str = r"^creating.*?([\w\-\.]*\.whl).*$";

/// How far a package got through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CookState {
    Discovered,
    Fetched,
    Unpacked,
    EnvironmentActivated,
    Built,
    Collected,
}

impl CookState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Fetched => "fetched",
            Self::Unpacked => "unpacked",
            Self::EnvironmentActivated => "environment activated",
            Self::Built => "built",
            Self::Collected => "collected",
        }
    }
}

impl fmt::Display for CookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package that was built
#[derive(Debug)]
pub struct CookResult {
    pub package: String,
    pub version: String,
    /// Path of the built wheel inside the package's dist directory
    pub artifact: PathBuf,
    pub state: CookState,
    /// Commands submitted to the build shell, in order
    pub log: Vec<String>,
    /// Non-fatal recipe problems
    pub warnings: Vec<String>,
}

/// A package that failed, and the last state it reached
#[derive(Debug)]
pub struct CookFailure {
    pub package: String,
    pub state: CookState,
    pub error: Error,
}

impl CookFailure {
    /// The SDK environment could not be activated
    ///
    /// Raised for the first package of a run, this means the toolchain itself
    /// is broken and no other package can succeed either.
    pub fn is_activation_failure(&self) -> bool {
        self.state == CookState::Unpacked && matches!(self.error, Error::ToolchainActivation(_))
    }
}

impl fmt::Display for CookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (last state: {})", self.package, self.error, self.state)
    }
}

/// Scratch directories under a package's build path
struct WorkDirs {
    download: PathBuf,
    build: PathBuf,
    unpack: PathBuf,
    venv: PathBuf,
}

impl WorkDirs {
    fn new(build_path: &Path) -> Self {
        Self {
            download: build_path.join("download"),
            build: build_path.join("build"),
            unpack: build_path.join("unpack"),
            venv: build_path.join("venv"),
        }
    }

    fn create(&self, dist_path: &Path) -> Result<()> {
        for dir in [&self.download, &self.build, dist_path] {
            fs::create_dir_all(dir).map_err(|e| {
                Error::IoError(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        // venv/ is created by `python -m venv`; only its parent must exist
        Ok(())
    }
}

/// A single cook operation
pub struct Cook<'a> {
    kitchen: &'a Kitchen,
    package: &'a DiscoveredPackage,
    name: String,
    state: CookState,
    log: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> Cook<'a> {
    pub(super) fn new(kitchen: &'a Kitchen, package: &'a DiscoveredPackage) -> Self {
        Self {
            kitchen,
            package,
            name: package.label(),
            state: CookState::Discovered,
            log: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Run the pipeline to completion or to the first error
    pub(super) fn run(mut self) -> std::result::Result<CookResult, CookFailure> {
        match self.cook() {
            Ok((version, artifact)) => Ok(CookResult {
                package: self.name,
                version,
                artifact,
                state: self.state,
                log: self.log,
                warnings: self.warnings,
            }),
            Err(error) => Err(CookFailure {
                package: self.name,
                state: self.state,
                error,
            }),
        }
    }

    fn cook(&mut self) -> Result<(String, PathBuf)> {
        if is_cancelled() {
            return Err(Error::Cancelled);
        }
        let recipe = self.package.load_recipe()?;
        self.name = recipe.name().to_string();
        self.warnings = validate_recipe(&recipe)?;
        for warning in &self.warnings {
            warn!("{}: {}", self.name, warning);
        }

        let paths = &self.package.paths;
        let dirs = WorkDirs::new(&paths.build_path);
        dirs.create(&paths.dist_path)?;

        let archive = self.fetch(&recipe, &dirs)?;
        let source_root = self.unpack(&recipe, &archive, &dirs)?;

        let mut shell = self.activate(&source_root)?;
        let result = match self.build(&mut shell, &recipe, &dirs) {
            Ok(output) => self.collect(&recipe, &output),
            Err(e) => Err(e),
        };
        shell.close();

        let artifact = result?;
        info!("Cooked {} {} -> {}", self.name, recipe.version(), artifact.display());
        Ok((recipe.version().to_string(), artifact))
    }

    fn fetch(&mut self, recipe: &Recipe, dirs: &WorkDirs) -> Result<PathBuf> {
        info!("Fetching {}: {}", self.name, recipe.source.describe());
        let archive = self.kitchen.fetcher.fetch(&recipe.source, &dirs.download)?;
        self.log_line(format!("fetched {}", archive.display()));
        self.state = CookState::Fetched;
        Ok(archive)
    }

    fn unpack(&mut self, recipe: &Recipe, archive: &Path, dirs: &WorkDirs) -> Result<PathBuf> {
        // A previous run's tree would widen the common ancestor of this one
        if dirs.unpack.exists() {
            fs::remove_dir_all(&dirs.unpack).map_err(|e| {
                Error::IoError(format!("Failed to clear {}: {}", dirs.unpack.display(), e))
            })?;
        }

        let archive = Archive::open(archive)?;
        let root = unpack_archive(&dirs.unpack, &archive, recipe.source.subpath())?;
        self.log_line(format!("unpacked {} to {}", archive.path().display(), root.display()));
        self.state = CookState::Unpacked;
        Ok(root)
    }

    fn activate(&mut self, source_root: &Path) -> Result<ShellSession> {
        let kitchen = self.kitchen;
        let config = &kitchen.config;
        let script = config.activation_script();
        info!("Activating {} for {}", script.display(), self.name);

        let echo = Box::new(TracingEcho::new(config.verbose));
        let mut shell = ShellSession::open_with_echo(source_root, config.shell.clone(), echo)
            .map_err(|e| match e {
                Error::Cancelled => e,
                e => Error::ToolchainActivation(format!("could not start the build shell: {e}")),
            })?;
        shell.activate(&script)?;

        self.log_line(format!("source {}", quote(&script.to_string_lossy())));
        self.state = CookState::EnvironmentActivated;
        Ok(shell)
    }

    /// Run every build command and return the stages' combined output
    fn build(&mut self, shell: &mut ShellSession, recipe: &Recipe, dirs: &WorkDirs) -> Result<String> {
        let kitchen = self.kitchen;
        let target = &kitchen.config.target;
        let venv = dirs.venv.to_string_lossy().into_owned();
        let venv_activate = dirs.venv.join("bin").join("activate");

        self.run_argv(shell, &["python", "-m", "venv", venv.as_str()])?;
        self.run_argv(shell, &["source".to_string(), venv_activate.to_string_lossy().into_owned()])?;

        // The SDK python has no ssl, so pip runs with the host's stdlib on
        // the path. Packages still land in the venv.
        let mut install = vec![
            "python".to_string(),
            "-m".to_string(),
            "pip".to_string(),
            "install".to_string(),
        ];
        install.extend(recipe.build.dependencies.iter().map(|d| pin_build_dependency(d)));
        install.push("wheel".to_string());
        let line = format!(
            "PYTHONPATH={} {}",
            quote(&target.host_python_paths.join(":")),
            join(&install)
        );
        self.run_line(shell, &line)?;

        self.export_target_environment(shell)?;
        for (name, value) in &recipe.build.environment {
            self.log_line(format!("export {}={}", name, quote(value)));
            shell.export_var(name, value)?;
        }

        let mut output = String::new();
        for stage in &recipe.build.stages {
            info!("{}: python setup.py {}", self.name, stage);
            let mut argv = vec!["python".to_string(), "setup.py".to_string(), stage.clone()];
            argv.extend(args_for_stage(
                stage,
                &dirs.build,
                &self.package.paths.dist_path,
                target,
            ));
            output.push_str(&self.run_argv(shell, &argv)?);
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
        }

        self.state = CookState::Built;
        Ok(output)
    }

    /// Point the build tools at the target interpreter and sysroot
    fn export_target_environment(&mut self, shell: &mut ShellSession) -> Result<()> {
        let kitchen = self.kitchen;
        let config = &kitchen.config;
        let target = &config.target;
        let sysroot = target.sysroot(&config.sdk_path).to_string_lossy().into_owned();
        let pythonpath = target
            .target_pythonpath(&config.sdk_path)
            .to_string_lossy()
            .into_owned();

        let exports = [
            ("_PYTHON_HOST_PLATFORM", target.host_platform.as_str()),
            ("_PYTHON_SYSCONFIGDATA_NAME", target.sysconfigdata_name.as_str()),
            ("PYTHONPATH", pythonpath.as_str()),
            ("SETUPTOOLS_USE_DISTUTILS", "stdlib"),
            ("_python_sysroot", sysroot.as_str()),
            ("_python_prefix", "/usr"),
            ("_python_exec_prefix", "/usr"),
            ("PYTHONNOUSERSITE", "1"),
        ];
        for (name, value) in exports {
            debug!("export {}={}", name, value);
            shell.export_var(name, value)?;
        }
        self.log_line(format!("exported target environment for {}", target.toolchain_triple));

        if !target.extra_cflags.is_empty() {
            shell.append_var("CFLAGS", &target.extra_cflags)?;
            shell.append_var("CPPFLAGS", &target.extra_cflags)?;
        }
        Ok(())
    }

    fn collect(&mut self, recipe: &Recipe, output: &str) -> Result<PathBuf> {
        let dist_path = &self.package.paths.dist_path;
        let name = artifact_name(output, recipe.build.artifact_pattern.as_deref())?.ok_or_else(|| {
            Error::ArtifactNotFound(format!("no artifact name in the build output of {}", self.name))
        })?;
        let name = sanitize_filename(&name)?;

        let artifact = dist_path.join(&name);
        if !artifact.is_file() {
            return Err(Error::ArtifactNotFound(format!(
                "{} was reported but does not exist",
                artifact.display()
            )));
        }

        self.log_line(format!("collected {}", name));
        self.state = CookState::Collected;
        Ok(artifact)
    }

    fn run_argv<S: AsRef<str>>(&mut self, shell: &mut ShellSession, argv: &[S]) -> Result<String> {
        self.run_line(shell, &join(argv))
    }

    fn run_line(&mut self, shell: &mut ShellSession, line: &str) -> Result<String> {
        self.log_line(line.to_string());
        shell.run_line(line)
    }

    fn log_line(&mut self, line: String) {
        debug!("[{}] {}", self.name, line);
        self.log.push(line);
    }
}

/// Find the artifact file name in build output
///
/// `pattern` defaults to [`DEFAULT_ARTIFACT_PATTERN`] and is matched in
/// multi-line mode. The first capture group is the file name.
pub fn artifact_name(output: &str, pattern: Option<&str>) -> Result<Option<String>> {
    let regex = RegexBuilder::new(pattern.unwrap_or(DEFAULT_ARTIFACT_PATTERN))
        .multi_line(true)
        .build()
        .map_err(|e| Error::ParseError(format!("invalid artifact pattern: {e}")))?;

    Ok(regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string()))
}
