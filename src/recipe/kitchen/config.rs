// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen build system

use crate::error::{Error, Result};
use crate::shell::ShellConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Constants describing the cross target
///
/// The defaults match a Buildroot SDK for 32-bit ARM hard-float with
/// Python 3.10 in its sysroot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Toolchain triple; the sysroot is `<sdk>/<triple>/sysroot`
    pub toolchain_triple: String,
    /// Python version in the target sysroot
    pub python_version: String,
    /// `_PYTHON_SYSCONFIGDATA_NAME` for the target interpreter
    pub sysconfigdata_name: String,
    /// `_PYTHON_HOST_PLATFORM` value
    pub host_platform: String,
    /// Wheel platform tag passed as `--plat-name`
    pub plat_name: String,
    /// Host interpreter paths made visible to pip (the SDK python lacks ssl)
    pub host_python_paths: Vec<String>,
    /// Appended to both `CFLAGS` and `CPPFLAGS`
    pub extra_cflags: String,
    /// Activation script, relative to the SDK directory
    pub activation_script: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            toolchain_triple: "arm-buildroot-linux-gnueabihf".to_string(),
            python_version: "3.10".to_string(),
            sysconfigdata_name: "_sysconfigdata__linux_arm-linux-gnueabihf".to_string(),
            host_platform: "linux-x86_64-linux-gnu".to_string(),
            plat_name: "linux_armv7l".to_string(),
            host_python_paths: vec![
                "/usr/local/lib/python3.10".to_string(),
                "/usr/local/lib/python3.10/lib-dynload".to_string(),
            ],
            extra_cflags: "-D_Complex_I=I -D_GNU_SOURCE -std=gnu99".to_string(),
            activation_script: "environment-setup".to_string(),
        }
    }
}

impl TargetConfig {
    pub fn sysroot(&self, sdk_path: &Path) -> PathBuf {
        sdk_path.join(&self.toolchain_triple).join("sysroot")
    }

    /// The target's standard library inside the sysroot
    pub fn target_pythonpath(&self, sdk_path: &Path) -> PathBuf {
        self.sysroot(sdk_path)
            .join("usr")
            .join("lib")
            .join(format!("python{}", self.python_version))
    }

    pub fn activation_script_path(&self, sdk_path: &Path) -> PathBuf {
        sdk_path.join(&self.activation_script)
    }
}

/// Configuration for the Kitchen
///
/// Passed explicitly to every cook; nothing is read from global state.
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// SDK directory holding the activation script and sysroot
    pub sdk_path: PathBuf,
    /// Packages cooked in parallel after the first one
    pub jobs: usize,
    /// Stream every shell output line at info level
    pub verbose: bool,
    /// How shells are started
    pub shell: ShellConfig,
    /// Cross-target constants
    pub target: TargetConfig,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            sdk_path: PathBuf::from("/sdk"),
            jobs: 1,
            verbose: false,
            shell: ShellConfig::default(),
            target: TargetConfig::default(),
        }
    }
}

impl KitchenConfig {
    /// Create a configuration for the SDK at `sdk_path`
    pub fn new(sdk_path: impl Into<PathBuf>) -> Self {
        Self {
            sdk_path: sdk_path.into(),
            ..Self::default()
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Limit how long any single build command may run
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shell.timeout = timeout;
        self
    }

    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.target = target;
        self
    }

    pub fn activation_script(&self) -> PathBuf {
        self.target.activation_script_path(&self.sdk_path)
    }
}

/// `[kitchen]` table of a config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KitchenSection {
    pub jobs: Option<usize>,
    pub command_timeout_secs: Option<u64>,
    /// Shell program followed by its arguments
    pub shell: Option<Vec<String>>,
}

/// On-disk configuration file
///
/// ```toml
/// [target]
/// plat_name = "linux_aarch64"
///
/// [kitchen]
/// jobs = 4
/// command_timeout_secs = 3600
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub target: TargetConfig,
    pub kitchen: KitchenSection,
}

impl ConfigFile {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Layer this file over `config`
    pub fn apply(self, mut config: KitchenConfig) -> Result<KitchenConfig> {
        config.target = self.target;
        if let Some(jobs) = self.kitchen.jobs {
            config = config.with_jobs(jobs);
        }
        if let Some(secs) = self.kitchen.command_timeout_secs {
            config = config.with_command_timeout(Some(Duration::from_secs(secs)));
        }
        if let Some(shell) = self.kitchen.shell {
            let (program, args) = shell
                .split_first()
                .ok_or_else(|| Error::ParseError("kitchen.shell must name a program".to_string()))?;
            config.shell = config.shell.clone().with_program(program.clone(), args.to_vec());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kitchen_config_default() {
        let config = KitchenConfig::default();
        assert_eq!(config.jobs, 1);
        assert!(!config.verbose);
        assert!(config.shell.timeout.is_none());
        assert_eq!(config.shell.program, "bash");
    }

    #[test]
    fn test_target_paths() {
        let target = TargetConfig::default();
        let sdk = Path::new("/sdk");
        assert_eq!(
            target.sysroot(sdk),
            PathBuf::from("/sdk/arm-buildroot-linux-gnueabihf/sysroot")
        );
        assert_eq!(
            target.target_pythonpath(sdk),
            PathBuf::from("/sdk/arm-buildroot-linux-gnueabihf/sysroot/usr/lib/python3.10")
        );
        assert_eq!(
            KitchenConfig::new("/opt/sdk").activation_script(),
            PathBuf::from("/opt/sdk/environment-setup")
        );
    }

    #[test]
    fn test_builder_helpers() {
        let config = KitchenConfig::new("/sdk")
            .with_jobs(0)
            .with_verbose(true)
            .with_command_timeout(Some(Duration::from_secs(60)));
        assert_eq!(config.jobs, 1);
        assert!(config.verbose);
        assert_eq!(config.shell.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_config_file_partial_target() {
        let file = ConfigFile::parse(
            r#"
[target]
plat_name = "linux_aarch64"
toolchain_triple = "aarch64-buildroot-linux-gnu"

[kitchen]
jobs = 3
command_timeout_secs = 120
shell = ["/bin/bash", "--norc", "--noediting", "-i"]
"#,
        )
        .unwrap();
        assert_eq!(file.target.python_version, "3.10");

        let config = file.apply(KitchenConfig::new("/sdk")).unwrap();
        assert_eq!(config.target.plat_name, "linux_aarch64");
        assert_eq!(config.jobs, 3);
        assert_eq!(config.shell.timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.shell.program, "/bin/bash");
        assert_eq!(config.shell.args, vec!["--norc", "--noediting", "-i"]);
    }

    #[test]
    fn test_config_file_empty_shell_rejected() {
        let file = ConfigFile::parse("[kitchen]\nshell = []\n").unwrap();
        assert!(file.apply(KitchenConfig::default()).is_err());
    }

    #[test]
    fn test_config_file_unknown_field_is_error() {
        assert!(ConfigFile::parse("[target]\nplat = \"x\"\n").is_err());
        assert!(ConfigFile::parse("[kitchn]\njobs = 2\n").is_err());
    }
}
