//! Host configuration
//!
//! Read from a TOML file and overlaid with `NEOBUILD__*` environment
//! variables (`NEOBUILD__OPERATION=rebuild`, `NEOBUILD__LOG__LEVEL=debug`).

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use indexmap::IndexMap;
use neobuild_bridge::OperationKind;
use serde::Deserialize;

use crate::error::HostError;

pub const CONFIG_FILE_NAME: &str = "neobuild.toml";
const ENV_PREFIX: &str = "NEOBUILD";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Operation used when none is given on the command line
    pub operation: OperationKind,
    /// Give up waiting for a build after this many seconds
    pub completion_timeout_secs: Option<u64>,
    pub log: LogConfig,
    /// Buildable targets, in declaration order
    pub targets: IndexMap<String, TargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
    /// Write a daily rolling log file here as well
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Working directory, relative to the configuration file
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    pub build: CommandSpec,
    #[serde(default)]
    pub clean: Option<CommandSpec>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn display(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl HostConfig {
    /// Load `path`, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self, HostError> {
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let mut config: HostConfig = settings.try_deserialize()?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        tracing::debug!(
            "Loaded {} target(s) from {}",
            config.targets.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parse configuration from a TOML string, without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self, HostError> {
        let settings = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Locate the configuration file: `./neobuild.toml`, then the user
    /// configuration directory.
    pub fn find_default() -> Result<PathBuf, HostError> {
        let candidates = Self::default_locations();
        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or(HostError::NoConfigFile(candidates))
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = ProjectDirs::from("dev", "neostack", "neobuild") {
            candidates.push(dirs.config_dir().join(CONFIG_FILE_NAME));
        }
        candidates
    }

    /// Make relative target directories relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for target in self.targets.values_mut() {
            match &target.cwd {
                Some(cwd) if cwd.is_relative() => target.cwd = Some(base.join(cwd)),
                None => target.cwd = Some(base.to_path_buf()),
                _ => {}
            }
        }
        if let Some(dir) = &self.log.directory {
            if dir.is_relative() {
                self.log.directory = Some(base.join(dir));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const SAMPLE: &str = r#"
        operation = "rebuild"
        completion_timeout_secs = 30

        [log]
        level = "debug"

        [targets.core]
        cwd = "core"
        build = { command = "cargo", args = ["build", "--release"] }
        clean = { command = "cargo", args = ["clean"] }

        [targets.app]
        build = { command = "make" }
    "#;

    #[test]
    fn test_parse_sample() {
        let config = HostConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.operation, OperationKind::Rebuild);
        assert_eq!(config.completion_timeout_secs, Some(30));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.targets.keys().collect::<Vec<_>>(), vec!["core", "app"]);

        let core = &config.targets["core"];
        assert_eq!(core.build.display(), "cargo build --release");
        assert_eq!(core.clean.as_ref().unwrap().args, vec!["clean"]);

        let app = &config.targets["app"];
        assert!(app.clean.is_none());
        assert!(app.build.args.is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = HostConfig::from_toml_str("").unwrap();
        assert_eq!(config.operation, OperationKind::Build);
        assert_eq!(config.log.level, "info");
        assert!(config.targets.is_empty());
        assert!(config.completion_timeout_secs.is_none());
    }

    #[test]
    fn test_invalid_operation() {
        let result = HostConfig::from_toml_str(r#"operation = "deploy""#);
        assert!(matches!(result, Err(HostError::Config(_))));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, SAMPLE).unwrap();

        let config = HostConfig::load(&path).unwrap();
        assert_eq!(config.targets["core"].cwd, Some(temp.path().join("core")));
        assert_eq!(config.targets["app"].cwd, Some(temp.path().to_path_buf()));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = HostConfig::load(&temp.path().join("missing.toml"));
        assert!(matches!(result, Err(HostError::Config(_))));
    }
}
