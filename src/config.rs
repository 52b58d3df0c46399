use crate::clienv;
use crate::error::{NoticesError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings as written in the optional TOML config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Directory scanned for `service-<name>-<started|stopped>` hooks
    pub hooks_dir: Option<PathBuf>,
    /// Executable used to run a hook in the unit's context
    pub juju_exec: Option<PathBuf>,
    /// Append logs here instead of stderr
    pub log_file: Option<PathBuf>,
    /// Where `install` writes the daemon's systemd unit file
    pub unit_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading config file");

        if !path.exists() {
            return Err(NoticesError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| NoticesError::TomlParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticesConfig {
    pub hooks_dir: PathBuf,
    pub juju_exec: PathBuf,
    pub log_file: Option<PathBuf>,
    pub unit_dir: PathBuf,
}

impl Default for NoticesConfig {
    fn default() -> Self {
        Self::resolve(FileConfig::default(), FileConfig::default())
    }
}

impl NoticesConfig {
    /// Env var > config file > default.
    pub fn load() -> Result<Self> {
        let file = match clienv::config_path() {
            Some(path) => FileConfig::load(&path)?,
            None => FileConfig::default(),
        };

        let env = FileConfig {
            hooks_dir: clienv::hooks_dir(),
            juju_exec: clienv::juju_exec(),
            log_file: clienv::log_file(),
            unit_dir: clienv::unit_dir(),
        };

        let config = Self::resolve(file, env);
        tracing::trace!(?config, "Config resolved");
        Ok(config)
    }

    /// Merge two layers, `overrides` winning field by field.
    pub fn resolve(file: FileConfig, overrides: FileConfig) -> Self {
        Self {
            hooks_dir: overrides
                .hooks_dir
                .or(file.hooks_dir)
                .unwrap_or_else(|| PathBuf::from(clienv::DEFAULT_HOOKS_DIR)),
            juju_exec: overrides
                .juju_exec
                .or(file.juju_exec)
                .unwrap_or_else(|| PathBuf::from(clienv::DEFAULT_JUJU_EXEC)),
            log_file: overrides.log_file.or(file.log_file),
            unit_dir: overrides
                .unit_dir
                .or(file.unit_dir)
                .unwrap_or_else(|| PathBuf::from(clienv::DEFAULT_UNIT_DIR)),
        }
    }
}
