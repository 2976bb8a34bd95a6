//! # Settings Module / 设置模块
//!
//! The optional `Harness.toml` file. Every field has a default, so a missing
//! file is equivalent to an empty one; command-line flags override the file.
//!
//! 可选的 `Harness.toml` 文件。每个字段都有默认值，因此缺少文件等同于空文件；
//! 命令行参数会覆盖文件中的值。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::models::Repository;
use crate::error::ConfigError;

pub const DEFAULT_SETTINGS_FILE: &str = "Harness.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "test_outputs";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Per-repository overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RepositorySettings {
    /// Test directory, relative to the project root unless absolute.
    #[serde(default)]
    pub test_dir: Option<String>,
    /// Replacement for the default test command (e.g. `python3`).
    #[serde(default)]
    pub command: Option<String>,
}

/// One library exposed through the overlay directory.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OverlayLibrary {
    pub source: String,
    /// File name inside the overlay directory. Defaults to the source's file name.
    #[serde(default)]
    pub alias: Option<String>,
}

/// Library search-path overlay applied to every launched test.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OverlaySettings {
    #[serde(default = "default_search_path_var")]
    pub search_path_var: String,
    /// Also list the overlaid libraries in `LD_PRELOAD`.
    #[serde(default)]
    pub preload: bool,
    #[serde(default)]
    pub libraries: Vec<OverlayLibrary>,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            search_path_var: default_search_path_var(),
            preload: false,
            libraries: Vec::new(),
        }
    }
}

fn default_search_path_var() -> String {
    "LD_LIBRARY_PATH".to_string()
}

/// The harness settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Settings {
    /// The language for console messages (e.g. "en", "zh-CN").
    /// 控制台消息的语言。
    #[serde(default)]
    pub language: Option<String>,

    /// Root the test directories and whitelists are resolved against.
    #[serde(default = "default_project_root")]
    pub project_root: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Wall-clock budget of a single cell.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cells executed at once. GPU suites are only safe sequentially, so 1.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Directory holding `<repo>_whitelist.txt`. Defaults to the project root.
    #[serde(default)]
    pub whitelist_dir: Option<String>,

    /// Extra bindings added to the base environment of every test.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub repositories: BTreeMap<String, RepositorySettings>,

    #[serde(default)]
    pub overlay: OverlaySettings,
}

fn default_project_root() -> String {
    ".".to_string()
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_jobs() -> usize {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: None,
            project_root: default_project_root(),
            output_dir: default_output_dir(),
            timeout_secs: default_timeout_secs(),
            jobs: default_jobs(),
            whitelist_dir: None,
            env: BTreeMap::new(),
            repositories: BTreeMap::new(),
            overlay: OverlaySettings::default(),
        }
    }
}

impl Settings {
    /// Checks the values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".to_string()));
        }
        if self.jobs == 0 {
            return Err(ConfigError::Invalid("jobs must be at least 1".to_string()));
        }
        for name in self.repositories.keys() {
            name.parse::<Repository>()?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The project root with `~` and `$VARS` expanded.
    pub fn project_root(&self) -> Result<PathBuf, ConfigError> {
        expand_path(&self.project_root)
    }

    pub fn whitelist_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.whitelist_dir {
            Some(dir) => Ok(self.project_root()?.join(expand_path(dir)?)),
            None => self.project_root(),
        }
    }

    /// Absolute (or root-relative) test directory of a repository.
    pub fn test_dir(&self, repo: Repository) -> Result<PathBuf, ConfigError> {
        let configured = self
            .repositories
            .get(repo.as_str())
            .and_then(|r| r.test_dir.as_deref())
            .unwrap_or(repo.default_test_dir());
        Ok(self.project_root()?.join(expand_path(configured)?))
    }

    /// The test command of a repository, split into program and arguments.
    pub fn command(&self, repo: Repository) -> Result<Vec<String>, ConfigError> {
        let configured = self
            .repositories
            .get(repo.as_str())
            .and_then(|r| r.command.as_deref())
            .unwrap_or(repo.default_command());
        let parts = shlex::split(configured)
            .ok_or_else(|| ConfigError::Invalid(format!("cannot parse command '{configured}'")))?;
        if parts.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "empty test command for {repo}"
            )));
        }
        Ok(parts)
    }
}

fn expand_path(value: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(value)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| ConfigError::Invalid(format!("cannot expand '{value}': {e}")))
}

/// Parses settings from TOML text.
pub fn parse_settings(content: &str, path: &Path) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(content).map_err(|e| ConfigError::Settings {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Loads the settings file. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => parse_settings(&content, path),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            Ok(Settings::default())
        }
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
