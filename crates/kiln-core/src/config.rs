//! Configuration parsing for the kiln workspace.
//!
//! Two configuration surfaces live here:
//!
//! - [`KilnConfig`] - kiln's own settings, read from `kiln.toml` at the
//!   workspace root. Every section has sensible defaults so a workspace
//!   without a config file still builds.
//! - [`RuntimeConfig`] - the *served* configuration of the launched
//!   application (`<output>/config.json`). kiln reads it to learn the live
//!   process's listening port, whether its file-watch capability is enabled,
//!   and the shared key used for bridge authentication.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level kiln configuration (`kiln.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KilnConfig {
    /// Workspace layout settings.
    #[serde(default)]
    pub workspace: WorkspaceSettings,

    /// External build tool invocation.
    #[serde(default)]
    pub builder: BuilderConfig,

    /// Launcher process invocation.
    #[serde(default)]
    pub launcher: LauncherConfig,

    /// Graceful shutdown behavior for the supervised process.
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Watch loop timing.
    #[serde(default)]
    pub watch: WatchConfig,
}

impl KilnConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }
}

/// Workspace layout: directory names resolved relative to the workspace
/// root, plus the active build mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    /// Directory the assembled application is served from.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Subdirectory of `output_dir` holding hot-swappable unit artifacts.
    #[serde(default = "default_modules_dir")]
    pub modules_dir: String,

    /// Directory holding persisted build fingerprints.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Source tree directory inside each project root.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Build output directory inside each project root.
    #[serde(default = "default_target_dir")]
    pub target_dir: String,

    /// The build tool's descriptor file inside each project root.
    #[serde(default = "default_descriptor_file")]
    pub descriptor_file: String,

    /// Active build mode, fed into every fingerprint.
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_modules_dir() -> String {
    "modules".to_string()
}

fn default_cache_dir() -> String {
    ".build-cache".to_string()
}

fn default_source_dir() -> String {
    "src".to_string()
}

fn default_target_dir() -> String {
    "target".to_string()
}

fn default_descriptor_file() -> String {
    "pom.xml".to_string()
}

fn default_mode() -> String {
    "local".to_string()
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            modules_dir: default_modules_dir(),
            cache_dir: default_cache_dir(),
            source_dir: default_source_dir(),
            target_dir: default_target_dir(),
            descriptor_file: default_descriptor_file(),
            mode: default_mode(),
        }
    }
}

/// How the external build tool is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Build tool executable.
    #[serde(default = "default_build_command")]
    pub command: String,

    /// Arguments for an incremental build.
    #[serde(default = "default_build_args")]
    pub args: Vec<String>,

    /// Arguments for a clean build.
    #[serde(default = "default_clean_args")]
    pub clean_args: Vec<String>,

    /// Arguments appended when tests are skipped.
    #[serde(default = "default_skip_tests_args")]
    pub skip_tests_args: Vec<String>,

    /// Flag used to point the tool at an overridden build descriptor.
    #[serde(default = "default_descriptor_flag")]
    pub descriptor_flag: String,
}

fn default_build_command() -> String {
    "mvn".to_string()
}

fn default_build_args() -> Vec<String> {
    vec!["--batch-mode".to_string(), "install".to_string()]
}

fn default_clean_args() -> Vec<String> {
    vec![
        "--batch-mode".to_string(),
        "clean".to_string(),
        "install".to_string(),
    ]
}

fn default_skip_tests_args() -> Vec<String> {
    vec!["-DskipTests".to_string()]
}

fn default_descriptor_flag() -> String {
    "-f".to_string()
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            args: default_build_args(),
            clean_args: default_clean_args(),
            skip_tests_args: default_skip_tests_args(),
            descriptor_flag: default_descriptor_flag(),
        }
    }
}

/// How the application process is launched.
///
/// `args` entries may contain the placeholders `{artifact}` (resolved to the
/// served launcher artifact) and `{config}` (resolved to the served runtime
/// config file); both are substituted when the launch command is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Launcher executable.
    #[serde(default = "default_launcher_command")]
    pub command: String,

    /// Launcher arguments, with placeholder substitution.
    #[serde(default = "default_launcher_args")]
    pub args: Vec<String>,

    /// How long to wait after a (re)launch before the next poll.
    #[serde(default = "default_startup_grace")]
    #[serde(with = "humantime_serde")]
    pub startup_grace: Duration,
}

fn default_launcher_command() -> String {
    "java".to_string()
}

fn default_launcher_args() -> Vec<String> {
    vec!["-jar".to_string(), "{artifact}".to_string()]
}

const fn default_startup_grace() -> Duration {
    Duration::from_millis(1500)
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            command: default_launcher_command(),
            args: default_launcher_args(),
            startup_grace: default_startup_grace(),
        }
    }
}

/// Graceful shutdown settings for the supervised process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Time allowed between SIGTERM and a forced kill.
    #[serde(default = "default_grace_period")]
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

const fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
        }
    }
}

/// Watch loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Interval between change-detection passes.
    #[serde(default = "default_poll_interval")]
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Settle time after a change is first seen, so editor save bursts
    /// collapse into a single rebuild cycle.
    #[serde(default = "default_debounce")]
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
}

const fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

const fn default_debounce() -> Duration {
    Duration::from_secs(1)
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            debounce: default_debounce(),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading a configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The served application configuration (`<output>/config.json`).
///
/// Read best-effort: a missing or malformed file yields the defaults, which
/// disable hot-swapping (no file watcher, no API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Port the live process listens on.
    pub port: u16,

    /// Whether the live process watches its module files for changes.
    pub file_watcher: bool,

    /// Shared keys accepted by the live process's control API.
    pub api_keys: Vec<String>,

    /// Directories the live process loads hot-swappable units from.
    pub sources: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            file_watcher: false,
            api_keys: Vec::new(),
            sources: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Read the served configuration, falling back to defaults if the file
    /// is missing or malformed.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), %err, "malformed served config, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// The first non-empty shared key, if any.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_keys
            .iter()
            .map(String::as_str)
            .find(|k| !k.is_empty())
    }
}
