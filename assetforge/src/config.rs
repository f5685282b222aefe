//! Configuration file (`~/.assetforge/config.ini`).
//!
//! ```ini
//! [general]
//! working_directory = /data/assetforge
//! keep_intermediate_data = true
//!
//! [download]
//! parallel = 4
//! timeout = 300
//! commit_interval_ms = 1000
//! user_agent = BestHTTP
//!
//! [processing]
//! threads = 0
//! processors = image,sound,flatc
//! flatc_path = /usr/local/bin/flatc
//! ```
//!
//! A missing file means defaults. A present file is validated key by key.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::download::{DEFAULT_COMMIT_INTERVAL, DEFAULT_PARALLEL, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};

const CONFIG_DIR: &str = ".assetforge";
const CONFIG_FILE: &str = "config.ini";
/// Working directory used when none is configured, under the config dir.
const DEFAULT_WORKING_DIR: &str = "resources";

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("home directory not found")]
    NoHomeDir,
}

/// `~/.assetforge`, if a home directory exists.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_DIR))
}

/// `~/.assetforge/config.ini`.
pub fn config_file_path() -> ConfigResult<PathBuf> {
    config_dir()
        .map(|d| d.join(CONFIG_FILE))
        .ok_or(ConfigError::NoHomeDir)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralSettings {
    pub working_directory: PathBuf,
    /// Keep downloaded archives after unpacking.
    pub keep_intermediate_data: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Transfers in flight at once.
    pub parallel: usize,
    pub timeout: Duration,
    /// Longest time between progress record commits.
    pub commit_interval: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingSettings {
    /// Worker threads, 0 for the available parallelism.
    pub threads: usize,
    /// Processor keys to run; empty runs all of them.
    pub processors: Vec<String>,
    pub flatc_path: Option<PathBuf>,
}

/// All settings of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub general: GeneralSettings,
    pub download: DownloadSettings,
    pub processing: ProcessingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let working_directory = config_dir()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR))
            .join(DEFAULT_WORKING_DIR);
        Self {
            general: GeneralSettings {
                working_directory,
                keep_intermediate_data: true,
            },
            download: DownloadSettings {
                parallel: DEFAULT_PARALLEL,
                timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                commit_interval: DEFAULT_COMMIT_INTERVAL,
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            processing: ProcessingSettings {
                threads: 0,
                processors: Vec::new(),
                flatc_path: None,
            },
        }
    }
}

/// Reads typed values out of one INI document.
struct Reader<'a> {
    ini: &'a Ini,
}

impl Reader<'_> {
    fn raw(&self, section: &str, key: &str) -> Option<&str> {
        self.ini
            .section(Some(section))
            .and_then(|s| s.get(key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, section: &str, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(section, key) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|e: T::Err| invalid(section, key, value, e.to_string())),
        }
    }

    fn flag(&self, section: &str, key: &str, default: bool) -> ConfigResult<bool> {
        match self.raw(section, key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(true),
                "false" | "no" | "0" | "off" => Ok(false),
                _ => Err(invalid(section, key, value, "expected true or false".to_string())),
            },
        }
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

impl ConfigFile {
    /// Load from the default location, or defaults if the file is absent.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&config_file_path()?)
    }

    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<memory>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let r = Reader { ini };
        let defaults = Self::default();

        let parallel: usize = r.parse("download", "parallel", defaults.download.parallel)?;
        if parallel == 0 {
            return Err(invalid("download", "parallel", "0", "must be at least 1".to_string()));
        }
        let timeout_secs: u64 = r.parse("download", "timeout", defaults.download.timeout.as_secs())?;
        let commit_ms: u64 = r.parse(
            "download",
            "commit_interval_ms",
            defaults.download.commit_interval.as_millis() as u64,
        )?;

        let processors = r
            .raw("processing", "processors")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            general: GeneralSettings {
                working_directory: r
                    .raw("general", "working_directory")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.general.working_directory),
                keep_intermediate_data: r.flag(
                    "general",
                    "keep_intermediate_data",
                    defaults.general.keep_intermediate_data,
                )?,
            },
            download: DownloadSettings {
                parallel,
                timeout: Duration::from_secs(timeout_secs),
                commit_interval: Duration::from_millis(commit_ms),
                user_agent: r
                    .raw("download", "user_agent")
                    .map(str::to_string)
                    .unwrap_or(defaults.download.user_agent),
            },
            processing: ProcessingSettings {
                threads: r.parse("processing", "threads", defaults.processing.threads)?,
                processors,
                flatc_path: r.raw("processing", "flatc_path").map(PathBuf::from),
            },
        })
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("general"))
            .set(
                "working_directory",
                self.general.working_directory.to_string_lossy().to_string(),
            )
            .set(
                "keep_intermediate_data",
                self.general.keep_intermediate_data.to_string(),
            );
        ini.with_section(Some("download"))
            .set("parallel", self.download.parallel.to_string())
            .set("timeout", self.download.timeout.as_secs().to_string())
            .set(
                "commit_interval_ms",
                self.download.commit_interval.as_millis().to_string(),
            )
            .set("user_agent", self.download.user_agent.clone());
        ini.with_section(Some("processing"))
            .set("threads", self.processing.threads.to_string())
            .set("processors", self.processing.processors.join(","))
            .set(
                "flatc_path",
                self.processing
                    .flatc_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
        ini
    }

    /// Write the config, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let write_failed = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_failed)?;
        }
        self.to_ini().write_to_file(path).map_err(write_failed)
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.general.working_directory = dir.into();
        self
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.download.parallel = parallel.max(1);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.processing.threads = threads;
        self
    }

    pub fn with_processors(mut self, processors: Vec<String>) -> Self {
        self.processing.processors = processors;
        self
    }

    /// `<working_directory>/logs`.
    pub fn log_dir(&self) -> PathBuf {
        self.general.working_directory.join("logs")
    }
}
