//! INI configuration file.
//!
//! ```ini
//! [webdav]
//! username = alice
//! password = secret
//! timeout_secs = 120
//!
//! [transfer]
//! chunk_size_mb = 8
//! parallel_connections = 4
//! force_fat32 = false
//! max_window_mb = 256
//! range_attempts = 6
//! range_backoff_secs = 5
//! auto_retry_attempts = 3
//! auto_retry_wait_secs = 60
//! fallback_dir = /data/downloads
//!
//! [logging]
//! level = info
//! file = /var/log/davfetch.log
//! ```
//!
//! Every key is optional. Out-of-range numbers are clamped; values that do
//! not parse are reported with their section and key.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use super::{TransferConfig, MAX_CHUNK_SIZE_MB, MAX_DIRECT_WORKERS, MIB, MIN_CHUNK_SIZE_MB};
use crate::logging::LoggingConfig;
use crate::transport::{Credentials, TransportConfig};

/// Directory under the home directory holding the default config file.
pub const CONFIG_DIR_NAME: &str = ".davfetch";

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(String),

    #[error("invalid value {value:?} for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// `~/.davfetch/config.ini`, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Settings loaded from an INI file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    /// Engine tuning.
    pub transfer: TransferConfig,
    /// HTTP settings.
    pub transport: TransportConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

struct Section<'a> {
    name: &'static str,
    props: Option<&'a Properties>,
}

impl<'a> Section<'a> {
    fn of(ini: &'a Ini, name: &'static str) -> Self {
        Self {
            name,
            props: ini.section(Some(name)),
        }
    }

    fn string(&self, key: &str) -> Option<String> {
        self.props
            .and_then(|p| p.get(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn invalid(&self, key: &str, value: &str) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn number<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.string(key) {
            Some(raw) => raw.parse().map(Some).map_err(|_| self.invalid(key, &raw)),
            None => Ok(None),
        }
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.string(key) {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(self.invalid(key, &raw)),
            },
            None => Ok(None),
        }
    }
}

impl ConfigFile {
    /// Load and parse `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Load `path`, or return defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        let webdav = Section::of(&ini, "webdav");
        if let Some(username) = webdav.string("username") {
            let password = webdav.string("password").unwrap_or_default();
            config.transport.credentials = Some(Credentials::new(username, password));
        }
        if let Some(secs) = webdav.number::<u64>("timeout_secs")? {
            config.transport.timeout = Duration::from_secs(secs.max(1));
        }

        let transfer = Section::of(&ini, "transfer");
        let t = &mut config.transfer;
        if let Some(mb) = transfer.number::<u64>("chunk_size_mb")? {
            t.chunk_size_mb = mb.clamp(MIN_CHUNK_SIZE_MB, MAX_CHUNK_SIZE_MB);
        }
        if let Some(n) = transfer.number::<usize>("parallel_connections")? {
            t.parallel_connections = n.clamp(1, MAX_DIRECT_WORKERS);
        }
        if let Some(force) = transfer.flag("force_fat32")? {
            t.force_split = force;
        }
        if let Some(mb) = transfer.number::<u64>("max_window_mb")? {
            t.max_window_bytes = mb.max(1).saturating_mul(MIB);
        }
        let range_attempts = transfer.number::<u32>("range_attempts")?;
        let range_backoff = transfer.number::<u64>("range_backoff_secs")?;
        if range_attempts.is_some() || range_backoff.is_some() {
            t.retry = t.retry.clone().with_range_attempts(
                range_attempts.unwrap_or(t.retry.max_attempts_per_range),
                range_backoff
                    .map(Duration::from_secs)
                    .unwrap_or(t.retry.per_attempt_backoff),
            );
        }
        let auto_attempts = transfer.number::<u32>("auto_retry_attempts")?;
        let auto_wait = transfer.number::<u64>("auto_retry_wait_secs")?;
        if auto_attempts.is_some() || auto_wait.is_some() {
            t.retry = t.retry.clone().with_transfer_attempts(
                auto_attempts.unwrap_or(t.retry.max_attempts_whole_transfer),
                auto_wait
                    .map(Duration::from_secs)
                    .unwrap_or(t.retry.total_backoff_budget),
            );
        }
        if let Some(dir) = transfer.string("fallback_dir") {
            t.fallback_dir = Some(PathBuf::from(dir));
        }

        let logging = Section::of(&ini, "logging");
        if let Some(level) = logging.string("level") {
            config.logging.level = level;
        }
        if let Some(file) = logging.string("file") {
            config.logging.file = Some(PathBuf::from(file));
        }

        Ok(config)
    }
}
