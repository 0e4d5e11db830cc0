//! Engine configuration.
//!
//! [`EngineConfig`] holds every tunable of the engine. It is built from
//! defaults with `with_*` builders, or loaded from an INI file:
//!
//! ```text
//! [server]
//! base_url = http://localhost:8089
//! tiles_path = tiles
//! sources_path = sources
//! request_timeout_secs = 30
//!
//! [tiles]
//! max_load_tiles = 2048
//! max_visu_tiles = 512
//! default_level = 13
//!
//! [scheduler]
//! parse_budget_ms = 10
//! visualization_budget_ms = 20
//! idle_delay_ms = 10
//!
//! [views]
//! count = 1
//! sync = false
//!
//! [logging]
//! level = info
//! directory = /var/log/tilestream
//! ```
//!
//! Missing keys keep their defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::coord::MAX_LEVEL;
use crate::logging::LoggingConfig;

/// Default server base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8089";

/// Default path of the tile endpoint, relative to the base URL.
pub const DEFAULT_TILES_PATH: &str = "tiles";

/// Default path of the sources endpoint, relative to the base URL.
pub const DEFAULT_SOURCES_PATH: &str = "sources";

/// Default HTTP connect timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of tiles requested per level.
pub const DEFAULT_MAX_LOAD_TILES: usize = 2048;

/// Default maximum number of high-detail tiles per level.
pub const DEFAULT_MAX_VISU_TILES: usize = 512;

/// Default level of newly discovered layers.
pub const DEFAULT_LEVEL: u16 = 13;

/// Default time budget for parsing frames per tick.
pub const DEFAULT_PARSE_BUDGET_MS: u64 = 10;

/// Default time budget for rendering visualizations per tick.
pub const DEFAULT_VISUALIZATION_BUDGET_MS: u64 = 20;

/// Default delay before the next tick when nothing is queued.
pub const DEFAULT_IDLE_DELAY_MS: u64 = 10;

/// Default number of views.
pub const DEFAULT_NUM_VIEWS: usize = 1;

/// File name looked up in the user config directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Configuration of a [`TileEngine`](crate::orchestrator::TileEngine).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub base_url: String,
    pub tiles_path: String,
    pub sources_path: String,
    pub request_timeout: Duration,
    pub max_load_tiles: usize,
    pub max_visu_tiles: usize,
    pub default_level: u16,
    pub parse_budget: Duration,
    pub visualization_budget: Duration,
    pub idle_delay: Duration,
    pub num_views: usize,
    pub view_sync: bool,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            tiles_path: DEFAULT_TILES_PATH.to_string(),
            sources_path: DEFAULT_SOURCES_PATH.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_load_tiles: DEFAULT_MAX_LOAD_TILES,
            max_visu_tiles: DEFAULT_MAX_VISU_TILES,
            default_level: DEFAULT_LEVEL,
            parse_budget: Duration::from_millis(DEFAULT_PARSE_BUDGET_MS),
            visualization_budget: Duration::from_millis(DEFAULT_VISUALIZATION_BUDGET_MS),
            idle_delay: Duration::from_millis(DEFAULT_IDLE_DELAY_MS),
            num_views: DEFAULT_NUM_VIEWS,
            view_sync: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_tile_limits(mut self, max_load_tiles: usize, max_visu_tiles: usize) -> Self {
        self.max_load_tiles = max_load_tiles;
        self.max_visu_tiles = max_visu_tiles;
        self
    }

    pub fn with_default_level(mut self, level: u16) -> Self {
        self.default_level = level.min(MAX_LEVEL);
        self
    }

    pub fn with_budgets(mut self, parse: Duration, visualization: Duration) -> Self {
        self.parse_budget = parse;
        self.visualization_budget = visualization;
        self
    }

    pub fn with_idle_delay(mut self, idle_delay: Duration) -> Self {
        self.idle_delay = idle_delay;
        self
    }

    pub fn with_num_views(mut self, num_views: usize) -> Self {
        self.num_views = num_views.max(1);
        self
    }

    pub fn with_view_sync(mut self, view_sync: bool) -> Self {
        self.view_sync = view_sync;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// URL the tile requests are posted to.
    pub fn tiles_url(&self) -> String {
        join_url(&self.base_url, &self.tiles_path)
    }

    /// URL the source catalog is fetched from.
    pub fn sources_url(&self) -> String {
        join_url(&self.base_url, &self.sources_path)
    }

    /// Loads the configuration from an INI file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path of the INI file
    ///
    /// # Returns
    ///
    /// The defaults overridden by every key present in the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Loads [`default_config_path`] if it exists, defaults otherwise.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("server")) {
            if let Some(v) = section.get("base_url") {
                config.base_url = v.trim_end_matches('/').to_string();
            }
            if let Some(v) = section.get("tiles_path") {
                config.tiles_path = v.to_string();
            }
            if let Some(v) = section.get("sources_path") {
                config.sources_path = v.to_string();
            }
            if let Some(v) = section.get("request_timeout_secs") {
                config.request_timeout = Duration::from_secs(parse_value("server", "request_timeout_secs", v)?);
            }
        }

        if let Some(section) = ini.section(Some("tiles")) {
            if let Some(v) = section.get("max_load_tiles") {
                config.max_load_tiles = parse_value("tiles", "max_load_tiles", v)?;
            }
            if let Some(v) = section.get("max_visu_tiles") {
                config.max_visu_tiles = parse_value("tiles", "max_visu_tiles", v)?;
            }
            if let Some(v) = section.get("default_level") {
                let level: u16 = parse_value("tiles", "default_level", v)?;
                if level > MAX_LEVEL {
                    return Err(invalid("tiles", "default_level", v));
                }
                config.default_level = level;
            }
        }

        if let Some(section) = ini.section(Some("scheduler")) {
            if let Some(v) = section.get("parse_budget_ms") {
                config.parse_budget = Duration::from_millis(parse_value("scheduler", "parse_budget_ms", v)?);
            }
            if let Some(v) = section.get("visualization_budget_ms") {
                config.visualization_budget =
                    Duration::from_millis(parse_value("scheduler", "visualization_budget_ms", v)?);
            }
            if let Some(v) = section.get("idle_delay_ms") {
                config.idle_delay = Duration::from_millis(parse_value("scheduler", "idle_delay_ms", v)?);
            }
        }

        if let Some(section) = ini.section(Some("views")) {
            if let Some(v) = section.get("count") {
                let count: usize = parse_value("views", "count", v)?;
                if count == 0 {
                    return Err(invalid("views", "count", v));
                }
                config.num_views = count;
            }
            if let Some(v) = section.get("sync") {
                config.view_sync = parse_value("views", "sync", v)?;
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(v) = section.get("level") {
                config.logging.level = parse_value("logging", "level", v)?;
            }
            if let Some(v) = section.get("directory") {
                config.logging.directory = Some(PathBuf::from(v));
            }
        }

        Ok(config)
    }
}

/// Location of the user config file, e.g. `~/.config/tilestream/config.ini`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tilestream").join(CONFIG_FILE_NAME))
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn parse_value<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(section, key, value))
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}
