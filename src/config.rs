use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::listing::DEFAULT_LISTING_URL;

pub const CONFIG_FILE_NAME: &str = "buildstock-fetch.json";
pub const DEFAULT_BUCKET: &str = "oedi-data-lake";
pub const DEFAULT_ROOT_PREFIX: &str =
    "nrel-pds-building-stock/end-use-load-profiles-for-us-building-stock";
pub const DEFAULT_CATALOG_PATH: &str = "buildstock_releases.json";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub root_prefix: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub catalog_path: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Where the datasets live: `{base_url}/{bucket}/{root_prefix}/...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLocation {
    pub base_url: String,
    pub bucket: String,
    pub root_prefix: String,
}

impl DatasetLocation {
    pub fn object_url(&self, relative: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let root = self.root_prefix.trim_matches('/');
        let relative = relative.trim_start_matches('/');
        if root.is_empty() {
            format!("{base}/{}/{relative}", self.bucket)
        } else {
            format!("{base}/{}/{root}/{relative}", self.bucket)
        }
    }
}

impl Default for DatasetLocation {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LISTING_URL.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            root_prefix: DEFAULT_ROOT_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub location: DatasetLocation,
    pub catalog_path: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    pub timeout: Duration,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Otherwise `./buildstock-fetch.json`, then the
    /// user config directory, then built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, FetchError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };

        let Some(config_path) = config_path else {
            tracing::debug!("no config file found, using defaults");
            return Ok(Self::resolve_config(Config::default()));
        };

        tracing::debug!(path = %config_path.display(), "loading config");
        let content = fs::read_to_string(&config_path)
            .map_err(|_| FetchError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FetchError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = DatasetLocation::default();
        ResolvedConfig {
            location: DatasetLocation {
                base_url: config.base_url.unwrap_or(defaults.base_url),
                bucket: config.bucket.unwrap_or(defaults.bucket),
                root_prefix: config
                    .root_prefix
                    .map(|prefix| prefix.trim_matches('/').to_string())
                    .unwrap_or(defaults.root_prefix),
            },
            catalog_path: Utf8PathBuf::from(
                config
                    .catalog_path
                    .unwrap_or_else(|| DEFAULT_CATALOG_PATH.to_string()),
            ),
            data_dir: Utf8PathBuf::from(
                config
                    .data_dir
                    .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        }
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "buildstock-fetch")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }
}
