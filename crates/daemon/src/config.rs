//! Daemon configuration.
//!
//! Loaded from a TOML file when one exists, otherwise defaults. Every field
//! has a serde default so partial files work.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8483";
pub const DEFAULT_SERVE_PREFIX: &str = "site";
pub const DEFAULT_PLC_DIRECTORY: &str = "https://plc.directory";
pub const DEFAULT_HANDLE_RESOLVER: &str = "https://public.api.bsky.app";

const DB_FILE_NAME: &str = "plume.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the gateway listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Directory for durable state. Defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// First segment of the reserved serving path.
    #[serde(default = "default_serve_prefix")]
    pub serve_prefix: String,

    /// Identity directory service for `did:plc` documents.
    #[serde(default = "default_plc_directory")]
    pub plc_directory: Url,

    /// Handle-resolution endpoint.
    #[serde(default = "default_handle_resolver")]
    pub handle_resolver: Url,
}

fn default_listen_addr() -> SocketAddr {
    DEFAULT_LISTEN_ADDR.parse().expect("static addr")
}

fn default_serve_prefix() -> String {
    DEFAULT_SERVE_PREFIX.to_string()
}

fn default_plc_directory() -> Url {
    Url::parse(DEFAULT_PLC_DIRECTORY).expect("static url")
}

fn default_handle_resolver() -> Url {
    Url::parse(DEFAULT_HANDLE_RESOLVER).expect("static url")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            data_dir: None,
            serve_prefix: default_serve_prefix(),
            plc_directory: default_plc_directory(),
            handle_resolver: default_handle_resolver(),
        }
    }
}

impl Config {
    /// Load from `path` when given, from the default location when that
    /// file exists, otherwise defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = Self::default_config_path();
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        let config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {e}", path.display()))?;
        Ok(config)
    }

    fn default_config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        directories::ProjectDirs::from("dev", "plume", "plume")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .or_else(|| dirs::home_dir().map(|home| home.join(".plume")))
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Path of the sqlite database holding resident state and blob cache.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(DB_FILE_NAME)
    }
}
