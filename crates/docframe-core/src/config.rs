//! Configuration management for the preview pipeline.
//!
//! Configuration is stored in TOML format. Every section is optional; missing
//! sections and fields fall back to defaults that match the conventions of
//! the document converter producing the cached renditions.
//!
//! ## Resolution order
//!
//! 1. `DOCFRAME_CONFIG` environment variable (explicit file path)
//! 2. Platform config directory (`config.toml`)
//! 3. Built-in defaults
//!
//! `DOCFRAME_ORIGIN` overrides `service.origin` after loading.
//!
//! ## Example configuration file
//!
//! ```toml
//! [service]
//! origin = "https://search.example.com"
//! preview_endpoint = "api/v1/preview"
//!
//! [fetch]
//! timeout_secs = 30
//!
//! [rewrite]
//! embed_policy = "img"
//! asset_dir = "file_files"
//! page_marker_class = "ph"
//! stray_script_fragments = ["_nuxt"]
//! scaling_factor = 1.25
//!
//! [bridge]
//! allowed_origins = []
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable pointing at an explicit configuration file.
pub const CONFIG_ENV: &str = "DOCFRAME_CONFIG";

/// Environment variable overriding the preview service origin.
pub const ORIGIN_ENV: &str = "DOCFRAME_ORIGIN";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preview-data service location
    pub service: ServiceConfig,
    /// HTTP client settings
    pub fetch: FetchConfig,
    /// HTML rewriting policy
    pub rewrite: RewriteConfig,
    /// Frame navigation bridge settings
    pub bridge: BridgeConfig,
}

/// Location of the preview-data web service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Origin (scheme, host, port) of the search application.
    ///
    /// Cached content URLs returned by the service are relative to this origin.
    pub origin: String,

    /// Path of the preview endpoint, relative to `origin`.
    pub preview_endpoint: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_string(),
            preview_endpoint: "api/v1/preview".to_string(),
        }
    }
}

/// HTTP client settings shared by the preview-data service and the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// User agent override. Defaults to `docframe/<version>`.
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: None,
        }
    }
}

/// Replacement element used for `<object>` embeds of SVG files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedPolicy {
    /// Replace with `<img>`; the image is normalized like every other image.
    #[default]
    Img,
    /// Replace with `<iframe>`; keeps scripted SVGs interactive.
    Iframe,
}

/// Knobs for the HTML rewriting pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Element used to replace SVG `<object>` embeds.
    pub embed_policy: EmbedPolicy,

    /// Directory, relative to the document base, holding converted assets.
    pub asset_dir: String,

    /// Class marking the converter's page-select control.
    pub page_marker_class: String,

    /// `src` fragments identifying build-tool scripts under `<body>`.
    pub stray_script_fragments: Vec<String>,

    /// Zoom applied to the document body through the `--factor` property.
    pub scaling_factor: Option<f64>,

    /// Re-wrap loose text runs inside `div.t` blocks.
    pub fix_text_runs: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            embed_policy: EmbedPolicy::Img,
            asset_dir: "file_files".to_string(),
            page_marker_class: "ph".to_string(),
            stray_script_fragments: vec!["_nuxt".to_string()],
            scaling_factor: None,
            fix_text_runs: false,
        }
    }
}

/// Frame navigation bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Origins accepted for frame messages. Empty accepts every origin.
    pub allowed_origins: Vec<String>,

    /// Capacity of the bridge mailbox.
    pub mailbox_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            mailbox_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_or_default(&Self::config_path()?)
    }

    /// Load configuration from `path` when it exists, defaults otherwise.
    ///
    /// Environment overrides are applied in both cases.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Write the configuration to an explicit file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content).map_err(|e| Error::Config(format!("Failed to write config: {e}")))
    }

    /// Path of the configuration file, honoring `DOCFRAME_CONFIG`.
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        let project_dirs = directories::ProjectDirs::from("dev", "docframe", "docframe")
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))?;

        Ok(project_dirs.config_dir().join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(origin) = std::env::var(ORIGIN_ENV) {
            let origin = origin.trim();
            if !origin.is_empty() {
                self.service.origin = origin.trim_end_matches('/').to_string();
            }
        }
    }
}
