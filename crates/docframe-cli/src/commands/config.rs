use anyhow::{Context, Result, anyhow};
use clap::Subcommand;
use docframe_core::{Config, EmbedPolicy};
use std::path::Path;

use crate::utils::settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ServiceOrigin,
    PreviewEndpoint,
    TimeoutSecs,
    EmbedPolicy,
    AssetDir,
    PageMarkerClass,
    ScalingFactor,
    FixTextRuns,
    AllowedOrigins,
}

impl ConfigKey {
    const ALL: [Self; 9] = [
        Self::ServiceOrigin,
        Self::PreviewEndpoint,
        Self::TimeoutSecs,
        Self::EmbedPolicy,
        Self::AssetDir,
        Self::PageMarkerClass,
        Self::ScalingFactor,
        Self::FixTextRuns,
        Self::AllowedOrigins,
    ];

    fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|key| key.as_str() == normalized)
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::ServiceOrigin => "service.origin",
            Self::PreviewEndpoint => "service.preview_endpoint",
            Self::TimeoutSecs => "fetch.timeout_secs",
            Self::EmbedPolicy => "rewrite.embed_policy",
            Self::AssetDir => "rewrite.asset_dir",
            Self::PageMarkerClass => "rewrite.page_marker_class",
            Self::ScalingFactor => "rewrite.scaling_factor",
            Self::FixTextRuns => "rewrite.fix_text_runs",
            Self::AllowedOrigins => "bridge.allowed_origins",
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Print a single value
    Get { key: String },
    /// Store a single value in the configuration file
    Set { key: String, value: String },
}

pub fn run(command: Option<ConfigCommand>, explicit: Option<&Path>) -> Result<()> {
    match command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => {
            let config = settings::load(explicit)?;
            print!("{}", toml::to_string_pretty(&config)?);
        },
        ConfigCommand::Path => {
            println!("{}", settings::config_path(explicit)?.display());
        },
        ConfigCommand::Get { key } => {
            let key = parse_key(&key)?;
            let config = settings::load(explicit)?;
            println!("{}", value_of(&config, key));
        },
        ConfigCommand::Set { key, value } => set_value(&key, &value, explicit)?,
    }
    Ok(())
}

fn set_value(raw_key: &str, raw_value: &str, explicit: Option<&Path>) -> Result<()> {
    let key = parse_key(raw_key)?;
    let path = settings::config_path(explicit)?;

    // Read the file itself so environment overrides are not persisted.
    let mut config = if path.exists() {
        Config::load_from(&path)?
    } else {
        Config::default()
    };

    apply(&mut config, key, raw_value)?;
    config
        .save_to(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("Set {} = {}", key.as_str(), value_of(&config, key));
    Ok(())
}

fn parse_key(raw: &str) -> Result<ConfigKey> {
    ConfigKey::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = ConfigKey::ALL.iter().map(|k| k.as_str()).collect();
        anyhow!(
            "unknown configuration key '{raw}' (expected one of: {})",
            known.join(", ")
        )
    })
}

fn value_of(config: &Config, key: ConfigKey) -> String {
    match key {
        ConfigKey::ServiceOrigin => config.service.origin.clone(),
        ConfigKey::PreviewEndpoint => config.service.preview_endpoint.clone(),
        ConfigKey::TimeoutSecs => config.fetch.timeout_secs.to_string(),
        ConfigKey::EmbedPolicy => match config.rewrite.embed_policy {
            EmbedPolicy::Img => "img".to_string(),
            EmbedPolicy::Iframe => "iframe".to_string(),
        },
        ConfigKey::AssetDir => config.rewrite.asset_dir.clone(),
        ConfigKey::PageMarkerClass => config.rewrite.page_marker_class.clone(),
        ConfigKey::ScalingFactor => config
            .rewrite
            .scaling_factor
            .map_or_else(|| "not set".to_string(), |f| f.to_string()),
        ConfigKey::FixTextRuns => config.rewrite.fix_text_runs.to_string(),
        ConfigKey::AllowedOrigins => config.bridge.allowed_origins.join(","),
    }
}

fn apply(config: &mut Config, key: ConfigKey, raw: &str) -> Result<()> {
    let value = raw.trim();
    match key {
        ConfigKey::ServiceOrigin => {
            config.service.origin = value.trim_end_matches('/').to_string();
        },
        ConfigKey::PreviewEndpoint => config.service.preview_endpoint = value.to_string(),
        ConfigKey::TimeoutSecs => {
            config.fetch.timeout_secs = value
                .parse()
                .map_err(|_| anyhow!("expected a number of seconds, got '{value}'"))?;
        },
        ConfigKey::EmbedPolicy => {
            config.rewrite.embed_policy = match value.to_ascii_lowercase().as_str() {
                "img" => EmbedPolicy::Img,
                "iframe" => EmbedPolicy::Iframe,
                other => return Err(anyhow!("expected 'img' or 'iframe', got '{other}'")),
            };
        },
        ConfigKey::AssetDir => config.rewrite.asset_dir = value.to_string(),
        ConfigKey::PageMarkerClass => config.rewrite.page_marker_class = value.to_string(),
        ConfigKey::ScalingFactor => {
            config.rewrite.scaling_factor = if value.is_empty() || value == "none" {
                None
            } else {
                let factor: f64 = value
                    .parse()
                    .map_err(|_| anyhow!("expected a zoom factor, got '{value}'"))?;
                if !(factor.is_finite() && factor > 0.0) {
                    return Err(anyhow!("zoom factor must be positive, got '{value}'"));
                }
                Some(factor)
            };
        },
        ConfigKey::FixTextRuns => config.rewrite.fix_text_runs = parse_bool(value)?,
        ConfigKey::AllowedOrigins => {
            config.bridge.allowed_origins = value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToString::to_string)
                .collect();
        },
    }
    Ok(())
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected boolean value, got '{other}'")),
    }
}
