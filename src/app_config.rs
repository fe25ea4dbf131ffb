//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use catexplorer_core::ExportFormat;
use catexplorer_core::config::{MAX_DEPTH_LIMIT, is_valid_locale};
use serde::Deserialize;

/// TOML-backed file configuration for explorer defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default wiki language code.
    pub locale: Option<String>,
    /// Default prefetch depth (0..=5).
    pub depth: Option<usize>,
    /// Whether listings include articles.
    pub include_pages: Option<bool>,
    /// Default export format.
    pub format: Option<ExportFormat>,
    /// Minimum delay between API requests in milliseconds.
    pub rate_limit: Option<u64>,
    /// Attempts per API request.
    pub max_retries: Option<u32>,
    /// API endpoint template.
    pub api_url: Option<String>,
    /// User-Agent override.
    pub user_agent: Option<String>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Whole-request timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Continuation requests allowed per listing.
    pub max_continuations: Option<usize>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(locale) = &self.locale
            && !is_valid_locale(locale)
        {
            bail!("Invalid config value for `locale`: '{locale}'. Expected a wiki language code such as \"en\"");
        }
        if let Some(depth) = self.depth
            && depth > MAX_DEPTH_LIMIT
        {
            bail!("Invalid config value for `depth`: {depth}. Expected range: 0..={MAX_DEPTH_LIMIT}");
        }
        if let Some(rate_limit) = self.rate_limit
            && rate_limit > 60_000
        {
            bail!("Invalid config value for `rate_limit`: {rate_limit}. Expected range: 0..=60000");
        }
        if let Some(max_retries) = self.max_retries
            && !(1..=10).contains(&max_retries)
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 1..=10");
        }
        if let Some(max_continuations) = self.max_continuations
            && !(1..=1000).contains(&max_continuations)
        {
            bail!(
                "Invalid config value for `max_continuations`: {max_continuations}. Expected range: 1..=1000"
            );
        }
        if let Some(user_agent) = &self.user_agent
            && user_agent.trim().is_empty()
        {
            bail!("Invalid config value for `user_agent`: must not be empty");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

impl LoadedConfig {
    /// True when values came from disk.
    #[must_use]
    pub fn loaded_from_file(&self) -> bool {
        self.config.is_some()
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/catexplorer/config.toml`
/// 2. `$HOME/.config/catexplorer/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("catexplorer")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("catexplorer")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config named on the command line, or the default file if present.
///
/// An explicit path must exist; a missing default file is not an error.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let cfg: FileConfig = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}
