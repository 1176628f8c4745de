//! # DevRS Copy Configuration
//!
//! File: copy/src/core/config.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! This module implements the configuration for the copy library: how to reach the
//! Docker Engine, how archives are produced, and which flags accompany uploads.
//!
//! ## Architecture
//!
//! - Configuration is read from a TOML file (`copy.toml`) in the user's config directory,
//!   or from any path/string the embedder chooses.
//! - Every field has a default, so an empty file (or no file at all) is valid.
//! - `~` in the engine host is expanded before use.
//! - Configuration is validated before it is handed to the executor.
//!
//! ## Examples
//!
//! ```toml
//! [engine]
//! host = "unix://~/.colima/default/docker.sock"
//! timeout_secs = 60
//!
//! [archive]
//! chunk_size = 131072
//! symlinks = "follow"
//! ```
//!
//! ```rust,no_run
//! let cfg = devrs_copy::core::config::load_config()?;
//! println!("chunk size: {}", cfg.archive.chunk_size);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::{debug, info};

const CONFIG_FILENAME: &str = "copy.toml";

/// Top-level configuration, loaded from TOML.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

/// How to reach the Docker Engine.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine address (`unix://...`, `tcp://...` or `http://...`). When absent the
    /// client uses bollard's local defaults, which honour `DOCKER_HOST`.
    #[serde(default)]
    pub host: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Tuning for archive production.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Upper bound (in uncompressed bytes) for each chunk handed to the request body.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Gzip level used when a host path source asks for compression.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    /// What to do with symbolic links found while walking a host tree.
    #[serde(default)]
    pub symlinks: SymlinkPolicy,
}

/// Symbolic link handling during encoding.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkPolicy {
    /// Emit links as symlink entries without following them.
    #[default]
    Preserve,
    /// Archive whatever the link points to.
    Follow,
}

/// Flags forwarded to the engine with every upload.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UploadConfig {
    /// Fail instead of replacing an existing directory with a non-directory (and vice versa).
    #[serde(default)]
    pub no_overwrite_dir_non_dir: bool,
}

fn default_timeout_secs() -> u64 {
    120
}
fn default_chunk_size() -> usize {
    64 * 1024
}
fn default_compression_level() -> u32 {
    6
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            host: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            chunk_size: default_chunk_size(),
            compression_level: default_compression_level(),
            symlinks: SymlinkPolicy::default(),
        }
    }
}

impl Config {
    /// Parses, expands and validates configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Config> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse copy configuration TOML")?;
        expand_config_paths(&mut config);
        validate_config(&config)?;
        Ok(config)
    }
}

/// Loads the user configuration file if one exists, otherwise returns defaults.
pub fn load_config() -> Result<Config> {
    let Some(proj_dirs) = ProjectDirs::from("com", "DevRS", "devrs") else {
        debug!("Could not determine user config directory, using defaults.");
        return Ok(Config::default());
    };
    let config_path = proj_dirs.config_dir().join(CONFIG_FILENAME);
    if config_path.is_file() {
        info!("Loading copy configuration from: {}", config_path.display());
        load_config_from_path(&config_path)
    } else {
        debug!(
            "No copy configuration at {}, using defaults.",
            config_path.display()
        );
        Ok(Config::default())
    }
}

/// Loads, expands and validates configuration from a specific file.
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    Config::from_toml_str(&content)
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}

fn expand_config_paths(config: &mut Config) {
    if let Some(host) = config.engine.host.as_mut() {
        if let Some(socket) = host.strip_prefix("unix://") {
            *host = format!("unix://{}", shellexpand::tilde(socket));
            debug!("Expanded engine host: {}", host);
        }
    }
}

/// Checks a configuration for values the executor cannot work with.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.archive.chunk_size == 0 {
        bail!("archive.chunk_size must be greater than zero");
    }
    if config.archive.compression_level > 9 {
        bail!(
            "archive.compression_level must be between 0 and 9, got {}",
            config.archive.compression_level
        );
    }
    if let Some(host) = &config.engine.host {
        let supported = ["unix://", "tcp://", "http://"];
        if !supported.iter().any(|scheme| host.starts_with(scheme)) {
            bail!(
                "Unsupported engine host '{}'. Expected unix://, tcp:// or http://",
                host
            );
        }
    }
    Ok(())
}
