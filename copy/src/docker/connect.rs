//! # DevRS Docker Connection Helper
//!
//! File: copy/src/docker/connect.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! Builds a `bollard::Docker` client from `EngineConfig`. Without an explicit host the
//! client uses bollard's local defaults (which honour `DOCKER_HOST`). Connection
//! failures are reported as `CopyError::Transport`.
//!
use crate::core::config::EngineConfig;
use crate::core::error::{CopyError, EngineError, Result};
use bollard::{Docker, API_DEFAULT_VERSION};
use std::time::Duration;
use tracing::instrument;

/// Creates an engine client for `config`. No request is made until the client is used.
#[instrument(skip(config), fields(host = config.host.as_deref().unwrap_or("default")))]
pub fn connect_docker(config: &EngineConfig) -> Result<Docker> {
    let connected = match config.host.as_deref() {
        None => Docker::connect_with_local_defaults()
            .map(|docker| docker.with_timeout(Duration::from_secs(config.timeout_secs))),
        #[cfg(unix)]
        Some(host) if host.starts_with("unix://") => {
            Docker::connect_with_unix(host, config.timeout_secs, API_DEFAULT_VERSION)
        }
        Some(host) => Docker::connect_with_http(host, config.timeout_secs, API_DEFAULT_VERSION),
    };
    connected.map_err(|e| CopyError::Transport {
        container: String::new(),
        source: EngineError::from(e),
    })
}
