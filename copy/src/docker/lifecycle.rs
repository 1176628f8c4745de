//! # DevRS Container Lifecycle Helpers
//!
//! File: copy/src/docker/lifecycle.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! Minimal create/start/remove wrappers over `bollard`. Copy commands do not need them;
//! they exist so callers and live tests can stand up a throwaway target container.
//! Failures use the same `CopyError` taxonomy as the copy commands.
//!
use crate::core::error::{map_engine_error, CopyError, EngineError, Result};
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::Docker;
use tracing::{info, instrument, warn};

/// Creates a container from `image` and returns its id.
///
/// An unknown image is reported as `CopyError::Protocol` with status 404, since no
/// container is involved yet.
#[instrument(skip(docker, cmd))]
pub async fn create_container(
    docker: &Docker,
    image: &str,
    name: Option<&str>,
    cmd: Option<Vec<String>>,
) -> Result<String> {
    let options = name.map(|name| CreateContainerOptions {
        name: name.to_string(),
        platform: None,
    });
    let config = Config {
        image: Some(image.to_string()),
        cmd,
        ..Default::default()
    };
    match docker.create_container(options, config).await {
        Ok(response) => {
            for warning in &response.warnings {
                warn!("Engine warning while creating container: {}", warning);
            }
            info!("Created container '{}' from image '{}'", response.id, image);
            Ok(response.id)
        }
        Err(err) => match EngineError::from(err) {
            EngineError::Status { status, message } => Err(CopyError::Protocol { status, message }),
            connection => Err(map_engine_error(name.unwrap_or(image), connection)),
        },
    }
}

/// Starts a container. Starting one that is already running is not an error.
#[instrument(skip(docker))]
pub async fn start_container(docker: &Docker, container_id: &str) -> Result<()> {
    match docker
        .start_container(container_id, None::<StartContainerOptions<String>>)
        .await
    {
        Ok(()) => {
            info!("Started container '{}'", container_id);
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 304, ..
        }) => {
            info!("Container '{}' was already started.", container_id);
            Ok(())
        }
        Err(err) => Err(map_engine_error(container_id, err.into())),
    }
}

/// Removes a container, killing it first when `force` is set.
#[instrument(skip(docker))]
pub async fn remove_container(docker: &Docker, container_id: &str, force: bool) -> Result<()> {
    let options = RemoveContainerOptions {
        force,
        ..Default::default()
    };
    docker
        .remove_container(container_id, Some(options))
        .await
        .map_err(|err| map_engine_error(container_id, err.into()))?;
    info!("Removed container '{}'", container_id);
    Ok(())
}
