//! # DevRS Copy Operations (`docker::operations`)
//!
//! File: copy/src/docker/operations.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! This module provides `CopyExecutor`, which runs the two copy commands against an
//! engine transport:
//!
//! - `copy_to_container`: serialize a host path (or forward a caller-supplied archive)
//!   and stream it into a directory of a container.
//! - `copy_from_container`: ask the engine for the archive of a container path and
//!   return it as an `ArchiveDownload`.
//!
//! ## Architecture
//!
//! The executor owns an `ArchiveTransport` (a `bollard::Docker` client by default) and
//! the loaded `Config`. It holds no per-call state, so one executor can run many
//! commands concurrently from different tasks.
//!
//! For uploads, a host source is inspected before the request is made, so a missing
//! path fails with `CopyError::Local` and nothing is sent. Once streaming has started,
//! a local failure truncates the request body; that local failure is what the caller
//! sees, even if the engine also complained about the short archive.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use devrs_copy::{ArchiveSource, CopyExecutor};
//! use devrs_copy::core::config::load_config;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = CopyExecutor::connect(load_config()?)?;
//! executor
//!     .copy_to_container("my-container", "/tmp", ArchiveSource::host_path("./testReadFile"))
//!     .await?;
//! let download = executor.copy_from_container("my-container", "/tmp/testReadFile").await?;
//! for entry in download.entries().await? {
//!     println!("{} ({} bytes)", entry.path, entry.size);
//! }
//! # Ok(())
//! # }
//! ```
//!
use super::body::{streaming_body, UploadMonitor};
use super::connect::connect_docker;
use super::download::ArchiveDownload;
use super::transport::{ArchiveTransport, CopyDestination, UploadOptions};
use crate::archive::{self, ArchiveSource};
use crate::core::config::Config;
use crate::core::error::{map_engine_error, CopyError, EngineError, Result};
use bollard::Docker;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Runs copy commands against an engine transport.
pub struct CopyExecutor<T = Docker> {
    transport: T,
    config: Config,
}

impl CopyExecutor<Docker> {
    /// Connects to the engine described by `config.engine`.
    pub fn connect(config: Config) -> Result<Self> {
        let docker = connect_docker(&config.engine)?;
        Ok(CopyExecutor::new(docker, config))
    }
}

impl<T: ArchiveTransport> CopyExecutor<T> {
    /// Creates an executor over an existing transport.
    ///
    /// # Arguments
    ///
    /// * `transport` - The engine capability used for every copy command.
    /// * `config` - Archive and upload settings applied to each call.
    ///
    /// # Returns
    ///
    /// * `Self` - An executor that can be shared across tasks by reference.
    pub fn new(transport: T, config: Config) -> Self {
        CopyExecutor { transport, config }
    }

    /// The configuration this executor was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying transport, e.g. the `bollard::Docker` client for lifecycle calls.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Copies `source` into the directory `dest_path` of container `container_id`.
    ///
    /// `dest_path` must already exist in the container. Host sources are archived
    /// lazily while the request body is being sent.
    ///
    /// # Errors
    ///
    /// * `CopyError::Local` if the host side could not be read.
    /// * `CopyError::NotFound` if the engine does not know the container.
    /// * `CopyError::Protocol` for any other engine error status (message kept verbatim).
    /// * `CopyError::Transport` if the exchange with the engine broke down.
    #[instrument(skip(self, source), fields(container = %container_id, dest = %dest_path))]
    pub async fn copy_to_container(
        &self,
        container_id: &str,
        dest_path: &str,
        source: ArchiveSource,
    ) -> Result<()> {
        info!(
            "Copying archive into container '{}' at '{}'",
            container_id, dest_path
        );
        let chunks = archive::encode(source, &self.config.archive)?;

        let monitor = UploadMonitor::new();
        let body = streaming_body(chunks, Arc::clone(&monitor));
        let destination = CopyDestination {
            container_id: container_id.to_string(),
            path: dest_path.to_string(),
        };
        let options = UploadOptions {
            no_overwrite_dir_non_dir: self.config.upload.no_overwrite_dir_non_dir,
        };
        let outcome = self
            .transport
            .upload_archive(&destination, &options, body)
            .await;

        if let Some(local) = monitor.take_failure() {
            if let Err(engine_err) = &outcome {
                warn!(
                    "Engine also reported a failure for the truncated upload: {}",
                    engine_err
                );
            }
            return Err(local);
        }

        match outcome {
            Ok(()) if monitor.is_finished() => {
                info!(
                    bytes = monitor.bytes_sent(),
                    chunks = monitor.chunks(),
                    "Copied archive into container '{}'",
                    container_id
                );
                Ok(())
            }
            Ok(()) => {
                // The engine answered before consuming the whole body.
                error!(
                    "Engine accepted only {} bytes of the archive for '{}'",
                    monitor.bytes_sent(),
                    container_id
                );
                Err(CopyError::Transport {
                    container: container_id.to_string(),
                    source: EngineError::connection(
                        "upload not confirmed: request body was not fully sent",
                    ),
                })
            }
            Err(err) => {
                let err = map_engine_error(container_id, err);
                error!("Copy into container '{}' failed: {}", container_id, err);
                Err(err)
            }
        }
    }

    /// Reads `path` out of container `container_id` as a tar archive.
    ///
    /// The engine names the archive's root entry after the last component of `path`.
    /// A missing container is reported here, before any bytes are read.
    #[instrument(skip(self), fields(container = %container_id))]
    pub async fn copy_from_container(
        &self,
        container_id: &str,
        path: &str,
    ) -> Result<ArchiveDownload> {
        info!("Copying '{}' out of container '{}'", path, container_id);
        let stream = self.transport.download_archive(container_id, path);
        ArchiveDownload::open(container_id, path, stream)
            .await
            .inspect_err(|err| error!("Copy from container '{}' failed: {}", container_id, err))
    }
}
