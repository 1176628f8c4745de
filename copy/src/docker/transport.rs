//! # DevRS Archive Transport (`docker::transport`)
//!
//! File: copy/src/docker/transport.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! The seam between copy commands and the Docker Engine. `ArchiveTransport` covers the
//! two archive endpoints of the Engine API:
//!
//! - `PUT /containers/{id}/archive?path=...` to extract a tar stream into a container.
//! - `GET /containers/{id}/archive?path=...` to read a path out of a container as tar.
//!
//! `bollard::Docker` implements it for real engines. Tests inject an in-memory engine
//! through the same trait, which is why the executor is generic over it.
//!
use crate::core::error::EngineError;
use async_trait::async_trait;
use bollard::container::{DownloadFromContainerOptions, UploadToContainerOptions};
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use tracing::debug;

/// Where an upload's archive is extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyDestination {
    pub container_id: String,
    /// Directory inside the container. Must already exist there.
    pub path: String,
}

/// Query flags sent with an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub no_overwrite_dir_non_dir: bool,
}

/// Engine-side archive operations.
#[async_trait]
pub trait ArchiveTransport: Send + Sync {
    /// Streams `body` as the request body of an archive upload. Resolves once the engine
    /// has answered; an engine error status is reported as `EngineError::Status`.
    async fn upload_archive(
        &self,
        destination: &CopyDestination,
        options: &UploadOptions,
        body: BoxStream<'static, Bytes>,
    ) -> Result<(), EngineError>;

    /// Opens the archive of `path` inside the container. Nothing is requested until
    /// the stream is first polled; errors, including the response status, arrive as items.
    fn download_archive(
        &self,
        container_id: &str,
        path: &str,
    ) -> BoxStream<'static, Result<Bytes, EngineError>>;
}

#[async_trait]
impl ArchiveTransport for Docker {
    async fn upload_archive(
        &self,
        destination: &CopyDestination,
        options: &UploadOptions,
        body: BoxStream<'static, Bytes>,
    ) -> Result<(), EngineError> {
        let query = UploadToContainerOptions {
            path: destination.path.clone(),
            no_overwrite_dir_non_dir: options.no_overwrite_dir_non_dir.to_string(),
        };
        debug!(
            container = %destination.container_id,
            path = %destination.path,
            "PUT archive"
        );
        self.upload_to_container_streaming(&destination.container_id, Some(query), body)
            .await
            .map_err(EngineError::from)
    }

    fn download_archive(
        &self,
        container_id: &str,
        path: &str,
    ) -> BoxStream<'static, Result<Bytes, EngineError>> {
        debug!(container = %container_id, path = %path, "GET archive");
        let query = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        self.download_from_container(container_id, Some(query))
            .map(|chunk| chunk.map_err(EngineError::from))
            .boxed()
    }
}
