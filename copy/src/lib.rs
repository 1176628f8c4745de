//! # DevRS Copy Library
//!
//! File: copy/src/lib.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! `devrs-copy` moves files between the host and Docker containers through the
//! Engine's archive endpoints.
//!
//! - **Copy in**: a host file or directory is serialized into a tar stream on the fly
//!   (optionally gzip-compressed) and sent as the body of the upload request, one
//!   bounded chunk at a time. A pre-built archive can be forwarded instead.
//! - **Copy out**: the engine's tar stream for a container path is returned as an
//!   `ArchiveDownload`, which can be read raw, listed, or unpacked onto the host.
//!
//! Failures are typed (`CopyError::NotFound`, `Protocol`, `Transport`, `Local`) so
//! callers can tell a missing container from a network problem or a host-side I/O error.
//!
//! ## Architecture
//!
//! - **`core`**: configuration, error types and logging setup.
//! - **`archive`**: the tar codec (encoder, decoder, gzip, entry model).
//! - **`docker`**: the engine transport seam, request body adapter, download handle
//!   and the `CopyExecutor` itself.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use devrs_copy::{ArchiveSource, CopyExecutor, HostPathSource};
//! use devrs_copy::core::config::load_config;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = CopyExecutor::connect(load_config()?)?;
//!
//! let source = HostPathSource::new("./site").children_only(true).compress(true);
//! executor.copy_to_container("web", "/usr/share/nginx/html", source.into()).await?;
//!
//! executor
//!     .copy_from_container("web", "/var/log/nginx")
//!     .await?
//!     .unpack_into("./logs")
//!     .await?;
//! # let _ = ArchiveSource::host_path(".");
//! # Ok(())
//! # }
//! ```
//!
pub mod archive;
pub mod core;
pub mod docker;

pub use crate::archive::entry::{ArchiveEntry, EntryKind};
pub use crate::archive::{ArchiveSource, HostPathSource};
pub use crate::core::config::{Config, SymlinkPolicy};
pub use crate::core::error::{CopyError, EngineError, Result};
pub use crate::docker::{
    ArchiveDownload, ArchiveTransport, CopyDestination, CopyExecutor, UploadOptions,
};
