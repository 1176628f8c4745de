//! # DevRS Docker Module Interface
//!
//! File: copy/src/docker/mod.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! Everything that talks to the Docker Engine. Archive bytes are produced and consumed
//! by `crate::archive`; this module moves them over the wire.
//!
//! - **`transport`**: The `ArchiveTransport` seam and its `bollard::Docker` implementation.
//! - **`connect`**: Builds a `bollard` client from configuration.
//! - **`body`**: Turns a chunk source into a lazily polled request body.
//! - **`download`**: The `ArchiveDownload` handle returned by copy-from.
//! - **`operations`**: `CopyExecutor`, which runs the copy commands.
//! - **`lifecycle`**: Create/start/remove helpers for standing up target containers.
//!

/// Request body adapter and upload monitor.
pub mod body;
/// Connection to the Docker daemon.
pub mod connect;
/// Handle over an archive downloaded from a container.
pub mod download;
/// Container create/start/remove helpers.
pub mod lifecycle;
/// The copy commands.
pub mod operations;
/// Engine archive endpoints.
pub mod transport;

// --- Re-exports ---
pub use connect::connect_docker;
pub use download::ArchiveDownload;
pub use lifecycle::{create_container, remove_container, start_container};
pub use operations::CopyExecutor;
pub use transport::{ArchiveTransport, CopyDestination, UploadOptions};
