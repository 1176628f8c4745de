//! # DevRS Copy Error Types
//!
//! File: copy/src/core/error.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! This module defines the failure types returned by every copy command. Each
//! outcome is a distinct variant so callers can pattern-match instead of
//! inspecting strings.
//!
//! ## Architecture
//!
//! The error system consists of three components:
//! - `CopyError`: The failure taxonomy surfaced to callers (`NotFound`, `Protocol`,
//!   `Transport`, `Local`).
//! - `EngineError`: What the injected engine transport reports. It is translated into a
//!   `CopyError` by `map_engine_error`.
//! - `Result<T>`: A type alias for `std::result::Result<T, CopyError>`.
//!
//! None of these failures are retried here; retry policy belongs to the caller.
//!
//! ## Examples
//!
//! ```rust,no_run
//! # use devrs_copy::{CopyError, CopyExecutor, ArchiveSource};
//! # async fn run(executor: CopyExecutor) {
//! match executor
//!     .copy_to_container("non-existing", "/", ArchiveSource::host_path("./testReadFile"))
//!     .await
//! {
//!     Ok(()) => println!("copied"),
//!     Err(CopyError::NotFound { container, .. }) => println!("no container {container}"),
//!     Err(e) if e.is_retryable() => println!("connection trouble: {e}"),
//!     Err(e) => println!("copy failed: {e}"),
//! }
//! # }
//! ```
//!
use std::io;
use thiserror::Error;

/// Failure reported by an engine transport.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine answered with a non-2xx status and an error message.
    #[error("Engine responded with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The exchange could not be completed (refused, reset, timed out, unreadable response).
    #[error("Engine connection failed: {source}")]
    Connection {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EngineError {
    /// Builds a `Connection` failure from a plain message.
    pub fn connection(message: impl Into<String>) -> Self {
        EngineError::Connection {
            source: message.into().into(),
        }
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            // bollard has already pulled `message` out of the engine's JSON body.
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => EngineError::Status {
                status: status_code,
                message,
            },
            other => EngineError::Connection {
                source: Box::new(other),
            },
        }
    }
}

/// Outcome of a failed copy command.
#[derive(Error, Debug)]
pub enum CopyError {
    #[error("Container '{container}' not found: {message}")]
    NotFound { container: String, message: String },

    #[error("Engine rejected the request (HTTP {status}): {message}")]
    Protocol { status: u16, message: String },

    #[error("Transport failure talking to the engine about '{container}': {source}")]
    Transport {
        container: String,
        #[source]
        source: EngineError,
    },

    #[error("Local filesystem error while {context}: {source}")]
    Local {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl CopyError {
    /// Wraps an I/O failure that happened on the host side.
    pub fn local(context: impl Into<String>, source: io::Error) -> Self {
        CopyError::Local {
            context: context.into(),
            source,
        }
    }

    /// True for connection-level failures, the only kind a caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CopyError::Transport { .. })
    }

    /// True if the engine reported that the container does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CopyError::NotFound { .. })
    }
}

/// Translates an engine failure for `container` into the caller-facing taxonomy.
///
/// HTTP 404 becomes `NotFound`, any other status becomes `Protocol` with the engine's
/// message kept verbatim, and connection failures become `Transport`.
pub fn map_engine_error(container: &str, err: EngineError) -> CopyError {
    match err {
        EngineError::Status {
            status: 404,
            message,
        } => CopyError::NotFound {
            container: container.to_string(),
            message,
        },
        EngineError::Status { status, message } => CopyError::Protocol { status, message },
        connection @ EngineError::Connection { .. } => CopyError::Transport {
            container: container.to_string(),
            source: connection,
        },
    }
}

/// Type alias for results of copy commands.
pub type Result<T> = std::result::Result<T, CopyError>;
