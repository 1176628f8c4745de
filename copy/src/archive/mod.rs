//! # DevRS Archive Codec (`archive`)
//!
//! File: copy/src/archive/mod.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! This module is the bridge between host files and the tar streams the Docker Engine
//! accepts and returns. It contains:
//!
//! - `tar`: the lazy encoder that walks a host path and yields bounded chunks.
//! - `decode`: the reader for archives coming back from the engine.
//! - `compression`: chunked gzip and gzip detection.
//! - `entry`: the `ArchiveEntry` type both directions share.
//!
//! It also defines `ArchiveSource`, the two ways a caller can supply upload content,
//! and `encode`, which turns either kind into a `ChunkSource`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use devrs_copy::archive::{encode, ArchiveSource, HostPathSource};
//! use devrs_copy::core::config::ArchiveConfig;
//!
//! let source = HostPathSource::new("./project").compress(true).children_only(true);
//! let chunks = encode(source.into(), &ArchiveConfig::default())?;
//! for chunk in chunks {
//!     let _bytes = chunk?;
//! }
//! # Ok::<(), devrs_copy::CopyError>(())
//! ```
//!
pub mod compression;
pub mod decode;
pub mod entry;
pub mod tar;

use self::tar::{ArchiveEncoder, EncodeOptions};
use crate::core::config::ArchiveConfig;
use crate::core::error::{CopyError, Result};
use bytes::Bytes;
use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::debug;

/// A lazily produced sequence of archive byte chunks.
pub type ChunkSource = Box<dyn Iterator<Item = Result<Bytes>> + Send>;

/// Content for an upload.
pub enum ArchiveSource {
    /// Bytes that already form a tar (optionally gzip) archive; sent unmodified.
    Raw(Box<dyn Read + Send>),
    /// A host file or directory to archive on the fly.
    HostPath(HostPathSource),
}

impl ArchiveSource {
    /// Archives `path` recursively, uncompressed, under its own base name.
    pub fn host_path(path: impl Into<PathBuf>) -> Self {
        ArchiveSource::HostPath(HostPathSource::new(path))
    }

    /// Sends an already-built archive read from `reader`.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        ArchiveSource::Raw(Box::new(reader))
    }
}

impl fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveSource::Raw(_) => f.write_str("Raw(..)"),
            ArchiveSource::HostPath(source) => f.debug_tuple("HostPath").field(source).finish(),
        }
    }
}

impl From<HostPathSource> for ArchiveSource {
    fn from(source: HostPathSource) -> Self {
        ArchiveSource::HostPath(source)
    }
}

/// A host path plus the flags that shape its archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPathSource {
    pub path: PathBuf,
    pub recurse: bool,
    pub compress: bool,
    pub children_only: bool,
}

impl HostPathSource {
    /// Starts from the defaults: recursive, uncompressed, root name kept.
    ///
    /// # Arguments
    ///
    /// * `path` - Host file or directory to archive.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HostPathSource {
            path: path.into(),
            recurse: true,
            compress: false,
            children_only: false,
        }
    }

    /// Whether to descend into directories.
    pub fn recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    /// Whether to gzip the archive before sending it.
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// For a directory, archive only what is inside it.
    pub fn children_only(mut self, children_only: bool) -> Self {
        self.children_only = children_only;
        self
    }
}

/// Turns a source into chunks of archive bytes.
///
/// For host paths the root is inspected here, so a missing path fails with
/// `CopyError::Local` before anything is sent. File content is only read as the
/// returned iterator is pulled.
pub fn encode(source: ArchiveSource, config: &ArchiveConfig) -> Result<ChunkSource> {
    match source {
        ArchiveSource::Raw(reader) => {
            debug!("Streaming caller-supplied archive");
            Ok(Box::new(ReaderChunks::new(reader, config.chunk_size)))
        }
        ArchiveSource::HostPath(source) => {
            let options = EncodeOptions {
                recurse: source.recurse,
                compress: source.compress,
                children_only: source.children_only,
                ..EncodeOptions::from_config(config)
            };
            Ok(Box::new(ArchiveEncoder::new(source.path, options)?))
        }
    }
}

/// Splits a reader into chunks of at most `chunk_size` bytes.
pub struct ReaderChunks {
    reader: Box<dyn Read + Send>,
    chunk_size: usize,
    done: bool,
}

impl ReaderChunks {
    pub fn new(reader: Box<dyn Read + Send>, chunk_size: usize) -> Self {
        ReaderChunks {
            reader,
            chunk_size: chunk_size.max(1),
            done: false,
        }
    }
}

impl Iterator for ReaderChunks {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => {
                    buf.truncate(n);
                    return Some(Ok(Bytes::from(buf)));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(CopyError::local("reading archive source", e)));
                }
            }
        }
    }
}
