//! # DevRS Copy Integration Test Common Helpers
//!
//! File: copy/tests/common.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! ## Overview
//!
//! Shared helpers for the integration tests in `copy/tests/`:
//!
//! - `MockEngine`: an in-memory engine implementing `ArchiveTransport`. Each container
//!   is backed by a temporary directory; uploads are extracted into it and downloads
//!   are archived out of it, so copy commands can be exercised end to end without a
//!   Docker daemon.
//! - Host tree builders and a few assertions used by several test files.
//!

// Different test files use different helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use devrs_copy::archive::decode::ArchiveDecoder;
use devrs_copy::archive::tar::{ArchiveEncoder, EncodeOptions};
use devrs_copy::core::config::Config;
use devrs_copy::{ArchiveTransport, CopyDestination, CopyExecutor, EngineError, UploadOptions};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use walkdir::WalkDir;

/// How the mock answers archive uploads.
#[derive(Debug, Clone, Default)]
pub enum UploadBehavior {
    /// Read the whole body and extract it, like a healthy engine.
    #[default]
    Extract,
    /// Read the whole body, then answer with an error status.
    Status(u16, String),
    /// Drop the connection once this many body bytes have arrived.
    ResetAfter(usize),
    /// Answer success after reading a single chunk.
    AcceptEarly,
}

/// How the mock serves archive downloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DownloadBehavior {
    #[default]
    Serve,
    /// Send the first chunk, then fail the connection.
    FailAfterFirstChunk,
}

/// In-memory stand-in for the Docker Engine archive endpoints.
#[derive(Default)]
pub struct MockEngine {
    containers: Mutex<HashMap<String, TempDir>>,
    upload: Mutex<UploadBehavior>,
    download: Mutex<DownloadBehavior>,
    last_upload_options: Mutex<Option<UploadOptions>>,
    requests: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        MockEngine::default()
    }

    /// Adds an empty container called `id`.
    pub fn with_container(self, id: &str) -> Self {
        let root = tempfile::tempdir().expect("container root");
        self.containers.lock().unwrap().insert(id.to_string(), root);
        self
    }

    /// Creates a directory inside a container.
    pub fn mkdir(&self, id: &str, path: &str) {
        let root = self.container_root(id).expect("known container");
        fs::create_dir_all(resolve(&root, path)).unwrap();
    }

    /// Host directory backing a container's filesystem.
    pub fn container_root(&self, id: &str) -> Option<PathBuf> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .map(|dir| dir.path().to_path_buf())
    }

    pub fn set_upload_behavior(&self, behavior: UploadBehavior) {
        *self.upload.lock().unwrap() = behavior;
    }

    pub fn set_download_behavior(&self, behavior: DownloadBehavior) {
        *self.download.lock().unwrap() = behavior;
    }

    /// Number of archive requests received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn last_upload_options(&self) -> Option<UploadOptions> {
        *self.last_upload_options.lock().unwrap()
    }
}

fn resolve(root: &Path, container_path: &str) -> PathBuf {
    root.join(container_path.trim_start_matches('/'))
}

fn no_such_container(id: &str) -> EngineError {
    EngineError::Status {
        status: 404,
        message: format!("No such container: {id}"),
    }
}

fn no_such_path(id: &str, path: &str) -> EngineError {
    EngineError::Status {
        status: 404,
        message: format!("Could not find the file {path} in container {id}"),
    }
}

#[async_trait]
impl ArchiveTransport for MockEngine {
    async fn upload_archive(
        &self,
        destination: &CopyDestination,
        options: &UploadOptions,
        mut body: BoxStream<'static, Bytes>,
    ) -> Result<(), EngineError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.last_upload_options.lock().unwrap() = Some(*options);
        let behavior = self.upload.lock().unwrap().clone();
        let root = self
            .container_root(&destination.container_id)
            .ok_or_else(|| no_such_container(&destination.container_id))?;

        let mut archive = Vec::new();
        match behavior {
            UploadBehavior::Extract => {
                while let Some(chunk) = body.next().await {
                    archive.extend_from_slice(&chunk);
                }
            }
            UploadBehavior::Status(status, message) => {
                while body.next().await.is_some() {}
                return Err(EngineError::Status { status, message });
            }
            UploadBehavior::ResetAfter(limit) => {
                while let Some(chunk) = body.next().await {
                    archive.extend_from_slice(&chunk);
                    if archive.len() >= limit {
                        return Err(EngineError::connection("connection reset by peer"));
                    }
                }
            }
            UploadBehavior::AcceptEarly => {
                body.next().await;
                return Ok(());
            }
        }

        let target = resolve(&root, &destination.path);
        if !target.is_dir() {
            return Err(no_such_path(&destination.container_id, &destination.path));
        }
        ArchiveDecoder::new(archive.as_slice())
            .and_then(|decoder| decoder.unpack(&target))
            .map_err(|e| EngineError::Status {
                status: 500,
                message: e.to_string(),
            })
    }

    fn download_archive(
        &self,
        container_id: &str,
        path: &str,
    ) -> BoxStream<'static, Result<Bytes, EngineError>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let Some(root) = self.container_root(container_id) else {
            return stream::iter(vec![Err(no_such_container(container_id))]).boxed();
        };
        let target = resolve(&root, path);
        if fs::symlink_metadata(&target).is_err() {
            return stream::iter(vec![Err(no_such_path(container_id, path))]).boxed();
        }

        let options = EncodeOptions {
            chunk_size: 1024,
            ..EncodeOptions::default()
        };
        let encoded = ArchiveEncoder::new(&target, options);
        let mut chunks: Vec<Result<Bytes, EngineError>> = match encoded {
            Ok(encoder) => encoder
                .map(|chunk| chunk.map_err(|e| EngineError::connection(e.to_string())))
                .collect(),
            Err(e) => vec![Err(EngineError::connection(e.to_string()))],
        };
        if *self.download.lock().unwrap() == DownloadBehavior::FailAfterFirstChunk {
            chunks.truncate(1);
            chunks.push(Err(EngineError::connection("connection reset by peer")));
        }
        stream::iter(chunks).boxed()
    }
}

/// Executor over `engine` with small chunks so tests cross many chunk boundaries.
pub fn mock_executor(engine: MockEngine) -> CopyExecutor<MockEngine> {
    let mut config = Config::default();
    config.archive.chunk_size = 2048;
    CopyExecutor::new(engine, config)
}

pub fn init_tracing() {
    devrs_copy::core::logging::init_tracing(2);
}

/// Builds `root/a/file` and an empty `root/b`, so the archive's last entry is an empty directory.
pub fn empty_dir_last_tree(root: &Path) {
    fs::create_dir_all(root.join("a")).unwrap();
    fs::write(root.join("a/file"), "").unwrap();
    fs::create_dir_all(root.join("b")).unwrap();
}

/// Writes each `(relative path, content)` pair under `root`, creating parents.
pub fn write_files(root: &Path, files: &[(&str, &[u8])]) {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

/// What a tree looks like: relative path to `None` for directories or file content.
pub type TreeSnapshot = BTreeMap<String, Option<Vec<u8>>>;

/// Snapshot of everything under `root` (excluding `root` itself).
pub fn snapshot(root: &Path) -> TreeSnapshot {
    let mut tree = TreeSnapshot::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.unwrap();
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        let content = if entry.file_type().is_dir() {
            None
        } else {
            Some(fs::read(entry.path()).unwrap())
        };
        tree.insert(relative, content);
    }
    tree
}
