//! # DevRS Archive Download Handle (`docker::download`)
//!
//! File: copy/src/docker/download.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! `ArchiveDownload` is what `copy_from_container` returns: a readable handle over the
//! tar stream the engine sends back. The first non-empty chunk is fetched before the
//! handle is handed out, which is how a missing container surfaces as
//! `CopyError::NotFound` from the call itself rather than on first read.
//!
//! The handle can be consumed as a `Stream` of chunks, as an `AsyncRead`, as a
//! blocking `Read` for use on a blocking thread, or decoded directly with
//! `entries`/`unpack_into`. Dropping it releases the underlying connection.
//!
//! `entries` and `unpack_into` decode on a blocking thread. If the returned future is
//! dropped before it completes, the download stream ends and the blocking decoder
//! fails its next read, so nothing more is pulled from the engine or written to disk.
//!
use crate::archive::decode::{list_entries, ArchiveDecoder};
use crate::archive::entry::ArchiveEntry;
use crate::core::error::{map_engine_error, CopyError, EngineError, Result};
use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncRead;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

/// Readable archive returned by the engine for a container path.
pub struct ArchiveDownload {
    container: String,
    path: String,
    head: Option<Bytes>,
    had_bytes: bool,
    rest: BoxStream<'static, std::result::Result<Bytes, EngineError>>,
}

impl std::fmt::Debug for ArchiveDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveDownload")
            .field("container", &self.container)
            .field("path", &self.path)
            .field("has_bytes", &self.has_bytes())
            .finish_non_exhaustive()
    }
}

impl ArchiveDownload {
    /// Waits for the engine's first answer on `stream`.
    pub(crate) async fn open(
        container: &str,
        path: &str,
        mut stream: BoxStream<'static, std::result::Result<Bytes, EngineError>>,
    ) -> Result<Self> {
        let head = loop {
            match stream.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => break Some(chunk),
                Some(Err(err)) => return Err(map_engine_error(container, err)),
                None => break None,
            }
        };
        debug!(
            container = %container,
            path = %path,
            empty = head.is_none(),
            "Archive download opened"
        );
        Ok(ArchiveDownload {
            container: container.to_string(),
            path: path.to_string(),
            had_bytes: head.is_some(),
            head,
            rest: stream,
        })
    }

    pub fn container_id(&self) -> &str {
        &self.container
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// True if the engine answered with a non-empty archive. Consuming the
    /// stream does not change the answer.
    pub fn has_bytes(&self) -> bool {
        self.had_bytes
    }

    /// Next chunk of raw archive bytes, or `None` at the end of the stream.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        self.next().await
    }

    /// Reads the whole archive into memory.
    pub async fn into_bytes(mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }

    /// Adapts the handle into an `AsyncRead` over the raw archive bytes.
    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin + 'static {
        StreamReader::new(self.map(|chunk| chunk.map_err(io::Error::other)))
    }

    /// Adapts the handle into a blocking `Read`.
    ///
    /// Must be created inside a tokio runtime and read from a blocking thread
    /// (for example inside `tokio::task::spawn_blocking`).
    pub fn into_blocking_reader(self) -> impl Read + Send + 'static {
        SyncIoBridge::new(self.into_async_read())
    }

    /// Decodes the archive and returns its members, skipping content.
    ///
    /// # Errors
    ///
    /// * `CopyError::Local` if the archive is malformed or the download breaks off
    ///   mid-stream.
    pub async fn entries(self) -> Result<Vec<ArchiveEntry>> {
        let (reader, _cancel) = self.into_cancellable_reader();
        tokio::task::spawn_blocking(move || list_entries(reader))
            .await
            .map_err(join_error)?
    }

    /// Decodes the archive onto the host under `dest`.
    ///
    /// Dropping the returned future stops extraction at the next read, which may leave
    /// the file being written incomplete.
    pub async fn unpack_into(self, dest: impl AsRef<Path>) -> Result<()> {
        let dest: PathBuf = dest.as_ref().to_path_buf();
        let (reader, _cancel) = self.into_cancellable_reader();
        tokio::task::spawn_blocking(move || ArchiveDecoder::new(reader)?.unpack(&dest))
            .await
            .map_err(join_error)?
    }

    /// Blocking reader that stops once the returned guard is dropped.
    fn into_cancellable_reader(
        self,
    ) -> (CancellableReader<impl Read + Send + 'static>, DropGuard) {
        let token = CancellationToken::new();
        let stopped = Box::pin(token.clone().cancelled_owned());
        let chunks = self
            .take_until(stopped)
            .map(|chunk| chunk.map_err(io::Error::other));
        let reader = CancellableReader {
            inner: SyncIoBridge::new(StreamReader::new(chunks)),
            token: token.clone(),
        };
        (reader, token.drop_guard())
    }
}

/// Fails every read once its token is cancelled.
struct CancellableReader<R> {
    inner: R,
    token: CancellationToken,
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            return Err(io::Error::other("archive download was abandoned"));
        }
        self.inner.read(buf)
    }
}

impl Stream for ArchiveDownload {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(head) = this.head.take() {
            return Poll::Ready(Some(Ok(head)));
        }
        this.rest.poll_next_unpin(cx).map(|next| {
            next.map(|chunk| chunk.map_err(|err| map_engine_error(&this.container, err)))
        })
    }
}

fn join_error(err: tokio::task::JoinError) -> CopyError {
    CopyError::local("decoding downloaded archive", io::Error::other(err))
}
