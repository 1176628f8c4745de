//! # DevRS Upload Body (`docker::body`)
//!
//! File: copy/src/docker/body.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! Adapts a synchronous `ChunkSource` into the async byte stream used as an upload's
//! request body.
//!
//! Every chunk is produced on tokio's blocking pool, so filesystem reads and gzip work
//! never stall the runtime. The next chunk is only produced when the transport polls
//! for it, so memory stays bounded by the chunk size no matter how large the tree is.
//!
//! The request body cannot carry errors, so a failed chunk ends the stream early and
//! is parked in an `UploadMonitor`. The executor checks the monitor after the request
//! resolves and reports the local failure in preference to whatever the truncated
//! request produced.
//!
use crate::archive::ChunkSource;
use crate::core::error::CopyError;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Shared record of how an upload body was consumed.
#[derive(Debug, Default)]
pub struct UploadMonitor {
    bytes_sent: AtomicU64,
    chunks: AtomicU64,
    finished: AtomicBool,
    failure: Mutex<Option<CopyError>>,
}

impl UploadMonitor {
    /// Creates a monitor shared between the body stream and the executor.
    pub fn new() -> Arc<Self> {
        Arc::new(UploadMonitor::default())
    }

    /// Bytes handed to the transport so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Acquire)
    }

    /// Chunks handed to the transport so far.
    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Acquire)
    }

    /// True once the source was drained without error.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Takes the failure that cut the body short, if any.
    pub fn take_failure(&self) -> Option<CopyError> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }

    fn record_chunk(&self, len: usize) {
        self.bytes_sent.fetch_add(len as u64, Ordering::AcqRel);
        self.chunks.fetch_add(1, Ordering::AcqRel);
    }

    fn record_failure(&self, err: CopyError) {
        if let Ok(mut slot) = self.failure.lock() {
            slot.get_or_insert(err);
        }
    }
}

/// Wraps `source` in a lazily polled body stream reporting into `monitor`.
pub fn streaming_body(
    source: ChunkSource,
    monitor: Arc<UploadMonitor>,
) -> BoxStream<'static, Bytes> {
    stream::unfold(Some(source), move |state| {
        let monitor = Arc::clone(&monitor);
        async move {
            let Some(mut source) = state else {
                return None;
            };
            let joined = tokio::task::spawn_blocking(move || {
                let next = source.next();
                (source, next)
            })
            .await;

            match joined {
                Ok((source, Some(Ok(chunk)))) => {
                    monitor.record_chunk(chunk.len());
                    Some((chunk, Some(source)))
                }
                Ok((_source, Some(Err(err)))) => {
                    error!("Archive stream failed: {}", err);
                    monitor.record_failure(err);
                    None
                }
                Ok((_source, None)) => {
                    debug!(
                        chunks = monitor.chunks(),
                        bytes = monitor.bytes_sent(),
                        "Archive stream complete"
                    );
                    monitor.finished.store(true, Ordering::Release);
                    None
                }
                Err(join_err) => {
                    error!("Archive worker failed: {}", join_err);
                    monitor.record_failure(CopyError::local(
                        "producing archive chunk",
                        std::io::Error::other(join_err.to_string()),
                    ));
                    None
                }
            }
        }
    })
    .boxed()
}
