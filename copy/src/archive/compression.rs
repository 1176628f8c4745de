//! # DevRS Compression Utilities (`archive::compression`)
//!
//! File: copy/src/archive/compression.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! Gzip support for archives that are produced and consumed a chunk at a time.
//!
//! - `GzipChunker` compresses a sequence of input chunks without ever holding more than
//!   one chunk's worth of output. Each call hands back whatever compressed bytes the
//!   encoder has emitted so far (possibly none).
//! - `is_gzip` sniffs the two-byte gzip magic so the decoder can accept either form.
//!
//! ## Usage
//!
//! ```rust
//! use devrs_copy::archive::compression::GzipChunker;
//!
//! let mut gz = GzipChunker::new(6);
//! let mut out = gz.compress(b"first chunk ")?;
//! out.extend(gz.compress(b"second chunk")?);
//! out.extend(gz.finish()?);
//! assert!(devrs_copy::archive::compression::is_gzip(&out));
//! # Ok::<(), std::io::Error>(())
//! ```
//!
use flate2::{write::GzEncoder, Compression};
use std::io::{self, Write};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Returns true when `head` starts with the gzip magic bytes.
pub fn is_gzip(head: &[u8]) -> bool {
    head.len() >= GZIP_MAGIC.len() && head[..GZIP_MAGIC.len()] == GZIP_MAGIC
}

/// Incremental gzip compressor that drains its output after every chunk.
pub struct GzipChunker {
    encoder: Option<GzEncoder<Vec<u8>>>,
}

impl GzipChunker {
    /// Creates a compressor at `level` (0 = store, 9 = best).
    pub fn new(level: u32) -> Self {
        GzipChunker {
            encoder: Some(GzEncoder::new(Vec::new(), Compression::new(level.min(9)))),
        }
    }

    /// Feeds `input` and returns the compressed bytes produced so far.
    pub fn compress(&mut self, input: &[u8]) -> io::Result<Vec<u8>> {
        let encoder = self.encoder.as_mut().ok_or_else(finished_error)?;
        encoder.write_all(input)?;
        Ok(std::mem::take(encoder.get_mut()))
    }

    /// Writes the gzip trailer and returns the remaining bytes.
    pub fn finish(&mut self) -> io::Result<Vec<u8>> {
        let encoder = self.encoder.take().ok_or_else(finished_error)?;
        encoder.finish()
    }

    pub fn is_finished(&self) -> bool {
        self.encoder.is_none()
    }
}

fn finished_error() -> io::Error {
    io::Error::other("gzip stream already finished")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_chunked_compression_round_trip() {
        let mut gz = GzipChunker::new(9);
        let mut compressed = Vec::new();
        let mut original = Vec::new();
        for i in 0..50u8 {
            let chunk = vec![i; 1000];
            original.extend_from_slice(&chunk);
            compressed.extend(gz.compress(&chunk).unwrap());
        }
        compressed.extend(gz.finish().unwrap());
        assert!(gz.is_finished());
        assert!(is_gzip(&compressed));

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_use_after_finish_is_an_error() {
        let mut gz = GzipChunker::new(1);
        gz.finish().unwrap();
        assert!(gz.compress(b"late").is_err());
        assert!(gz.finish().is_err());
    }

    #[test]
    fn test_is_gzip() {
        assert!(is_gzip(&[0x1f, 0x8b, 0x08]));
        assert!(!is_gzip(&[0x1f]));
        assert!(!is_gzip(b"ustar"));
    }
}
