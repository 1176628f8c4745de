//! # DevRS TAR Archive Decoder (`archive::decode`)
//!
//! File: copy/src/archive/decode.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! Reads tar streams, plain or gzip-compressed, back into `ArchiveEntry` values or
//! onto disk. Compression is detected from the first two bytes, so callers never need
//! to know how an archive was produced.
//!
//! Decoding is synchronous and pulls from any `std::io::Read`. The download handle
//! bridges its async body into this module on a blocking thread.
//!
use super::compression::is_gzip;
use super::entry::{normalize_archive_path, ArchiveEntry, EntryKind};
use crate::core::error::{CopyError, Result};
use flate2::read::GzDecoder;
use std::borrow::Cow;
use std::io::{self, Cursor, Read};
use std::path::Path;
use tracing::debug;

type Peeked<R> = io::Chain<Cursor<Vec<u8>>, R>;

// Sizes come from untrusted headers, so content buffers start small and grow.
const MAX_PREALLOC: usize = 1024 * 1024;

/// Byte source for the tar reader, with the sniffed header bytes put back in front.
pub enum DecodeReader<R: Read> {
    Plain(Peeked<R>),
    Gzip(GzDecoder<Peeked<R>>),
}

impl<R: Read> Read for DecodeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecodeReader::Plain(inner) => inner.read(buf),
            DecodeReader::Gzip(inner) => inner.read(buf),
        }
    }
}

/// Tar reader that accepts plain and gzip-compressed input.
pub struct ArchiveDecoder<R: Read> {
    archive: tar::Archive<DecodeReader<R>>,
    compressed: bool,
}

impl<R: Read> ArchiveDecoder<R> {
    /// Wraps `reader`, consuming up to two bytes to detect gzip.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut head = [0u8; 2];
        let mut filled = 0;
        while filled < head.len() {
            match reader.read(&mut head[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CopyError::local("reading archive header", e)),
            }
        }
        let compressed = is_gzip(&head[..filled]);
        let peeked = Cursor::new(head[..filled].to_vec()).chain(reader);
        let inner = if compressed {
            DecodeReader::Gzip(GzDecoder::new(peeked))
        } else {
            DecodeReader::Plain(peeked)
        };
        debug!(compressed, "Opened archive for decoding");
        Ok(ArchiveDecoder {
            archive: tar::Archive::new(inner),
            compressed,
        })
    }

    /// Whether the input was gzip-compressed.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Iterates over the archive's members in stream order. Can only be called once.
    pub fn entries(&mut self) -> Result<DecodedEntries<'_, R>> {
        let inner = self
            .archive
            .entries()
            .map_err(|e| CopyError::local("reading archive", e))?;
        Ok(DecodedEntries { inner })
    }

    /// Materializes every member under `dest`, which is created if missing.
    ///
    /// Permissions and modification times are restored, and existing files are
    /// overwritten. Member names are used byte for byte.
    ///
    /// # Errors
    ///
    /// * `CopyError::Local` if the input is not a valid archive, if it ends early,
    ///   or if writing under `dest` fails.
    pub fn unpack(mut self, dest: &Path) -> Result<()> {
        self.archive.set_preserve_permissions(true);
        self.archive.set_preserve_mtime(true);
        self.archive.set_overwrite(true);
        self.archive
            .unpack(dest)
            .map_err(|e| CopyError::local(format!("unpacking into '{}'", dest.display()), e))?;
        debug!("Unpacked archive into {}", dest.display());
        Ok(())
    }
}

/// Iterator returned by `ArchiveDecoder::entries`.
pub struct DecodedEntries<'a, R: 'a + Read> {
    inner: tar::Entries<'a, DecodeReader<R>>,
}

impl<'a, R: 'a + Read> Iterator for DecodedEntries<'a, R> {
    type Item = Result<DecodedEntry<'a, R>>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.inner.next()?;
        Some(
            next.and_then(|inner| {
                let entry = describe(&inner)?;
                Ok(DecodedEntry { entry, inner })
            })
            .map_err(|e| CopyError::local("reading archive entry", e)),
        )
    }
}

/// One archive member: its description plus a reader over its content.
pub struct DecodedEntry<'a, R: 'a + Read> {
    entry: ArchiveEntry,
    inner: tar::Entry<'a, DecodeReader<R>>,
}

impl<'a, R: 'a + Read> DecodedEntry<'a, R> {
    pub fn entry(&self) -> &ArchiveEntry {
        &self.entry
    }

    /// The member's name exactly as stored in the archive, long-name records applied.
    pub fn path_bytes(&self) -> Cow<'_, [u8]> {
        self.inner.path_bytes()
    }

    pub fn into_entry(self) -> ArchiveEntry {
        self.entry
    }

    /// Reads the remaining content of this member.
    pub fn read_content(&mut self) -> Result<Vec<u8>> {
        let capacity = usize::try_from(self.entry.size)
            .map_or(MAX_PREALLOC, |size| size.min(MAX_PREALLOC));
        let mut content = Vec::with_capacity(capacity);
        self.inner
            .read_to_end(&mut content)
            .map_err(|e| CopyError::local(format!("reading '{}'", self.entry.path), e))?;
        Ok(content)
    }
}

impl<'a, R: 'a + Read> Read for DecodedEntry<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

fn describe<R: Read>(entry: &tar::Entry<'_, R>) -> io::Result<ArchiveEntry> {
    let header = entry.header();
    let entry_type = header.entry_type();
    let kind = if entry_type.is_dir() {
        EntryKind::Directory
    } else if entry_type.is_file() || entry_type.is_contiguous() || entry_type.is_gnu_sparse() {
        EntryKind::File
    } else if entry_type.is_symlink() {
        EntryKind::Symlink
    } else if entry_type.is_hard_link() {
        EntryKind::HardLink
    } else {
        EntryKind::Other
    };
    let path = normalize_archive_path(&entry.path()?.to_string_lossy());
    let link_target = entry
        .link_name()?
        .map(|target| target.to_string_lossy().into_owned());
    let size = entry.size();
    let start = entry.raw_file_position();
    Ok(ArchiveEntry {
        path,
        kind,
        size,
        mode: header.mode().unwrap_or(0),
        link_target,
        payload: start..start + size,
    })
}

/// Lists every member of an archive without keeping content.
pub fn list_entries<R: Read>(reader: R) -> Result<Vec<ArchiveEntry>> {
    let mut decoder = ArchiveDecoder::new(reader)?;
    let mut listed = Vec::new();
    for entry in decoder.entries()? {
        listed.push(entry?.into_entry());
    }
    Ok(listed)
}
