//! # DevRS TAR Archive Encoder (`archive::tar`)
//!
//! File: copy/src/archive/tar.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! This module turns a host file or directory tree into a tar stream that is produced
//! lazily, one bounded chunk at a time. Nothing is buffered beyond the chunk being
//! built, so arbitrarily large trees can be streamed to the engine.
//!
//! ## Architecture
//!
//! `ArchiveEncoder` is a pull iterator driven by a small state machine:
//!
//! - **Walking**: take the next path from a sorted `walkdir` traversal, describe it as an
//!   `ArchiveEntry` and append its header block(s). Regular files with content open a
//!   file handle and move to **Payload**.
//! - **Payload**: copy file bytes into the current chunk until the declared size is
//!   reached, then pad to the 512-byte block boundary and go back to **Walking**.
//! - **Trailer**: append the two zero blocks that terminate an archive.
//!
//! The traversal is depth-first with entries sorted by file name, and a directory's
//! entry is always emitted before anything inside it. Every directory gets its own
//! entry, so empty directories survive extraction even when they are the last thing
//! in the archive.
//!
//! Headers are GNU format built with the `tar` crate's `Header`. Names and link targets
//! are written from the raw bytes of the host path, so names that are not valid UTF-8
//! survive unchanged. Those longer than 100 bytes are preceded by a `././@LongLink`
//! record. When compression is
//! requested each raw chunk is passed through `GzipChunker`.
//!
//! At most one file handle is open at a time, and it is closed as soon as the file's
//! payload has been emitted, when an error ends the stream, or when the encoder is dropped.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use devrs_copy::archive::tar::{ArchiveEncoder, EncodeOptions};
//!
//! let encoder = ArchiveEncoder::new("./my_dir", EncodeOptions::default())?;
//! for chunk in encoder {
//!     let chunk = chunk?;
//!     // hand `chunk` to the request body
//! #   let _ = chunk;
//! }
//! # Ok::<(), devrs_copy::CopyError>(())
//! ```
//!
use super::compression::GzipChunker;
use super::entry::{ArchiveEntry, EntryKind};
use crate::core::config::{ArchiveConfig, SymlinkPolicy};
use crate::core::error::{CopyError, Result};
use bytes::{Bytes, BytesMut};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tar::{EntryType, Header};
use tracing::{debug, trace, warn};
use walkdir::{DirEntry, WalkDir};

const BLOCK_SIZE: usize = 512;
const NAME_FIELD_LEN: usize = 100;
const LONG_LINK_NAME: &[u8] = b"././@LongLink";
// Cap on up-front buffer allocation; larger configured chunks grow on demand.
const MAX_PREALLOC: usize = 1024 * 1024;

/// Options controlling how a host path is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Descend into directories. When false only the root itself is archived
    /// (or, with `children_only`, the root's immediate children).
    pub recurse: bool,
    /// Gzip the archive.
    pub compress: bool,
    /// For a directory root, archive its contents without the root's own name.
    pub children_only: bool,
    pub symlinks: SymlinkPolicy,
    /// Target size of each produced chunk, before compression.
    pub chunk_size: usize,
    pub compression_level: u32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions::from_config(&ArchiveConfig::default())
    }
}

impl EncodeOptions {
    /// Builds options from configuration, recursing and uncompressed.
    pub fn from_config(config: &ArchiveConfig) -> Self {
        EncodeOptions {
            recurse: true,
            compress: false,
            children_only: false,
            symlinks: config.symlinks,
            chunk_size: config.chunk_size.max(1),
            compression_level: config.compression_level,
        }
    }
}

enum State {
    Walking,
    Payload {
        file: File,
        path: PathBuf,
        remaining: u64,
        size: u64,
    },
    Trailer,
    Finished,
}

/// Lazy tar encoder over a host path. Yields chunks of archive bytes.
pub struct ArchiveEncoder {
    root: PathBuf,
    prefix: Option<Vec<u8>>,
    walker: walkdir::IntoIter,
    state: State,
    options: EncodeOptions,
    gzip: Option<GzipChunker>,
    offset: u64,
    entries_written: u64,
    done: bool,
}

impl ArchiveEncoder {
    /// Prepares an encoder for `root`. Fails with `CopyError::Local` if the root
    /// cannot be inspected. No file content is read until the first chunk is pulled.
    pub fn new(root: impl Into<PathBuf>, options: EncodeOptions) -> Result<Self> {
        let root = root.into();
        let follow = options.symlinks == SymlinkPolicy::Follow;
        let metadata = if follow {
            fs::metadata(&root)
        } else {
            fs::symlink_metadata(&root)
        }
        .map_err(|e| CopyError::local(format!("reading '{}'", root.display()), e))?;

        let prefix = if options.children_only && metadata.is_dir() {
            None
        } else {
            root_entry_name(&root)?
        };

        let max_depth = match (options.recurse, prefix.is_none()) {
            (true, _) => usize::MAX,
            (false, true) => 1,
            (false, false) => 0,
        };
        // A root without a name of its own (e.g. `/`) is archived by its children.
        let min_depth = usize::from(prefix.is_none());

        let walker = WalkDir::new(&root)
            .follow_links(follow)
            .follow_root_links(follow)
            .min_depth(min_depth)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter();

        debug!(
            root = %root.display(),
            prefix = %String::from_utf8_lossy(prefix.as_deref().unwrap_or_default()),
            recurse = options.recurse,
            compress = options.compress,
            "Prepared archive encoder"
        );

        let gzip = options
            .compress
            .then(|| GzipChunker::new(options.compression_level));

        Ok(ArchiveEncoder {
            root,
            prefix,
            walker,
            state: State::Walking,
            options,
            gzip,
            offset: 0,
            entries_written: 0,
            done: false,
        })
    }

    /// Number of entries whose headers have been produced so far.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Uncompressed archive bytes produced so far.
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Drains the encoder into `writer`, returning the number of bytes written.
    pub fn write_to<W: Write>(self, writer: &mut W) -> Result<u64> {
        let mut total = 0u64;
        for chunk in self {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .map_err(|e| CopyError::local("writing archive output", e))?;
            total += chunk.len() as u64;
        }
        writer
            .flush()
            .map_err(|e| CopyError::local("flushing archive output", e))?;
        Ok(total)
    }

    fn fill(&mut self, buf: &mut BytesMut) -> Result<()> {
        while buf.len() < self.options.chunk_size {
            match std::mem::replace(&mut self.state, State::Finished) {
                State::Walking => match self.walker.next() {
                    Some(Ok(dent)) => {
                        self.state = State::Walking;
                        self.start_entry(&dent, buf)?;
                    }
                    Some(Err(err)) => return Err(walk_error(err)),
                    None => self.state = State::Trailer,
                },
                State::Payload {
                    mut file,
                    path,
                    remaining,
                    size,
                } => {
                    let room = (self.options.chunk_size - buf.len()) as u64;
                    let want = remaining.min(room) as usize;
                    let start = buf.len();
                    buf.resize(start + want, 0);
                    let read = read_some(&mut file, &mut buf[start..])
                        .map_err(|e| CopyError::local(format!("reading '{}'", path.display()), e));
                    let n = match read {
                        Ok(n) => n,
                        Err(err) => {
                            buf.truncate(start);
                            return Err(err);
                        }
                    };
                    buf.truncate(start + n);
                    if n == 0 {
                        return Err(CopyError::local(
                            format!("reading '{}'", path.display()),
                            io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "file shrank while it was being archived",
                            ),
                        ));
                    }
                    self.offset += n as u64;
                    let remaining = remaining - n as u64;
                    if remaining == 0 {
                        // Dropping `file` here closes the handle before the next entry.
                        self.pad_to_block(buf, size);
                        self.state = State::Walking;
                    } else {
                        self.state = State::Payload {
                            file,
                            path,
                            remaining,
                            size,
                        };
                    }
                }
                State::Trailer => {
                    buf.extend_from_slice(&[0u8; 2 * BLOCK_SIZE]);
                    self.offset += 2 * BLOCK_SIZE as u64;
                    debug!(
                        root = %self.root.display(),
                        entries = self.entries_written,
                        bytes = self.offset,
                        "Archive complete"
                    );
                    self.state = State::Finished;
                }
                State::Finished => break,
            }
        }
        Ok(())
    }

    fn start_entry(&mut self, dent: &DirEntry, buf: &mut BytesMut) -> Result<()> {
        let path = dent.path();
        let name = self.entry_name(path);
        let metadata = dent
            .metadata()
            .map_err(|e| CopyError::local(format!("reading '{}'", path.display()), e.into()))?;
        let file_type = dent.file_type();

        let (kind, size, link_target) = if file_type.is_dir() {
            (EntryKind::Directory, 0, None)
        } else if file_type.is_file() {
            (EntryKind::File, metadata.len(), None)
        } else if file_type.is_symlink() {
            let target = fs::read_link(path)
                .map_err(|e| CopyError::local(format!("reading link '{}'", path.display()), e))?;
            (
                EntryKind::Symlink,
                0,
                Some(os_bytes(target.as_os_str()).into_owned()),
            )
        } else {
            warn!("Skipping special file '{}'", path.display());
            return Ok(());
        };

        let mut entry = ArchiveEntry {
            path: String::from_utf8_lossy(&name).into_owned(),
            kind,
            size,
            mode: entry_mode(&metadata, kind),
            link_target: link_target
                .as_deref()
                .map(|target| String::from_utf8_lossy(target).into_owned()),
            payload: 0..0,
        };
        let mut header_name = name;
        if kind == EntryKind::Directory {
            header_name.push(b'/');
        }
        self.push_headers(
            buf,
            &entry,
            &header_name,
            link_target.as_deref(),
            &metadata,
        );
        entry.payload = self.offset..self.offset + size;
        self.entries_written += 1;
        trace!(path = %entry.path, kind = ?entry.kind, size = entry.size, "Archived entry");

        if kind == EntryKind::File && size > 0 {
            let file = File::open(path)
                .map_err(|e| CopyError::local(format!("opening '{}'", path.display()), e))?;
            self.state = State::Payload {
                file,
                path: path.to_path_buf(),
                remaining: size,
                size,
            };
        }
        Ok(())
    }

    /// Raw header name for `path`: the prefix plus slash-joined components.
    fn entry_name(&self, path: &Path) -> Vec<u8> {
        let mut name = self.prefix.clone().unwrap_or_default();
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        for component in relative.components() {
            if !name.is_empty() {
                name.push(b'/');
            }
            name.extend_from_slice(&os_bytes(component.as_os_str()));
        }
        name
    }

    fn push_headers(
        &mut self,
        buf: &mut BytesMut,
        entry: &ArchiveEntry,
        name: &[u8],
        link_target: Option<&[u8]>,
        metadata: &Metadata,
    ) {
        if name.len() > NAME_FIELD_LEN {
            self.push_long_record(buf, EntryType::GNULongName, name);
        }
        if let Some(target) = link_target.filter(|t| t.len() > NAME_FIELD_LEN) {
            self.push_long_record(buf, EntryType::GNULongLink, target);
        }

        let mut header = Header::new_gnu();
        fill_field(&mut header.as_old_mut().name, name);
        if let Some(target) = link_target {
            fill_field(&mut header.as_old_mut().linkname, target);
        }
        header.set_entry_type(match entry.kind {
            EntryKind::Directory => EntryType::Directory,
            EntryKind::Symlink => EntryType::Symlink,
            _ => EntryType::Regular,
        });
        header.set_mode(entry.mode);
        header.set_size(entry.size);
        header.set_mtime(modified_secs(metadata));
        let (uid, gid) = owner_ids(metadata);
        header.set_uid(uid);
        header.set_gid(gid);
        header.set_cksum();

        buf.extend_from_slice(header.as_bytes());
        self.offset += BLOCK_SIZE as u64;
    }

    fn push_long_record(&mut self, buf: &mut BytesMut, kind: EntryType, value: &[u8]) {
        let mut header = Header::new_gnu();
        fill_field(&mut header.as_old_mut().name, LONG_LINK_NAME);
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);
        header.set_size(value.len() as u64 + 1);
        header.set_entry_type(kind);
        header.set_cksum();

        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(value);
        buf.extend_from_slice(&[0]);
        self.offset += BLOCK_SIZE as u64 + value.len() as u64 + 1;
        self.pad_to_block(buf, value.len() as u64 + 1);
    }

    fn pad_to_block(&mut self, buf: &mut BytesMut, size: u64) {
        let padding = (BLOCK_SIZE as u64 - size % BLOCK_SIZE as u64) % BLOCK_SIZE as u64;
        buf.extend_from_slice(&[0u8; BLOCK_SIZE][..padding as usize]);
        self.offset += padding;
    }

    fn finish_chunk(&mut self, raw: BytesMut, last: bool) -> Result<Bytes> {
        match self.gzip.as_mut() {
            None => Ok(raw.freeze()),
            Some(gz) => {
                let mut out = gz
                    .compress(&raw)
                    .map_err(|e| CopyError::local("compressing archive", e))?;
                if last {
                    out.extend(
                        gz.finish()
                            .map_err(|e| CopyError::local("finishing gzip stream", e))?,
                    );
                }
                Ok(Bytes::from(out))
            }
        }
    }
}

impl Iterator for ArchiveEncoder {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let capacity = self.options.chunk_size.min(MAX_PREALLOC) + 2 * BLOCK_SIZE;
            let mut buf = BytesMut::with_capacity(capacity);
            let filled = self.fill(&mut buf);
            let last = matches!(self.state, State::Finished);
            let chunk = filled.and_then(|()| self.finish_chunk(buf, last));
            match chunk {
                Err(err) => {
                    // Ends the stream and releases any open file.
                    self.done = true;
                    self.state = State::Finished;
                    return Some(Err(err));
                }
                Ok(chunk) => {
                    self.done = last;
                    // Gzip may swallow a whole chunk without emitting output yet.
                    if !chunk.is_empty() {
                        return Some(Ok(chunk));
                    }
                }
            }
        }
    }
}

/// Name used for the root entry: the path's final component.
fn root_entry_name(root: &Path) -> Result<Option<Vec<u8>>> {
    if let Some(name) = root.file_name() {
        return Ok(Some(os_bytes(name).into_owned()));
    }
    // Paths such as `.` or `..` have no final component until resolved.
    let resolved = fs::canonicalize(root)
        .map_err(|e| CopyError::local(format!("resolving '{}'", root.display()), e))?;
    Ok(resolved.file_name().map(|name| os_bytes(name).into_owned()))
}

#[cfg(unix)]
fn os_bytes(value: &OsStr) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(value.as_bytes())
}

// Without raw OS bytes, names go through UTF-8 with separators normalized.
#[cfg(not(unix))]
fn os_bytes(value: &OsStr) -> Cow<'_, [u8]> {
    Cow::Owned(value.to_string_lossy().replace('\\', "/").into_bytes())
}

fn walk_error(err: walkdir::Error) -> CopyError {
    let context = match err.path() {
        Some(path) => format!("walking '{}'", path.display()),
        None => "walking host tree".to_string(),
    };
    CopyError::local(context, io::Error::from(err))
}

fn read_some(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match file.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

fn fill_field(field: &mut [u8], value: &[u8]) {
    let len = value.len().min(field.len());
    field[..len].copy_from_slice(&value[..len]);
}

fn modified_secs(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(unix)]
fn entry_mode(metadata: &Metadata, _kind: EntryKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn entry_mode(metadata: &Metadata, kind: EntryKind) -> u32 {
    match kind {
        EntryKind::Directory => 0o755,
        _ if metadata.permissions().readonly() => 0o444,
        _ => 0o644,
    }
}

#[cfg(unix)]
fn owner_ids(metadata: &Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (u64::from(metadata.uid()), u64::from(metadata.gid()))
}

#[cfg(not(unix))]
fn owner_ids(_metadata: &Metadata) -> (u64, u64) {
    (0, 0)
}
