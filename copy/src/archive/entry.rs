//! # DevRS Archive Entries (`archive::entry`)
//!
//! File: copy/src/archive/entry.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! `ArchiveEntry` describes one node of a serialized tree. The encoder builds one per
//! walked path before writing its header, and the decoder produces one per tar member,
//! so both directions agree on the same shape.
//!
use std::ops::Range;

/// Kind of filesystem node an entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// A hard link to an earlier member. Only produced when decoding.
    HardLink,
    /// Device nodes, fifos and other members this library does not interpret.
    Other,
}

/// One node of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Slash-separated path relative to the archive root, without a trailing slash.
    ///
    /// Names that are not valid UTF-8 are rendered lossily here; the archive itself
    /// carries the original bytes.
    pub path: String,
    pub kind: EntryKind,
    /// Payload size in bytes (zero for everything but files).
    pub size: u64,
    /// Permission bits.
    pub mode: u32,
    /// Target for symlinks and hard links.
    pub link_target: Option<String>,
    /// Byte range of the payload within the uncompressed archive stream.
    pub payload: Range<u64>,
}

impl ArchiveEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Normalizes a path read from an archive: drops a leading `./` and trailing slashes.
pub(crate) fn normalize_archive_path(raw: &str) -> String {
    let trimmed = raw.trim_start_matches("./").trim_end_matches('/');
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.to_string()
    }
}
