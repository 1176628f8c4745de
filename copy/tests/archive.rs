//! # DevRS Archive Codec Integration Tests
//!
//! File: copy/tests/archive.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! ## Overview
//!
//! Property and streaming tests for the archive codec: arbitrary host trees survive an
//! encode/unpack cycle, encoding is repeatable, and chunk sizes stay bounded no matter
//! how large the input is, both out of the encoder and out of the upload body.
//!

mod common;
use common::*;

use bytes::Bytes;
use devrs_copy::archive::decode::ArchiveDecoder;
use devrs_copy::archive::tar::{ArchiveEncoder, EncodeOptions};
use devrs_copy::docker::body::{streaming_body, UploadMonitor};
use futures_util::StreamExt;
use proptest::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// Largest overshoot past `chunk_size`: one header block, or the two-block trailer.
const OVERSHOOT: usize = 1024;

/// One generated node: path components and, for files, content.
type Node = (Vec<String>, Option<Vec<u8>>);

fn node_strategy() -> impl Strategy<Value = Node> {
    (
        proptest::collection::vec("[a-z]{1,8}", 1..4),
        proptest::option::of(proptest::collection::vec(any::<u8>(), 0..3000)),
    )
}

/// Materializes generated nodes, skipping any that collide with an existing file.
fn build_tree(root: &Path, nodes: &[Node]) {
    for (components, content) in nodes {
        let path = components.iter().fold(root.to_path_buf(), |p, c| p.join(c));
        let blocked = path
            .ancestors()
            .take_while(|a| *a != root)
            .skip(1)
            .any(|a| a.is_file());
        if blocked || path.exists() {
            continue;
        }
        match content {
            Some(bytes) => {
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, bytes).unwrap();
            }
            None => fs::create_dir_all(&path).unwrap(),
        }
    }
}

/// `files` files spread over nested directories up to `depth` levels deep.
fn build_wide_tree(root: &Path, files: usize, depth: usize) {
    for i in 0..files {
        let mut dir = root.to_path_buf();
        for level in 0..(i % depth) {
            dir = dir.join(format!("d{level}"));
        }
        fs::create_dir_all(&dir).unwrap();
        let content = vec![(i % 251) as u8; (i * 997) % 5000];
        fs::write(dir.join(format!("f{i}")), content).unwrap();
    }
}

/// Runs the encoder through the upload body and returns (largest chunk, total bytes).
fn drain_body(root: &Path, options: EncodeOptions) -> (usize, usize) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let encoder = ArchiveEncoder::new(root, options).unwrap();
        let monitor = UploadMonitor::new();
        let chunks: Vec<Bytes> = streaming_body(Box::new(encoder), Arc::clone(&monitor))
            .collect()
            .await;
        assert!(monitor.is_finished());
        let largest = chunks.iter().map(Bytes::len).max().unwrap_or(0);
        (largest, chunks.iter().map(Bytes::len).sum())
    })
}

fn encode_children(root: &Path, options: EncodeOptions) -> Vec<u8> {
    let options = EncodeOptions {
        children_only: true,
        ..options
    };
    let mut raw = Vec::new();
    ArchiveEncoder::new(root, options)
        .unwrap()
        .write_to(&mut raw)
        .unwrap();
    raw
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn tree_survives_encode_and_unpack(
        nodes in proptest::collection::vec(node_strategy(), 0..12),
        compress in any::<bool>(),
        chunk_size in 512usize..8192,
    ) {
        let source = tempdir().unwrap();
        build_tree(source.path(), &nodes);

        let options = EncodeOptions { compress, chunk_size, ..EncodeOptions::default() };
        let raw = encode_children(source.path(), options);

        let dest = tempdir().unwrap();
        ArchiveDecoder::new(raw.as_slice()).unwrap().unpack(dest.path()).unwrap();
        prop_assert_eq!(snapshot(dest.path()), snapshot(source.path()));
    }

    #[test]
    fn chunking_does_not_change_the_archive(
        nodes in proptest::collection::vec(node_strategy(), 1..8),
        chunk_size in 1usize..4096,
    ) {
        let source = tempdir().unwrap();
        build_tree(source.path(), &nodes);

        let options = EncodeOptions { chunk_size, ..EncodeOptions::default() };
        let small = encode_children(source.path(), options);
        let large = encode_children(source.path(), EncodeOptions::default());
        prop_assert_eq!(small, large);
    }

    #[test]
    fn chunks_stay_bounded_as_trees_grow(
        files in 1usize..300,
        depth in 1usize..6,
        chunk_size in 512usize..16384,
    ) {
        let source = tempdir().unwrap();
        build_wide_tree(source.path(), files, depth);
        let options = EncodeOptions { chunk_size, ..EncodeOptions::default() };

        let mut largest = 0;
        let mut total = 0;
        for chunk in ArchiveEncoder::new(source.path(), options.clone()).unwrap() {
            let chunk = chunk.unwrap();
            largest = largest.max(chunk.len());
            total += chunk.len();
        }
        prop_assert!(largest <= chunk_size + OVERSHOOT);

        let (body_largest, body_total) = drain_body(source.path(), options);
        prop_assert!(body_largest <= chunk_size + OVERSHOOT);
        prop_assert_eq!(body_total, total);
    }
}

#[test]
fn test_peak_chunk_does_not_grow_with_tree_size() {
    let chunk_size = 8 * 1024;
    for files in [8, 64, 512, 2048] {
        let source = tempdir().unwrap();
        build_wide_tree(source.path(), files, 4);
        let options = EncodeOptions {
            chunk_size,
            ..EncodeOptions::default()
        };
        let (largest, _) = drain_body(source.path(), options);
        assert!(largest <= chunk_size + OVERSHOOT, "{files} files: {largest}");
    }
}

/// Number of descriptors this process holds open on `path`.
#[cfg(target_os = "linux")]
fn open_handles_to(path: &Path) -> usize {
    let path = fs::canonicalize(path).unwrap();
    fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|fd| fd.ok())
        .filter(|fd| fs::read_link(fd.path()).is_ok_and(|target| target == path))
        .count()
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_dropping_upload_body_closes_open_file() {
    let source = tempdir().unwrap();
    let big = source.path().join("big.bin");
    fs::write(&big, vec![5u8; 1024 * 1024]).unwrap();

    let options = EncodeOptions {
        chunk_size: 4096,
        ..EncodeOptions::default()
    };
    let encoder = ArchiveEncoder::new(&big, options).unwrap();
    let monitor = UploadMonitor::new();
    let mut body = streaming_body(Box::new(encoder), Arc::clone(&monitor));
    body.next().await.unwrap();
    body.next().await.unwrap();
    assert_eq!(open_handles_to(&big), 1);

    drop(body);
    assert_eq!(open_handles_to(&big), 0);
    assert!(!monitor.is_finished());
}

#[test]
fn test_encoding_is_repeatable() {
    let source = tempdir().unwrap();
    empty_dir_last_tree(source.path());
    write_files(source.path(), &[("z/deep/file.txt", b"content")]);

    let first = encode_children(source.path(), EncodeOptions::default());
    let second = encode_children(source.path(), EncodeOptions::default());
    assert_eq!(first, second);
}

#[test]
fn test_empty_directory_survives_unpack() {
    let source = tempdir().unwrap();
    let data = source.path().join("data");
    empty_dir_last_tree(&data);

    let mut raw = Vec::new();
    ArchiveEncoder::new(&data, EncodeOptions::default())
        .unwrap()
        .write_to(&mut raw)
        .unwrap();
    let dest = tempdir().unwrap();
    ArchiveDecoder::new(raw.as_slice())
        .unwrap()
        .unpack(dest.path())
        .unwrap();

    let b = dest.path().join("data/b");
    assert!(b.is_dir());
    assert_eq!(fs::read_dir(b).unwrap().count(), 0);
}

#[test]
fn test_large_sparse_file_streams_in_bounded_chunks() {
    let source = tempdir().unwrap();
    let big = source.path().join("sparse.img");
    let size: u64 = 32 * 1024 * 1024;
    fs::File::create(&big).unwrap().set_len(size).unwrap();

    let chunk_size = 64 * 1024;
    let options = EncodeOptions {
        chunk_size,
        ..EncodeOptions::default()
    };
    let mut largest = 0usize;
    let mut total = 0u64;
    for chunk in ArchiveEncoder::new(&big, options).unwrap() {
        let chunk = chunk.unwrap();
        largest = largest.max(chunk.len());
        total += chunk.len() as u64;
    }
    assert!(largest <= chunk_size + 1024, "largest chunk {largest}");
    assert_eq!(total, 512 + size + 1024);
}
