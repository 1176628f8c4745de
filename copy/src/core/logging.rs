//! # DevRS Copy Logging Setup
//!
//! File: copy/src/core/logging.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! The library only emits `tracing` events; it never installs a subscriber on its own.
//! Embedders that have no subscriber of their own (and the test suite) can call
//! `init_tracing` to get the same compact stderr output the DevRS CLI uses.
//!
//! `RUST_LOG` takes precedence over the verbosity level when it is set.
//!
use tracing_subscriber::{fmt, EnvFilter};

/// Maps a `-v` style counter to a filter directive.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs a global fmt subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already installed, which is the normal
/// case when several tests call this.
pub fn init_tracing(verbosity: u8) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity)));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
