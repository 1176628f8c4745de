//! # DevRS Copy Core Infrastructure
//!
//! File: copy/src/core/mod.rs
//! Author: Christi Mahu
//! Repository: https://github.com/christimahu/devrs
//!
//! **DISCLAIMER:** This repository is in the early phases of being rewritten
//! and is not suitable for production development yet.
//!
//! ## Overview
//!
//! Foundational pieces shared by the archive codec and the engine client:
//! - `config`: Configuration loading and validation
//! - `error`: The copy failure taxonomy
//! - `logging`: Optional tracing subscriber setup
//!
pub mod config;
pub mod error;
pub mod logging;
