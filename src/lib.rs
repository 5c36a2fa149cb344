// src/lib.rs

//! Widgetron
//!
//! Packages a notebook application into a desktop installer. The library
//! half of the tool owns the environment description handed to the
//! installer generator.
//!
//! # Architecture
//!
//! - Channels: local build output first, remote registries after, with a
//!   remap for installs where the local channel is gone
//! - Spec sources: explicit packages, an environment manifest, an explicit
//!   lock file, or a live prefix; exactly one is active per descriptor
//! - Pinning: exact download URLs (optionally hashed) read from channel indexes
//! - Descriptor: every mutation re-validates and rewrites `construct.yaml`

pub mod baseline;
pub mod channel;
pub mod config;
pub mod descriptor;
pub mod environment;
mod error;
pub mod mutator;
pub mod repository;
pub mod resolver;
pub mod shell;

pub use error::{Error, Result};
