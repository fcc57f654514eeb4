//! CodeComet test collection
//!
//! Wraps a test command, captures what it produces, and assembles the record
//! the ingestion service expects. The binary in `main.rs` is a thin CLI over
//! [`collect`].

pub mod classify;
pub mod collect;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod provenance;
pub mod record;
pub mod rewrite;
pub mod runner;
pub mod version;

pub use error::{Error, Result};
