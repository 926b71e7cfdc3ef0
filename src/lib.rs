//! # hotsync Core Library
//!
//! Keeps a local mirror of a live game's hot-update asset catalog.
//!
//! A run loads two published catalog snapshots, computes what changed, fetches only the changed
//! bundles through a content-addressed cache and dispatches extraction jobs against the change
//! list under a priority-tiered scheduler.
//!
//! ## Key Modules
//!
//! - [`catalog`]: Snapshot model, the diff engine and the local snapshot store.
//! - [`compress`]: LZ4 (two token layouts), raw LZMA framing and chunked block compression.
//! - [`crypto`]: AES-CBC decryption of gamedata payloads and BSON decoding.
//! - [`resolver`]: Maps catalog paths to validated local cache files.
//! - [`workers`]: The job registry and the tiered scheduler.
//! - [`jobs`]: The extraction jobs shipped with the binary.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use hotsync::{config::SyncConfig, container::UnconfiguredContainer, jobs, sync, workers::JobFilter, Version};
//!
//! # async fn demo() -> Result<(), hotsync::SyncError> {
//! let config = SyncConfig::load(None)?;
//! let request = sync::SyncRequest {
//!     version: Version::new("2.4.01", "24-06-02"),
//!     previous: Some(Version::new("2.4.01", "24-06-01")),
//!     filter: JobFilter::default(),
//! };
//! sync::run_sync(&config, &request, Arc::new(UnconfiguredContainer), jobs::default_registry()?).await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod catalog;
pub mod cli;
pub mod cli_runner;
pub mod common;
pub mod compress;
pub mod config;
pub mod container;
pub mod crypto;
pub mod error;
pub mod fetch;
pub mod flatc;
pub mod jobs;
pub mod resolver;
pub mod sync;
pub mod workers;

// Cross-platform filesystem wrapper
pub mod fsx;

pub use common::Version;
pub use error::SyncError;
