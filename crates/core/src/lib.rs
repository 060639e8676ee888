//! Shared domain types for tether.
//!
//! This crate holds the pure data model that both the sync engine and the
//! wire protocol build on: filesystem [`Signature`]s, the in-memory remote
//! mirror [`Vfs`], the local-to-remote root [`Mapping`], and configuration.
//! Nothing here performs I/O beyond reading the config file.

mod config;
mod mapping;
mod signature;
mod vfs;

pub use config::{AgentConfig, Config, ConfigError, MappingConfig, SyncConfig};
pub use mapping::{MapEntry, Mapping, MappingError};
pub use signature::{BLOCK_SIZE, BlockHash, Signature, remote_path};
pub use vfs::Vfs;
