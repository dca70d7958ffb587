//! # basalt-core
//!
//! Core types shared by the Basalt material system crates:
//! the error type, the registry configuration and the virtual
//! file system interface with its provenance records.

pub mod config;
pub mod error;
pub mod vfs;

pub use config::RegistryConfig;
pub use error::{BasaltError, BasaltResult};
pub use vfs::{DiskFileSystem, FileInfo, Vfs};
