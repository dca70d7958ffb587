//! # basalt-registry
//!
//! Owns the parsed material and table definitions: a background loader
//! fills the library from the VFS, the manager enforces name
//! uniqueness and modification rules, and the writer splices edited
//! declarations back into their origin files.

pub mod library;
pub mod loader;
pub mod manager;
pub mod splice;

pub use library::{DefinitionLibrary, MaterialRecord};
pub use loader::DefLoader;
pub use manager::MaterialManager;
