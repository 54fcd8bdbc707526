// src/config/mod.rs

//! Pipeline definition: loading and validation.
//!
//! - [`model`] is the TOML-backed data model.
//! - [`loader`] reads a file from disk.
//! - [`validate`] turns a `RawConfigFile` into a `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ConfigSection, DefaultSection, RawConfigFile, StorageSection, TaskConfig,
    WarehouseSection,
};
