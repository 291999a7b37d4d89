//! Loading and validating `.vigil` configuration.
//!
//! Defaults are layered under `.vigil/config.yaml`, `.vigil/local.yaml` and
//! `VIGIL_*` environment overrides, then checked before anything starts.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
