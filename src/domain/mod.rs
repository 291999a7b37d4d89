//! Domain layer for the Vigil routing engine
//!
//! This module contains the data model shared by every stage and the port
//! traits the services depend on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
