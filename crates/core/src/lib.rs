//! dynload-core
//!
//! Core library for building executable units at runtime and loading them on demand.
//!
//! This crate defines the unit description model, the deterministic unit builder, the binary
//! artifact format, the dynamic loader, and a reference host that verifies and runs artifacts.
//!
//! All substantive logic lives here so it is fully testable and reusable from multiple
//! frontends (CLI, embedding hosts, etc.).

pub mod artifact;
pub mod builder;
pub mod model;
pub mod services;

pub use artifact::BinaryArtifact;
pub use builder::{build, BuildError, BuildOptions, UnitBuilder};
pub use model::UnitDescription;
pub use services::{DynamicLoader, InterpreterHost, LoaderError};

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
