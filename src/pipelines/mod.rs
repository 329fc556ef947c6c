//! # Pipeline Module
//!
//! High-level orchestration: loading many packages for Monte-Carlo replay,
//! opening a single package, and ordering packages into campaigns.

pub mod campaign;
pub mod loader;
pub mod package;

pub use campaign::Campaign;
pub use loader::{LoadedPackage, PackagesDataLoader};
pub use package::PresamplesPackage;
