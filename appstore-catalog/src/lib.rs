//! Application and package version catalog
//!
//! This crate owns the relational side of the app store: the registry of
//! applications and the records describing every uploaded package version.
//! It is consumed by `appstore-store`, which pairs these records with the
//! blobs on disk, and can be used directly by maintenance tooling.

pub mod application;
pub mod catalog;
pub mod db;
pub mod error;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use application::{validate_app_id, Application, CreateApplicationRequest};
pub use catalog::Catalog;
pub use error::{CatalogError, Result};
pub use version::{BlobKey, NewVersion, PackageVersion, PendingVersion, VersionState};
