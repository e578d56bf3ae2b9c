//! # Package Version Store
//!
//! Accepts uploaded package files, records their size and MD5 digest, orders
//! versions semantically and serves byte-exact downloads.
//!
//! ## Key Modules
//!
//! - [`sanitize`]: strips path components and reserved characters from client file names
//! - [`digest`]: streams bytes to disk while computing the content digest
//! - [`version`]: semantic version parsing and the total order used for "latest"
//! - [`layout`]: deterministic on-disk paths under the storage root
//! - [`store`]: the [`PackageStore`] orchestrating catalog and blobs
//! - [`maintenance`]: blob re-verification and the reconcile sweep
//!
//! Blobs live at `{storage_root}/{app_id}/{version}_{file_name}`. Download
//! rebuilds that path from catalog fields, so upload and download must agree
//! on [`layout::StorageLayout::blob_name`].

pub mod digest;
pub mod error;
pub mod layout;
pub mod maintenance;
pub mod sanitize;
pub mod store;
pub mod version;

pub use appstore_catalog::{Application, CreateApplicationRequest, PackageVersion};
pub use digest::{ContentDigest, IntegrityVerifier};
pub use error::{StoreError, StoreResult};
pub use layout::StorageLayout;
pub use maintenance::{ReconcileReport, VerifyReport};
pub use sanitize::sanitize_filename;
pub use store::{ByteStream, Download, PackageStore, UploadRequest};
pub use version::{SemanticVersion, VersionKey};
