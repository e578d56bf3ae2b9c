//! Shared helpers for store integration tests

#![allow(dead_code)]

use appstore_catalog::db::{create_pool, run_migrations};
use appstore_catalog::{Catalog, CreateApplicationRequest};
use appstore_store::{PackageStore, StorageLayout, UploadRequest};
use bytes::Bytes;
use futures_util::stream::{self, Stream};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestStore {
    pub store: PackageStore,
    pub dir: TempDir,
}

impl TestStore {
    pub fn storage_root(&self) -> PathBuf {
        self.store.layout().root().to_path_buf()
    }
}

/// A store backed by a SQLite file and a storage root inside one temp dir
pub async fn create_test_store() -> TestStore {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let pool = create_pool(&dir.path().join("catalog.db"))
        .await
        .expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to migrate");

    let layout = StorageLayout::new(dir.path().join("storage"));
    TestStore {
        store: PackageStore::new(Catalog::new(pool), layout),
        dir,
    }
}

pub async fn create_app(store: &PackageStore, app_id: &str) {
    store
        .create_application(
            CreateApplicationRequest {
                app_id: app_id.to_string(),
                name: format!("{} app", app_id),
                description: String::new(),
            },
            "tester",
        )
        .await
        .expect("Failed to create application");
}

pub fn request(version: &str, file_name: &str) -> UploadRequest {
    UploadRequest {
        version: version.to_string(),
        file_name: file_name.to_string(),
        release_notes: format!("Release {}", version),
    }
}

/// Payload split into small chunks so uploads span several writes
pub fn chunks(data: &[u8]) -> impl Stream<Item = io::Result<Bytes>> {
    let parts: Vec<io::Result<Bytes>> = data
        .chunks(1024)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(parts)
}

/// A stream that yields some bytes and then fails
pub fn failing_stream() -> impl Stream<Item = io::Result<Bytes>> {
    stream::iter(vec![
        Ok(Bytes::from_static(b"first part")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
    ])
}

pub fn no_file() -> Option<stream::Iter<std::vec::IntoIter<io::Result<Bytes>>>> {
    None
}

/// Names of all entries in an application directory, sorted
pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

pub async fn read_download(store: &PackageStore, app_id: &str, version: &str) -> Vec<u8> {
    use futures_util::TryStreamExt;

    let download = store
        .download(app_id, version)
        .await
        .expect("Failed to open download");
    let chunks: Vec<Bytes> = download
        .stream
        .try_collect()
        .await
        .expect("Failed to read download");
    chunks.concat()
}
