use appstore_catalog::Catalog;
use appstore_store::{PackageStore, StorageLayout};
use sqlx::SqlitePool;
use std::path::PathBuf;

#[derive(Clone)]
pub struct AppState {
    pub store: PackageStore,
}

impl AppState {
    pub fn new(pool: SqlitePool, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            store: PackageStore::new(Catalog::new(pool), StorageLayout::new(storage_root)),
        }
    }
}
