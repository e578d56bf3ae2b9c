//! Maintenance operations that run outside the request path.
//!
//! [`PackageStore::verify`] re-hashes one stored blob against its catalog
//! record. [`PackageStore::reconcile`] repairs the two inconsistencies a crash
//! can leave behind: reservations that were never committed, and files on
//! disk that no catalog row accounts for.

use crate::digest::hash_file;
use crate::error::{StoreError, StoreResult};
use crate::layout::StorageLayout;
use crate::store::PackageStore;
use appstore_catalog::PendingVersion;
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

/// Outcome of re-hashing a stored package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VerifyReport {
    pub app_id: String,
    pub version: String,
    pub expected_md5: String,
    pub actual_md5: String,
    pub expected_size: u64,
    pub actual_size: u64,
    pub intact: bool,
}

/// Counts of what a reconcile sweep removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconcileReport {
    pub stale_reservations: usize,
    pub orphaned_files: usize,
    pub bytes_reclaimed: u64,
}

impl PackageStore {
    /// Re-hash the blob of a committed version and compare it with the record
    #[instrument(skip(self))]
    pub async fn verify(&self, app_id: &str, version: &str) -> StoreResult<VerifyReport> {
        let record = self.committed_version(app_id, version).await?;
        let path = self
            .layout()
            .blob_path(app_id, &record.version, &record.file_name);

        let digest = hash_file(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(format!(
                    "package file for version '{}' of '{}' is missing",
                    version, app_id
                ))
            } else {
                StoreError::Storage(e)
            }
        })?;

        let intact = digest.md5_hex == record.md5_hash && digest.size == record.file_size;
        if intact {
            info!("Stored package verified");
        } else {
            warn!(
                expected_md5 = %record.md5_hash,
                actual_md5 = %digest.md5_hex,
                expected_size = record.file_size,
                actual_size = digest.size,
                "Stored package does not match its digest"
            );
        }

        Ok(VerifyReport {
            app_id: app_id.to_string(),
            version: record.version,
            expected_md5: record.md5_hash,
            actual_md5: digest.md5_hex,
            expected_size: record.file_size,
            actual_size: digest.size,
            intact,
        })
    }

    /// Remove reservations and files older than `grace` that no committed
    /// record accounts for.
    ///
    /// `grace` must comfortably exceed the longest upload, otherwise an
    /// in-flight upload could be swept.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, grace: Duration) -> StoreResult<ReconcileReport> {
        let grace_delta = chrono::Duration::from_std(grace)
            .map_err(|_| StoreError::InvalidInput("grace period out of range".to_string()))?;
        let cutoff = chrono::Utc::now() - grace_delta;
        let file_cutoff = SystemTime::now()
            .checked_sub(grace)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut report = ReconcileReport::default();

        for pending in self.catalog().stale_reservations(cutoff).await? {
            if let Some(freed) = self.release_stale(&pending).await? {
                report.stale_reservations += 1;
                report.bytes_reclaimed += freed;
            }
        }

        let known: HashSet<(String, String)> = self
            .catalog()
            .blob_keys()
            .await?
            .into_iter()
            .map(|key| {
                let name = StorageLayout::blob_name(&key.version, &key.file_name);
                (key.app_id, name)
            })
            .collect();

        let root = self.layout().root();
        let mut app_dirs = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        while let Some(app_entry) = app_dirs.next_entry().await? {
            // file_type() does not follow symlinks
            if !app_entry.file_type().await?.is_dir() {
                continue;
            }
            let app_id = app_entry.file_name().to_string_lossy().into_owned();
            let mut remaining = 0usize;

            let mut files = fs::read_dir(app_entry.path()).await?;
            while let Some(entry) = files.next_entry().await? {
                let file_type = entry.file_type().await?;
                if !file_type.is_file() {
                    remaining += 1;
                    continue;
                }

                let name = entry.file_name().to_string_lossy().into_owned();
                if known.contains(&(app_id.clone(), name.clone())) {
                    remaining += 1;
                    continue;
                }

                let metadata = entry.metadata().await?;
                let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
                if modified >= file_cutoff {
                    debug!(app_id = %app_id, file = %name, "Keeping recent untracked file");
                    remaining += 1;
                    continue;
                }

                fs::remove_file(entry.path()).await?;
                info!(
                    app_id = %app_id,
                    file = %name,
                    temp = StorageLayout::is_temp_name(&name),
                    "Removed orphaned file"
                );
                report.orphaned_files += 1;
                report.bytes_reclaimed += metadata.len();
            }

            if remaining == 0 && !self.catalog().application_exists(&app_id).await? {
                if let Err(e) = fs::remove_dir(app_entry.path()).await {
                    warn!(app_id = %app_id, error = %e, "Failed to remove empty application directory");
                }
            }
        }

        info!(
            stale_reservations = report.stale_reservations,
            orphaned_files = report.orphaned_files,
            bytes_reclaimed = report.bytes_reclaimed,
            "Reconcile sweep finished"
        );
        Ok(report)
    }

    /// Release one stale reservation, then remove its blob.
    ///
    /// The list of stale reservations is a snapshot, so an upload may commit
    /// after it was read. The row is released first and the blob is only
    /// touched when that release succeeded. Returns the bytes freed, or
    /// `None` when the row was no longer pending.
    pub(crate) async fn release_stale(&self, pending: &PendingVersion) -> StoreResult<Option<u64>> {
        if !self.catalog().release_version(pending.id).await? {
            debug!(
                app_id = %pending.app_id,
                version = %pending.version,
                "Reservation committed or released since the sweep began"
            );
            return Ok(None);
        }
        info!(
            app_id = %pending.app_id,
            version = %pending.version,
            reserved_at = %pending.reserved_at,
            "Released stale reservation"
        );

        let blob_name = StorageLayout::blob_name(&pending.version, &pending.file_name);
        if self
            .catalog()
            .blob_name_taken(&pending.app_id, &blob_name, pending.id)
            .await?
        {
            return Ok(Some(0));
        }

        let path = self
            .layout()
            .blob_path(&pending.app_id, &pending.version, &pending.file_name);
        Ok(Some(remove_if_present(&path).await?))
    }
}

/// Delete a file if it exists, returning the bytes freed
async fn remove_if_present(path: &Path) -> io::Result<u64> {
    let len = match fs::metadata(path).await {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    match fs::remove_file(path).await {
        Ok(()) => Ok(len),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}
