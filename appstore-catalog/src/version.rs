use crate::catalog::{from_millis, to_millis, Catalog};
use crate::error::{CatalogError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

/// A committed, immutable package version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PackageVersion {
    pub id: i64,
    pub app_id: String,
    pub version: String,
    pub file_name: String,
    pub file_size: u64,
    pub md5_hash: String,
    pub release_notes: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VersionState {
    Pending,
    Committed,
}

/// Everything needed to reserve an (application, version) key
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub app_id: String,
    pub version: String,
    pub file_name: String,
    pub release_notes: String,
}

/// A reservation whose upload has not been committed
#[derive(Debug, Clone)]
pub struct PendingVersion {
    pub id: i64,
    pub app_id: String,
    pub version: String,
    pub file_name: String,
    pub reserved_at: DateTime<Utc>,
}

/// The catalog fields a blob path is derived from, for any row state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey {
    pub app_id: String,
    pub version: String,
    pub file_name: String,
}

const VERSION_COLUMNS: &str =
    "id, app_id, version, file_name, file_size, md5_hash, release_notes, uploaded_at";

impl Catalog {
    /// True when any row, pending or committed, holds this (app, version) key
    pub async fn version_exists(&self, app_id: &str, version: &str) -> Result<bool> {
        let found: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM package_versions WHERE app_id = ? AND version = ?")
                .bind(app_id)
                .bind(version)
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }

    /// State of the row holding this (app, version) key, if there is one
    pub async fn version_state(&self, app_id: &str, version: &str) -> Result<Option<VersionState>> {
        let found: Option<(VersionState,)> =
            sqlx::query_as("SELECT state FROM package_versions WHERE app_id = ? AND version = ?")
                .bind(app_id)
                .bind(version)
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.map(|(state,)| state))
    }

    /// Look up a committed version
    pub async fn find_version(&self, app_id: &str, version: &str) -> Result<Option<PackageVersion>> {
        let row = sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM package_versions
             WHERE app_id = ? AND version = ? AND state = 'committed'"
        ))
        .bind(app_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.into()))
    }

    /// All committed versions of an application, most recently uploaded first.
    ///
    /// This is upload order only; semantic ordering is applied by the store.
    pub async fn list_versions(&self, app_id: &str) -> Result<Vec<PackageVersion>> {
        let rows = sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM package_versions
             WHERE app_id = ? AND state = 'committed'
             ORDER BY uploaded_at DESC, id DESC"
        ))
        .bind(app_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.into()).collect())
    }

    /// Claim an (application, version) key by inserting a pending row.
    ///
    /// The UNIQUE constraint on the table decides between concurrent
    /// reservations: the loser gets [`CatalogError::Conflict`].
    #[instrument(skip(self, new), fields(app_id = %new.app_id, version = %new.version))]
    pub async fn reserve_version(&self, new: &NewVersion) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO package_versions (app_id, version, file_name, release_notes, state, reserved_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.app_id)
        .bind(&new.version)
        .bind(&new.file_name)
        .bind(&new.release_notes)
        .bind(VersionState::Pending)
        .bind(to_millis(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| match CatalogError::from(e) {
            CatalogError::Conflict(_) => CatalogError::Conflict(format!(
                "version '{}' of application '{}' already exists",
                new.version, new.app_id
            )),
            CatalogError::NotFound(_) => {
                CatalogError::NotFound(format!("application '{}'", new.app_id))
            }
            other => other,
        })?;

        let id = result.last_insert_rowid();
        debug!(reservation_id = id, "Version reserved");
        Ok(id)
    }

    /// Another row of the same application whose blob name collides with
    /// `{version}_{file_name}`, if any.
    pub async fn blob_name_taken(
        &self,
        app_id: &str,
        blob_name: &str,
        except_id: i64,
    ) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM package_versions
             WHERE app_id = ? AND version || '_' || file_name = ? AND id != ?",
        )
        .bind(app_id)
        .bind(blob_name)
        .bind(except_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    /// Promote a reservation to a committed version with its verified size and hash
    #[instrument(skip(self, md5_hash))]
    pub async fn commit_version(
        &self,
        id: i64,
        file_size: u64,
        md5_hash: &str,
    ) -> Result<PackageVersion> {
        let size = i64::try_from(file_size).map_err(|_| {
            CatalogError::InvalidInput(format!("file size {} out of range", file_size))
        })?;

        let result = sqlx::query(
            "UPDATE package_versions
             SET state = ?, file_size = ?, md5_hash = ?, uploaded_at = ?
             WHERE id = ? AND state = ?",
        )
        .bind(VersionState::Committed)
        .bind(size)
        .bind(md5_hash)
        .bind(to_millis(Utc::now()))
        .bind(id)
        .bind(VersionState::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("reservation {}", id)));
        }

        let row = sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM package_versions WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        info!(app_id = %row.app_id, version = %row.version, "Version committed");
        Ok(row.into())
    }

    /// Drop a reservation that will never be committed.
    ///
    /// Committed rows are never touched. Returns whether a row was removed.
    pub async fn release_version(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM package_versions WHERE id = ? AND state = ?")
            .bind(id)
            .bind(VersionState::Pending)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Reservations made before `cutoff` that were never committed
    pub async fn stale_reservations(&self, cutoff: DateTime<Utc>) -> Result<Vec<PendingVersion>> {
        let rows = sqlx::query_as::<_, PendingRow>(
            "SELECT id, app_id, version, file_name, reserved_at FROM package_versions
             WHERE state = ? AND reserved_at < ?
             ORDER BY reserved_at ASC",
        )
        .bind(VersionState::Pending)
        .bind(to_millis(cutoff))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PendingVersion {
                id: row.id,
                app_id: row.app_id,
                version: row.version,
                file_name: row.file_name,
                reserved_at: from_millis(row.reserved_at),
            })
            .collect())
    }

    /// Blob keys of every row, pending or committed
    pub async fn blob_keys(&self) -> Result<Vec<BlobKey>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT app_id, version, file_name FROM package_versions")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(app_id, version, file_name)| BlobKey {
                app_id,
                version,
                file_name,
            })
            .collect())
    }
}

// Internal row types for sqlx
#[derive(sqlx::FromRow)]
struct VersionRow {
    id: i64,
    app_id: String,
    version: String,
    file_name: String,
    file_size: i64,
    md5_hash: String,
    release_notes: String,
    uploaded_at: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    id: i64,
    app_id: String,
    version: String,
    file_name: String,
    reserved_at: i64,
}

impl From<VersionRow> for PackageVersion {
    fn from(row: VersionRow) -> Self {
        Self {
            id: row.id,
            app_id: row.app_id,
            version: row.version,
            file_name: row.file_name,
            file_size: u64::try_from(row.file_size).unwrap_or_default(),
            md5_hash: row.md5_hash,
            release_notes: row.release_notes,
            uploaded_at: row.uploaded_at.map(from_millis).unwrap_or_default(),
        }
    }
}
