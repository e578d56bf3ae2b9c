//! # Package store orchestration
//!
//! [`PackageStore`] pairs catalog records with blobs on disk.
//!
//! An upload moves through three states. It first reserves its
//! (application, version) key with a pending catalog row, which is where
//! concurrent duplicates are turned away. It then streams the payload to a
//! temporary file while hashing, renames the file into place, and finally
//! commits the row with the measured size and digest. Any failure in between
//! removes what was written and releases the reservation.

use crate::digest::{copy_and_hash, CHUNK_SIZE};
use crate::error::{StoreError, StoreResult};
use crate::layout::StorageLayout;
use crate::sanitize::sanitize_filename;
use crate::version;
use appstore_catalog::{
    Application, Catalog, CreateApplicationRequest, NewVersion, PackageVersion, VersionState,
};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, instrument, warn};

/// Upper bound on the length of a version label
pub const MAX_VERSION_LENGTH: usize = 50;

/// Most filesystems cap a single path component at 255 bytes
pub const MAX_BLOB_NAME_BYTES: usize = 255;

/// Chunked byte stream returned by downloads
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Client-supplied metadata for an upload
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub version: String,
    /// Original client file name, sanitized by the store
    pub file_name: String,
    pub release_notes: String,
}

/// A package ready to be streamed to a client
pub struct Download {
    pub record: PackageVersion,
    /// Display name for the downloaded file
    pub file_name: String,
    /// Length of the stored file in bytes
    pub content_length: u64,
    pub stream: ByteStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("record", &self.record)
            .field("file_name", &self.file_name)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct PackageStore {
    catalog: Catalog,
    layout: StorageLayout,
}

impl PackageStore {
    pub fn new(catalog: Catalog, layout: StorageLayout) -> Self {
        Self { catalog, layout }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Register an application. Ownership is stamped by the caller.
    pub async fn create_application(
        &self,
        req: CreateApplicationRequest,
        owner: &str,
    ) -> StoreResult<Application> {
        Ok(self.catalog.create_application(req, owner).await?)
    }

    pub async fn get_application(&self, app_id: &str) -> StoreResult<Application> {
        Ok(self.catalog.get_application(app_id).await?)
    }

    pub async fn list_applications(&self) -> StoreResult<Vec<Application>> {
        Ok(self.catalog.list_applications().await?)
    }

    /// Remove an application and its version records.
    ///
    /// Blobs stay on disk until the next reconcile sweep.
    pub async fn delete_application(&self, app_id: &str) -> StoreResult<()> {
        Ok(self.catalog.delete_application(app_id).await?)
    }

    /// All committed versions, highest version first
    #[instrument(skip(self))]
    pub async fn list_versions(&self, app_id: &str) -> StoreResult<Vec<PackageVersion>> {
        self.require_application(app_id).await?;

        let mut versions = self.catalog.list_versions(app_id).await?;
        version::sort_newest_first(&mut versions);
        Ok(versions)
    }

    /// The highest committed version
    #[instrument(skip(self))]
    pub async fn latest(&self, app_id: &str) -> StoreResult<PackageVersion> {
        self.require_application(app_id).await?;

        let versions = self.catalog.list_versions(app_id).await?;
        version::latest(versions).ok_or_else(|| {
            StoreError::NotFound(format!("application '{}' has no versions yet", app_id))
        })
    }

    /// Publish a new version.
    ///
    /// `stream` is the package payload; `None` means the client sent no file.
    /// Exactly one blob and one committed record are created, or neither.
    #[instrument(skip(self, request, stream), fields(version = %request.version))]
    pub async fn upload<S, E>(
        &self,
        app_id: &str,
        request: UploadRequest,
        stream: Option<S>,
    ) -> StoreResult<PackageVersion>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.require_application(app_id).await?;

        validate_version_label(&request.version)?;
        let stream = stream
            .ok_or_else(|| StoreError::InvalidInput("package file is missing".to_string()))?;
        let file_name = sanitize_filename(&request.file_name);
        if file_name.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "file name '{}' has no usable characters",
                request.file_name
            )));
        }
        if StorageLayout::blob_name(&request.version, &file_name).len() > MAX_BLOB_NAME_BYTES {
            return Err(StoreError::InvalidInput(
                "version and file name are too long".to_string(),
            ));
        }

        // Pull the first non-empty chunk so an empty payload is rejected
        // before the key is looked at. Nothing is written yet.
        let mut stream = Box::pin(stream);
        let first = loop {
            match stream.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => break chunk,
                Some(Err(e)) => return Err(StoreError::Storage(io::Error::other(e))),
                None => {
                    return Err(StoreError::InvalidInput("package file is empty".to_string()))
                }
            }
        };
        let stream = futures_util::stream::iter([Ok(first)]).chain(stream);

        // Fast path only; the reservation below is what actually guards the key.
        match self.catalog.version_state(app_id, &request.version).await? {
            Some(VersionState::Committed) => {
                return Err(duplicate_version(app_id, &request.version))
            }
            Some(VersionState::Pending) => {
                return Err(StoreError::Conflict(format!(
                    "version '{}' of application '{}' is still being uploaded; \
                     retry after that upload finishes or the reconcile sweep releases it",
                    request.version, app_id
                )))
            }
            None => {}
        }

        let new_version = NewVersion {
            app_id: app_id.to_string(),
            version: request.version.clone(),
            file_name,
            release_notes: request.release_notes,
        };
        let reservation = self.catalog.reserve_version(&new_version).await?;
        let mut guard = UploadGuard::new(self.catalog.clone(), reservation);

        match self.write_and_commit(&mut guard, &new_version, stream).await {
            Ok(record) => {
                guard.disarm();
                info!(
                    app_id = %record.app_id,
                    version = %record.version,
                    size = record.file_size,
                    md5 = %record.md5_hash,
                    "Package version published"
                );
                Ok(record)
            }
            Err(e) => {
                guard.abort().await;
                if e.is_client_error() {
                    warn!(app_id = %app_id, error = %e, "Upload rejected");
                } else {
                    error!(app_id = %app_id, error = %e, "Upload failed");
                }
                Err(e)
            }
        }
    }

    async fn write_and_commit<S, E>(
        &self,
        guard: &mut UploadGuard,
        new_version: &NewVersion,
        stream: S,
    ) -> StoreResult<PackageVersion>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let app_id = new_version.app_id.as_str();
        let blob_name = StorageLayout::blob_name(&new_version.version, &new_version.file_name);
        if self
            .catalog
            .blob_name_taken(app_id, &blob_name, guard.reservation_id())
            .await?
        {
            return Err(StoreError::Conflict(format!(
                "another version of '{}' is already stored as '{}'",
                app_id, blob_name
            )));
        }

        self.layout.ensure_app_dir(app_id).await?;

        let temp_path = self.layout.temp_path(app_id);
        guard.temp_path = Some(temp_path.clone());
        let mut file = File::create(&temp_path).await?;
        let digest = copy_and_hash(stream, &mut file).await?;
        file.sync_all().await?;
        drop(file);

        let final_path =
            self.layout
                .blob_path(app_id, &new_version.version, &new_version.file_name);
        fs::rename(&temp_path, &final_path).await?;
        guard.temp_path = None;
        guard.blob_path = Some(final_path);
        debug!(size = digest.size, "Package written to storage");

        let record = self
            .catalog
            .commit_version(guard.reservation_id(), digest.size, &digest.md5_hex)
            .await?;
        Ok(record)
    }

    /// Open a committed version for streaming
    #[instrument(skip(self))]
    pub async fn download(&self, app_id: &str, version: &str) -> StoreResult<Download> {
        let record = self.committed_version(app_id, version).await?;
        let path = self
            .layout
            .blob_path(app_id, &record.version, &record.file_name);

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Catalog record has no stored file");
                return Err(StoreError::NotFound(format!(
                    "package file for version '{}' of '{}' is missing",
                    version, app_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let content_length = file.metadata().await?.len();
        if content_length != record.file_size {
            warn!(
                path = %path.display(),
                recorded = record.file_size,
                actual = content_length,
                "Stored file size differs from catalog record"
            );
        }

        Ok(Download {
            file_name: record.file_name.clone(),
            content_length,
            stream: file_stream(file),
            record,
        })
    }

    /// Fetch a committed record, distinguishing a missing application from a
    /// missing version
    pub(crate) async fn committed_version(
        &self,
        app_id: &str,
        version: &str,
    ) -> StoreResult<PackageVersion> {
        self.require_application(app_id).await?;

        self.catalog
            .find_version(app_id, version)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "version '{}' of application '{}' does not exist",
                    version, app_id
                ))
            })
    }

    async fn require_application(&self, app_id: &str) -> StoreResult<()> {
        if !self.catalog.application_exists(app_id).await? {
            return Err(StoreError::NotFound(format!(
                "application '{}' does not exist",
                app_id
            )));
        }
        Ok(())
    }
}

/// Version labels become part of a file name, so they may not contain
/// separators or control characters.
pub fn validate_version_label(version: &str) -> StoreResult<()> {
    if version.is_empty() {
        return Err(StoreError::InvalidInput("version is required".to_string()));
    }
    if version.chars().count() > MAX_VERSION_LENGTH {
        return Err(StoreError::InvalidInput(format!(
            "version exceeds {} characters",
            MAX_VERSION_LENGTH
        )));
    }
    if version
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(StoreError::InvalidInput(format!(
            "version '{}' contains a path separator or control character",
            version.escape_debug()
        )));
    }
    Ok(())
}

fn duplicate_version(app_id: &str, version: &str) -> StoreError {
    StoreError::Conflict(format!(
        "version '{}' of application '{}' already exists",
        version, app_id
    ))
}

fn file_stream(file: File) -> ByteStream {
    let stream = async_stream::try_stream! {
        let mut file = file;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    };

    Box::pin(stream)
}

/// Undoes an upload that never reached its commit.
///
/// `abort` cleans up on ordinary error paths. If the upload future is dropped
/// instead (the client disconnected), `Drop` removes the files synchronously
/// and hands the reservation release to the runtime.
struct UploadGuard {
    catalog: Catalog,
    reservation: Option<i64>,
    temp_path: Option<PathBuf>,
    blob_path: Option<PathBuf>,
}

impl UploadGuard {
    fn new(catalog: Catalog, reservation: i64) -> Self {
        Self {
            catalog,
            reservation: Some(reservation),
            temp_path: None,
            blob_path: None,
        }
    }

    fn reservation_id(&self) -> i64 {
        self.reservation.unwrap_or_default()
    }

    fn disarm(&mut self) {
        self.reservation = None;
        self.temp_path = None;
        self.blob_path = None;
    }

    async fn abort(&mut self) {
        for path in [self.temp_path.take(), self.blob_path.take()]
            .into_iter()
            .flatten()
        {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "Removed partial upload"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial upload"),
            }
        }

        if let Some(id) = self.reservation.take() {
            if let Err(e) = self.catalog.release_version(id).await {
                warn!(reservation_id = id, error = %e, "Failed to release reservation");
            }
        }
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        for path in [self.temp_path.take(), self.blob_path.take()]
            .into_iter()
            .flatten()
        {
            let _ = std::fs::remove_file(&path);
        }

        if let Some(id) = self.reservation.take() {
            warn!(reservation_id = id, "Upload abandoned before commit");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let catalog = self.catalog.clone();
                handle.spawn(async move {
                    if let Err(e) = catalog.release_version(id).await {
                        warn!(reservation_id = id, error = %e, "Failed to release reservation");
                    }
                });
            }
        }
    }
}
