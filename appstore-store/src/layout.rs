use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Suffix of in-flight upload files
const TEMP_SUFFIX: &str = ".part";

/// Maps catalog fields to paths under the storage root.
///
/// `app_id` is used verbatim as a directory name; it must already have passed
/// the catalog's id validation.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn app_dir(&self, app_id: &str) -> PathBuf {
        self.root.join(app_id)
    }

    /// File name of a stored blob: `{version}_{file_name}`
    pub fn blob_name(version: &str, file_name: &str) -> String {
        format!("{}_{}", version, file_name)
    }

    pub fn blob_path(&self, app_id: &str, version: &str, file_name: &str) -> PathBuf {
        self.app_dir(app_id)
            .join(Self::blob_name(version, file_name))
    }

    /// A fresh, unique temporary path inside the application directory
    pub fn temp_path(&self, app_id: &str) -> PathBuf {
        self.app_dir(app_id)
            .join(format!(".{}{}", Uuid::new_v4(), TEMP_SUFFIX))
    }

    pub fn is_temp_name(name: &str) -> bool {
        name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
    }

    /// Create the application directory if it does not exist yet
    pub async fn ensure_app_dir(&self, app_id: &str) -> io::Result<PathBuf> {
        let dir = self.app_dir(app_id);
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Application directory ready");
        Ok(dir)
    }
}
