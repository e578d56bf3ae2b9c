use crate::catalog::{from_millis, to_millis, Catalog};
use crate::error::{CatalogError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

pub const MAX_APP_ID_LENGTH: usize = 100;
pub const MAX_APP_NAME_LENGTH: usize = 200;

/// A publisher-registered application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Application {
    pub app_id: String,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateApplicationRequest {
    pub app_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Validate an application id.
///
/// Ids end up as a directory name under the storage root, so only a
/// conservative character set is allowed and leading dots are rejected.
pub fn validate_app_id(app_id: &str) -> Result<()> {
    if app_id.is_empty() {
        return Err(CatalogError::InvalidInput(
            "app_id must not be empty".to_string(),
        ));
    }
    if app_id.chars().count() > MAX_APP_ID_LENGTH {
        return Err(CatalogError::InvalidInput(format!(
            "app_id exceeds {} characters",
            MAX_APP_ID_LENGTH
        )));
    }
    if app_id.starts_with('.') {
        return Err(CatalogError::InvalidInput(
            "app_id must not start with '.'".to_string(),
        ));
    }
    if let Some(bad) = app_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(CatalogError::InvalidInput(format!(
            "app_id contains invalid character {:?}",
            bad
        )));
    }
    Ok(())
}

impl Catalog {
    /// Register a new application owned by `owner`
    #[instrument(skip(self, req), fields(app_id = %req.app_id, owner = %owner))]
    pub async fn create_application(
        &self,
        req: CreateApplicationRequest,
        owner: &str,
    ) -> Result<Application> {
        validate_app_id(&req.app_id)?;

        let name = req.name.trim();
        if name.is_empty() {
            return Err(CatalogError::InvalidInput(
                "name must not be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_APP_NAME_LENGTH {
            return Err(CatalogError::InvalidInput(format!(
                "name exceeds {} characters",
                MAX_APP_NAME_LENGTH
            )));
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO applications (app_id, name, description, owner, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&req.app_id)
        .bind(name)
        .bind(&req.description)
        .bind(owner)
        .bind(to_millis(now))
        .execute(&self.pool)
        .await
        .map_err(|e| match CatalogError::from(e) {
            CatalogError::Conflict(_) => {
                CatalogError::Conflict(format!("application '{}' already exists", req.app_id))
            }
            other => other,
        })?;

        info!("Application registered");
        self.get_application(&req.app_id).await
    }

    /// Get a single application by id
    pub async fn get_application(&self, app_id: &str) -> Result<Application> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            "SELECT app_id, name, description, owner, created_at
             FROM applications WHERE app_id = ?",
        )
        .bind(app_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CatalogError::NotFound(format!("application '{}'", app_id)))?;

        Ok(row.into())
    }

    pub async fn application_exists(&self, app_id: &str) -> Result<bool> {
        let found: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM applications WHERE app_id = ?")
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    /// List every application, newest first
    pub async fn list_applications(&self) -> Result<Vec<Application>> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            "SELECT app_id, name, description, owner, created_at
             FROM applications ORDER BY created_at DESC, app_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.into()).collect())
    }

    /// Delete an application and, by cascade, all of its version records.
    ///
    /// Blobs on disk are left behind; the store's reconcile sweep removes them.
    #[instrument(skip(self))]
    pub async fn delete_application(&self, app_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM applications WHERE app_id = ?")
            .bind(app_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("application '{}'", app_id)));
        }

        info!("Application deleted");
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    app_id: String,
    name: String,
    description: String,
    owner: String,
    created_at: i64,
}

impl From<ApplicationRow> for Application {
    fn from(row: ApplicationRow) -> Self {
        Self {
            app_id: row.app_id,
            name: row.name,
            description: row.description,
            owner: row.owner,
            created_at: from_millis(row.created_at),
        }
    }
}
