use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Handle on the catalog database.
///
/// Cheap to clone; every clone shares the same connection pool. Application
/// queries live in [`crate::application`], version queries in
/// [`crate::version`].
#[derive(Clone)]
pub struct Catalog {
    pub(crate) pool: SqlitePool,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Timestamps are stored as milliseconds so uploads made within the same
/// second still order deterministically.
pub(crate) fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
