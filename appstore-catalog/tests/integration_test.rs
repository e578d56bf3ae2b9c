//! Integration tests for appstore-catalog
//!
//! Exercises the application registry and the pending/committed lifecycle of
//! package version records against a real SQLite file.

use appstore_catalog::db::{create_pool, run_migrations};
use appstore_catalog::{Catalog, CatalogError, CreateApplicationRequest, NewVersion, VersionState};
use chrono::{Duration, Utc};
use tempfile::TempDir;

async fn create_catalog() -> (Catalog, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let pool = create_pool(&dir.path().join("catalog.db"))
        .await
        .expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to migrate");
    (Catalog::new(pool), dir)
}

fn app_request(app_id: &str) -> CreateApplicationRequest {
    CreateApplicationRequest {
        app_id: app_id.to_string(),
        name: format!("{} display name", app_id),
        description: "A test application".to_string(),
    }
}

fn new_version(app_id: &str, version: &str) -> NewVersion {
    NewVersion {
        app_id: app_id.to_string(),
        version: version.to_string(),
        file_name: "app.zip".to_string(),
        release_notes: String::new(),
    }
}

#[tokio::test]
async fn test_create_and_get_application() {
    let (catalog, _dir) = create_catalog().await;

    let app = catalog
        .create_application(app_request("editor"), "alice")
        .await
        .expect("Failed to create application");

    assert_eq!(app.app_id, "editor");
    assert_eq!(app.owner, "alice");
    assert_eq!(app.description, "A test application");

    let fetched = catalog.get_application("editor").await.unwrap();
    assert_eq!(fetched, app);
    assert!(catalog.application_exists("editor").await.unwrap());
    assert!(!catalog.application_exists("missing").await.unwrap());
}

#[tokio::test]
async fn test_duplicate_application_is_conflict() {
    let (catalog, _dir) = create_catalog().await;

    catalog
        .create_application(app_request("editor"), "alice")
        .await
        .unwrap();
    let err = catalog
        .create_application(app_request("editor"), "bob")
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::Conflict(_)), "got {:?}", err);
    assert_eq!(catalog.get_application("editor").await.unwrap().owner, "alice");
}

#[tokio::test]
async fn test_create_application_rejects_bad_input() {
    let (catalog, _dir) = create_catalog().await;

    let err = catalog
        .create_application(app_request("../escape"), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidInput(_)));

    let mut blank_name = app_request("ok");
    blank_name.name = "   ".to_string();
    let err = catalog
        .create_application(blank_name, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidInput(_)));
}

#[tokio::test]
async fn test_get_missing_application_is_not_found() {
    let (catalog, _dir) = create_catalog().await;

    let err = catalog.get_application("ghost").await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[tokio::test]
async fn test_pending_versions_are_invisible_until_committed() {
    let (catalog, _dir) = create_catalog().await;
    catalog
        .create_application(app_request("editor"), "alice")
        .await
        .unwrap();

    let id = catalog
        .reserve_version(&new_version("editor", "1.0.0"))
        .await
        .unwrap();

    assert!(catalog.version_exists("editor", "1.0.0").await.unwrap());
    assert_eq!(
        catalog.version_state("editor", "1.0.0").await.unwrap(),
        Some(VersionState::Pending)
    );
    assert!(catalog.find_version("editor", "1.0.0").await.unwrap().is_none());
    assert!(catalog.list_versions("editor").await.unwrap().is_empty());

    let committed = catalog.commit_version(id, 42, "abc123").await.unwrap();
    assert_eq!(committed.file_size, 42);
    assert_eq!(committed.md5_hash, "abc123");
    assert_eq!(
        catalog.version_state("editor", "1.0.0").await.unwrap(),
        Some(VersionState::Committed)
    );
    assert_eq!(catalog.version_state("editor", "9.9.9").await.unwrap(), None);

    let found = catalog
        .find_version("editor", "1.0.0")
        .await
        .unwrap()
        .expect("committed version should be visible");
    assert_eq!(found, committed);
    assert_eq!(catalog.list_versions("editor").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reserving_same_version_twice_conflicts() {
    let (catalog, _dir) = create_catalog().await;
    catalog
        .create_application(app_request("editor"), "alice")
        .await
        .unwrap();

    catalog
        .reserve_version(&new_version("editor", "1.0.0"))
        .await
        .unwrap();
    let err = catalog
        .reserve_version(&new_version("editor", "1.0.0"))
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::Conflict(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_reserving_for_missing_application_is_not_found() {
    let (catalog, _dir) = create_catalog().await;

    let err = catalog
        .reserve_version(&new_version("ghost", "1.0.0"))
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::NotFound(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_release_only_removes_pending_rows() {
    let (catalog, _dir) = create_catalog().await;
    catalog
        .create_application(app_request("editor"), "alice")
        .await
        .unwrap();

    let pending = catalog
        .reserve_version(&new_version("editor", "1.0.0"))
        .await
        .unwrap();
    let committed = catalog
        .reserve_version(&new_version("editor", "2.0.0"))
        .await
        .unwrap();
    catalog.commit_version(committed, 1, "h").await.unwrap();

    assert!(catalog.release_version(pending).await.unwrap());
    assert!(!catalog.release_version(committed).await.unwrap());

    assert!(!catalog.version_exists("editor", "1.0.0").await.unwrap());
    assert!(catalog.version_exists("editor", "2.0.0").await.unwrap());
}

#[tokio::test]
async fn test_commit_of_released_reservation_is_not_found() {
    let (catalog, _dir) = create_catalog().await;
    catalog
        .create_application(app_request("editor"), "alice")
        .await
        .unwrap();

    let id = catalog
        .reserve_version(&new_version("editor", "1.0.0"))
        .await
        .unwrap();
    catalog.release_version(id).await.unwrap();

    let err = catalog.commit_version(id, 1, "h").await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[tokio::test]
async fn test_stale_reservations_respect_cutoff() {
    let (catalog, _dir) = create_catalog().await;
    catalog
        .create_application(app_request("editor"), "alice")
        .await
        .unwrap();

    let pending = catalog
        .reserve_version(&new_version("editor", "1.0.0"))
        .await
        .unwrap();
    let committed = catalog
        .reserve_version(&new_version("editor", "2.0.0"))
        .await
        .unwrap();
    catalog.commit_version(committed, 1, "h").await.unwrap();

    let past = Utc::now() - Duration::hours(1);
    assert!(catalog.stale_reservations(past).await.unwrap().is_empty());

    let future = Utc::now() + Duration::hours(1);
    let stale = catalog.stale_reservations(future).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, pending);
    assert_eq!(stale[0].version, "1.0.0");
}

#[tokio::test]
async fn test_blob_name_collision_detection() {
    let (catalog, _dir) = create_catalog().await;
    catalog
        .create_application(app_request("editor"), "alice")
        .await
        .unwrap();

    // "1_a" + "b" and "1" + "a_b" both map to "1_a_b"
    let first = catalog
        .reserve_version(&NewVersion {
            file_name: "b".to_string(),
            ..new_version("editor", "1_a")
        })
        .await
        .unwrap();
    let second = catalog
        .reserve_version(&NewVersion {
            file_name: "a_b".to_string(),
            ..new_version("editor", "1")
        })
        .await
        .unwrap();

    assert!(catalog.blob_name_taken("editor", "1_a_b", second).await.unwrap());
    assert!(catalog.blob_name_taken("editor", "1_a_b", first).await.unwrap());
    assert!(!catalog.blob_name_taken("editor", "9_x", first).await.unwrap());
}

#[tokio::test]
async fn test_delete_application_cascades_versions() {
    let (catalog, _dir) = create_catalog().await;
    catalog
        .create_application(app_request("editor"), "alice")
        .await
        .unwrap();
    let id = catalog
        .reserve_version(&new_version("editor", "1.0.0"))
        .await
        .unwrap();
    catalog.commit_version(id, 1, "h").await.unwrap();

    catalog.delete_application("editor").await.unwrap();

    assert!(catalog.blob_keys().await.unwrap().is_empty());
    let err = catalog.delete_application("editor").await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[tokio::test]
async fn test_list_applications_newest_first() {
    let (catalog, _dir) = create_catalog().await;

    catalog
        .create_application(app_request("first"), "alice")
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    catalog
        .create_application(app_request("second"), "bob")
        .await
        .unwrap();

    let apps = catalog.list_applications().await.unwrap();
    let ids: Vec<_> = apps.iter().map(|a| a.app_id.as_str()).collect();
    assert_eq!(ids, vec!["second", "first"]);
}
