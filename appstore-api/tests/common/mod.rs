//! Common test utilities and helpers for appstore-api tests

#![allow(dead_code)]

use appstore_api::Config;
use appstore_catalog::db::{create_pool, run_migrations};
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "appstore-test-boundary";

/// A router over a fresh catalog and storage root
pub struct TestClient {
    pub app: Router,
    pub pool: SqlitePool,
    pub config: Config,
    pub dir: TempDir,
}

impl TestClient {
    pub async fn new() -> Self {
        Self::with_upload_limit(16 * 1024 * 1024).await
    }

    pub async fn with_upload_limit(max_upload_bytes: usize) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = dir.path().join("catalog.db");
        let pool = create_pool(&db_path).await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let config = Config {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path,
            storage_root: dir.path().join("storage"),
            max_upload_bytes,
            reconcile_interval_secs: 0,
            stale_upload_secs: 86400,
        };
        let app = appstore_api::create_app(pool.clone(), &config)
            .await
            .expect("Failed to create test app");

        Self {
            app,
            pool,
            config,
            dir,
        }
    }

    /// Send a request to the API
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Post JSON, optionally as a user
    pub async fn post_json<T: serde::Serialize>(
        &self,
        uri: &str,
        body: &T,
        user: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("x-user", user);
        }

        let request = builder
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_empty(&self, uri: &str, user: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user", user);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Create an application through the API and assert success
    pub async fn create_app(&self, app_id: &str) {
        let response = self
            .post_json(
                "/api/v1/apps",
                &serde_json::json!({ "app_id": app_id, "name": format!("{} app", app_id) }),
                Some("publisher"),
            )
            .await;
        assert_eq!(response.status(), 201, "failed to create {}", app_id);
    }

    /// Upload multipart parts to an application's versions endpoint
    pub async fn upload(&self, app_id: &str, parts: &[Part<'_>]) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/apps/{}/versions", app_id))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(request).await
    }

    /// The usual version + notes + file upload
    pub async fn upload_version(&self, app_id: &str, version: &str, data: &[u8]) -> Response<Body> {
        self.upload(
            app_id,
            &[
                Part::text("version", version),
                Part::text("release_notes", "notes"),
                Part::file("app.zip", data),
            ],
        )
        .await
    }
}

/// One multipart form part
pub struct Part<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            file_name: None,
            data: value.as_bytes(),
        }
    }

    pub fn file(file_name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name: "file",
            file_name: Some(file_name),
            data,
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.file_name {
            Some(file_name) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: Response<Body>) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}

pub async fn extract_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body")
        .to_vec()
}
