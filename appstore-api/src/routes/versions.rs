//! Package version endpoints: multipart upload, listing, latest, streamed
//! download and integrity verification.

use crate::{
    auth::AuthenticatedUser,
    error::{ApiError, ApiResult},
    state::AppState,
};
use appstore_catalog::PackageVersion;
use appstore_store::{UploadRequest, VerifyReport};
use axum::{
    body::Body,
    extract::{
        multipart::{Field, MultipartError},
        Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::TryStreamExt;
use std::sync::{
    atomic::{AtomicU16, Ordering},
    Arc,
};
use tracing::{info, warn};
use utoipa::ToSchema;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/apps/{app_id}/versions",
            get(list_versions).post(upload_version),
        )
        .route("/api/v1/apps/{app_id}/versions/latest", get(latest_version))
        .route(
            "/api/v1/apps/{app_id}/versions/{version}/download",
            get(download_version),
        )
}

pub fn protected_routes() -> Router<AppState> {
    Router::new().route(
        "/api/v1/apps/{app_id}/versions/{version}/verify",
        post(verify_version),
    )
}

/// All published versions, highest version first
#[utoipa::path(
    get,
    path = "/api/v1/apps/{app_id}/versions",
    tag = "versions",
    params(("app_id" = String, Path, description = "Application id")),
    responses(
        (status = 200, description = "Versions in descending order", body = [PackageVersion]),
        (status = 404, description = "Unknown application", body = crate::error::ApiErrorResponse)
    )
)]
pub async fn list_versions(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> ApiResult<Json<Vec<PackageVersion>>> {
    let versions = state.store.list_versions(&app_id).await?;
    Ok(Json(versions))
}

/// The highest published version
#[utoipa::path(
    get,
    path = "/api/v1/apps/{app_id}/versions/latest",
    tag = "versions",
    params(("app_id" = String, Path, description = "Application id")),
    responses(
        (status = 200, description = "Latest version", body = PackageVersion),
        (status = 404, description = "Unknown application or no versions", body = crate::error::ApiErrorResponse)
    )
)]
pub async fn latest_version(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> ApiResult<Json<PackageVersion>> {
    let latest = state.store.latest(&app_id).await?;
    Ok(Json(latest))
}

/// Multipart layout of an upload, for the OpenAPI document only
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    version: String,
    release_notes: Option<String>,
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

/// Publish a version.
///
/// Multipart fields: `version` and optional `release_notes`, followed by
/// `file`. The file part is streamed to storage as it arrives.
#[utoipa::path(
    post,
    path = "/api/v1/apps/{app_id}/versions",
    tag = "versions",
    params(("app_id" = String, Path, description = "Application id")),
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Version published", body = PackageVersion),
        (status = 400, description = "Missing or invalid field", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Unknown application", body = crate::error::ApiErrorResponse),
        (status = 409, description = "Version already exists", body = crate::error::ApiErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = crate::error::ApiErrorResponse)
    )
)]
pub async fn upload_version(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<PackageVersion>)> {
    let mut version: Option<String> = None;
    let mut release_notes = String::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "version" => version = Some(field.text().await.map_err(multipart_error)?),
            "release_notes" => release_notes = field.text().await.map_err(multipart_error)?,
            "file" => {
                let Some(version) = version.take() else {
                    // An unknown application outranks a malformed form
                    state.store.get_application(&app_id).await?;
                    return Err(ApiError::BadRequest(
                        "the version field must be sent before the file".to_string(),
                    ));
                };
                let request = UploadRequest {
                    version: version.trim().to_string(),
                    file_name: field.file_name().unwrap_or_default().to_string(),
                    release_notes,
                };
                return store_upload(&state, &app_id, request, field).await;
            }
            other => {
                warn!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    // No file part: let the store report what is wrong, in its usual order
    let request = UploadRequest {
        version: version.unwrap_or_default().trim().to_string(),
        file_name: String::new(),
        release_notes,
    };
    let record = state
        .store
        .upload(&app_id, request, None::<Field<'_>>)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn store_upload(
    state: &AppState,
    app_id: &str,
    request: UploadRequest,
    field: Field<'_>,
) -> ApiResult<(StatusCode, Json<PackageVersion>)> {
    // The store sees body errors as I/O failures; remember the HTTP status
    // the multipart layer attached so the client gets a precise answer.
    let body_status = Arc::new(AtomicU16::new(0));
    let recorder = Arc::clone(&body_status);
    let stream = field.inspect_err(move |e: &MultipartError| {
        recorder.store(e.status().as_u16(), Ordering::Relaxed);
    });

    match state.store.upload(app_id, request, Some(stream)).await {
        Ok(record) => Ok((StatusCode::CREATED, Json(record))),
        Err(err) => match body_status.load(Ordering::Relaxed) {
            0 => Err(err.into()),
            413 => Err(ApiError::PayloadTooLarge(
                "upload exceeds the configured size limit".to_string(),
            )),
            _ => Err(ApiError::BadRequest(format!(
                "failed to read upload body: {}",
                err
            ))),
        },
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("upload exceeds the configured size limit".to_string())
    } else {
        ApiError::BadRequest(format!("malformed multipart body: {}", err.body_text()))
    }
}

/// Stream a package file
#[utoipa::path(
    get,
    path = "/api/v1/apps/{app_id}/versions/{version}/download",
    tag = "versions",
    params(
        ("app_id" = String, Path, description = "Application id"),
        ("version" = String, Path, description = "Exact version string")
    ),
    responses(
        (status = 200, description = "Package bytes as application/octet-stream"),
        (status = 404, description = "Unknown application, version or missing file", body = crate::error::ApiErrorResponse)
    )
)]
pub async fn download_version(
    State(state): State<AppState>,
    Path((app_id, version)): Path<(String, String)>,
) -> ApiResult<Response> {
    let download = state.store.download(&app_id, &version).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, download.content_length)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&download.file_name),
        )
        .header(header::ETAG, format!("\"{}\"", download.record.md5_hash))
        .body(Body::from_stream(download.stream))
        .map_err(|e| ApiError::Internal(format!("failed to build download response: {}", e)))
}

/// Re-hash a stored package and compare it with its recorded digest
#[utoipa::path(
    post,
    path = "/api/v1/apps/{app_id}/versions/{version}/verify",
    tag = "versions",
    params(
        ("app_id" = String, Path, description = "Application id"),
        ("version" = String, Path, description = "Exact version string")
    ),
    responses(
        (status = 200, description = "Verification result", body = VerifyReport),
        (status = 401, description = "No principal", body = crate::error::ApiErrorResponse),
        (status = 404, description = "Unknown application, version or missing file", body = crate::error::ApiErrorResponse)
    )
)]
pub async fn verify_version(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((app_id, version)): Path<(String, String)>,
) -> ApiResult<Json<VerifyReport>> {
    let report = state.store.verify(&app_id, &version).await?;
    info!(
        user = %user.username,
        app_id = %app_id,
        version = %version,
        intact = report.intact,
        "Verification requested"
    );
    Ok(Json(report))
}

/// `attachment` disposition with an ASCII fallback name and the exact
/// UTF-8 name in `filename*`
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(file_name.len() * 3);
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}
