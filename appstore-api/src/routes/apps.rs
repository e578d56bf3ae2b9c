use crate::{auth::AuthenticatedUser, error::ApiResult, state::AppState};
use appstore_catalog::{Application, CreateApplicationRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};

/// Routes open to anonymous clients
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/apps", get(list_applications))
        .route("/api/v1/apps/{app_id}", get(get_application))
}

/// Routes that need an authenticated principal
pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/api/v1/apps", post(create_application))
}

/// Register a new application owned by the caller
#[utoipa::path(
    post,
    path = "/api/v1/apps",
    tag = "applications",
    request_body = CreateApplicationRequest,
    responses(
        (status = 201, description = "Application created", body = Application),
        (status = 400, description = "Invalid app_id or name", body = crate::error::ApiErrorResponse),
        (status = 401, description = "No principal", body = crate::error::ApiErrorResponse),
        (status = 409, description = "app_id already taken", body = crate::error::ApiErrorResponse)
    )
)]
pub async fn create_application(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CreateApplicationRequest>,
) -> ApiResult<(StatusCode, Json<Application>)> {
    let app = state
        .store
        .create_application(req, &user.username)
        .await?;

    Ok((StatusCode::CREATED, Json(app)))
}

/// List applications, newest first
#[utoipa::path(
    get,
    path = "/api/v1/apps",
    tag = "applications",
    responses((status = 200, description = "All applications", body = [Application]))
)]
pub async fn list_applications(State(state): State<AppState>) -> ApiResult<Json<Vec<Application>>> {
    let apps = state.store.list_applications().await?;
    Ok(Json(apps))
}

#[utoipa::path(
    get,
    path = "/api/v1/apps/{app_id}",
    tag = "applications",
    params(("app_id" = String, Path, description = "Application id")),
    responses(
        (status = 200, description = "The application", body = Application),
        (status = 404, description = "Unknown application", body = crate::error::ApiErrorResponse)
    )
)]
pub async fn get_application(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
) -> ApiResult<Json<Application>> {
    let app = state.store.get_application(&app_id).await?;
    Ok(Json(app))
}
