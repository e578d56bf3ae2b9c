pub mod apps;
pub mod health;
pub mod versions;

use crate::{api_docs::ApiDoc, auth::auth_middleware, config::Config, state::AppState};
use axum::{extract::DefaultBodyLimit, middleware, routing::get, Json, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

pub async fn create_app(pool: SqlitePool, config: &Config) -> anyhow::Result<Router> {
    let state = AppState::new(pool, config.storage_root.clone());

    // Allow CORS for browser clients served from another origin
    let cors = CorsLayer::permissive();

    let app = Router::new()
        .merge(health::routes()) // Health routes don't need auth
        .route("/api-docs/openapi.json", get(openapi_spec))
        .merge(apps::public_routes())
        .merge(versions::public_routes())
        .merge(
            apps::protected_routes()
                .merge(versions::protected_routes())
                .layer(middleware::from_fn(auth_middleware)),
        )
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
