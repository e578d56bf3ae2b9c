use crate::error::ApiError;
use axum::{extract::Request, middleware::Next, response::Response};

/// Headers consulted for the principal, in priority order
pub const PRINCIPAL_HEADERS: [&str; 3] = ["x-appstore-user", "x-forwarded-user", "x-user"];

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub username: String,
}

/// Auth middleware - takes the principal from headers set by the auth proxy
///
/// The proxy in front of the service sets `x-appstore-user`. `x-forwarded-user`
/// covers oauth2-proxy deployments and `x-user` is accepted for local
/// development.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let username = PRINCIPAL_HEADERS
        .iter()
        .filter_map(|name| req.headers().get(*name))
        .filter_map(|h| h.to_str().ok())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))?;

    req.extensions_mut().insert(AuthenticatedUser { username });

    Ok(next.run(req).await)
}
