use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest},
        jwt::JwtKeys,
    },
    error::AppError,
    extract::ApiJson,
    state::AppState,
    users::repo_types::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

fn issue_tokens(keys: &JwtKeys, user: User) -> Result<AuthResponse, AppError> {
    let access_token = keys.sign_access(&user)?;
    let refresh_token = keys.sign_refresh(&user)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: keys.access_ttl().as_secs(),
        user: user.into(),
    })
}

#[instrument(skip(state, keys, payload))]
pub async fn register(
    State(state): State<AppState>,
    State(keys): State<JwtKeys>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let user = state.users.register(payload).await?;
    let body = issue_tokens(&keys, user)?;
    Ok((StatusCode::CREATED, Json(body)))
}

#[instrument(skip(state, keys, payload))]
pub async fn login(
    State(state): State<AppState>,
    State(keys): State<JwtKeys>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state
        .users
        .authenticate(&payload.username, &payload.password)
        .await?;
    info!(user_id = user.id, role = %user.role, "user logged in");
    Ok(Json(issue_tokens(&keys, user)?))
}

#[instrument(skip(state, keys, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    State(keys): State<JwtKeys>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| {
            warn!(error = %e, "refresh rejected");
            AppError::unauthenticated("Invalid or expired refresh token")
        })?;

    // Reload so role changes and deactivation apply to the new pair.
    let user = state.users.load_active(claims.sub).await?;
    Ok(Json(issue_tokens(&keys, user)?))
}
