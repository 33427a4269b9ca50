use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::instrument;

use crate::{
    auth::extractors::Principal,
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
    users::{
        dto::{LookupQuery, RoleFilter, UpdateUserRequest, UserDto, UserIdResponse},
        repo_types::Role,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/trainers", get(list_trainers))
        .route("/users/nutritionists", get(list_nutritionists))
        .route("/users/lookup", get(lookup_user_id))
        .route("/users/:id", get(get_user))
}

/// Mounted under `/admin`, which the security policy restricts to ADMIN.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route(
            "/admin/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    principal: Option<Principal>,
) -> Result<Json<UserDto>, AppError> {
    Ok(Json(state.users.get_current_user(principal.as_ref()).await?))
}

pub async fn list_trainers(State(state): State<AppState>) -> Result<Json<Vec<UserDto>>, AppError> {
    Ok(Json(state.users.get_public_trainers().await?))
}

pub async fn list_nutritionists(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserDto>>, AppError> {
    Ok(Json(state.users.get_public_nutritionists().await?))
}

#[instrument(skip(state))]
pub async fn lookup_user_id(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<LookupQuery>,
) -> Result<Json<UserIdResponse>, AppError> {
    let id = if q.exact {
        state.users.get_user_id_by_username(&q.username).await?
    } else {
        state.users.get_user_id_by_username_or_email(&q.username).await?
    };
    id.map(|id| Json(UserIdResponse { id }))
        .ok_or_else(|| AppError::not_found(format!("User not found: {}", q.username)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserDto>, AppError> {
    Ok(Json(state.users.get_user_by_id(id).await?))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<RoleFilter>,
) -> Result<Json<Vec<UserDto>>, AppError> {
    let users = match filter.role.as_deref() {
        Some(raw) => {
            let role = raw
                .parse::<Role>()
                .map_err(|e| AppError::bad_request(e.to_string()))?;
            state.users.get_all_users_by_role(role).await?
        }
        None => state.users.get_all_users().await?,
    };
    Ok(Json(users))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserDto>, AppError> {
    Ok(Json(state.users.update_user(id, payload).await?))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    state.users.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
