use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::{
    auth::{extractors::Principal, jwt::JwtKeys},
    error::AppError,
    security::Access,
    state::AppState,
};

/// Reads an optional bearer token; a present but unusable header is an error.
fn principal_from_headers(
    headers: &HeaderMap,
    keys: &JwtKeys,
) -> Result<Option<Principal>, AppError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthenticated("Invalid Authorization header"))?;

    match keys.verify_access(token) {
        Ok(claims) => Ok(Some(claims.into())),
        Err(e) => {
            warn!(error = %e, "invalid or expired token");
            Err(AppError::unauthenticated("Invalid or expired token"))
        }
    }
}

/// Stateless filter: resolves the path against the security policy and
/// authenticates the bearer token before any handler runs.
pub async fn authorize(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let access = state.policy.resolve(req.uri().path());
    let principal = principal_from_headers(req.headers(), &state.jwt);

    match access {
        Access::Public => {
            if let Ok(Some(p)) = principal {
                req.extensions_mut().insert(p);
            }
        }
        Access::Authenticated | Access::Role(_) => {
            let p = principal?.ok_or_else(|| {
                debug!(path = %req.uri().path(), "missing credentials");
                AppError::unauthenticated("Authentication required")
            })?;
            if let Access::Role(required) = access {
                if !p.has_role(required) {
                    warn!(user_id = p.user_id, role = %p.role, %required, path = %req.uri().path(), "access denied");
                    return Err(AppError::forbidden("Access denied"));
                }
            }
            req.extensions_mut().insert(p);
        }
    }

    Ok(next.run(req).await)
}
