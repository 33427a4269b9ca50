use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{auth::claims::Claims, error::AppError, users::repo_types::Role};

/// Authenticated caller, attached to request extensions by the authorize middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
}

impl From<Claims> for Principal {
    fn from(c: Claims) -> Self {
        Self {
            user_id: c.sub,
            email: c.email,
            role: c.role,
        }
    }
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AppError::unauthenticated("Authentication required"))
    }
}
