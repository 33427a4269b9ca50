use serde::{Deserialize, Serialize};

use crate::users::repo_types::{Role, User};

/// Public view of a user returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
}

impl From<User> for UserDto {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            role: u.role,
            is_active: u.is_active,
        }
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "is_active")]
    pub is_active: Option<bool>,
}

/// `?role=` filter; parsed leniently so `trainer` and `TRAINER` both work.
#[derive(Debug, Deserialize)]
pub struct RoleFilter {
    pub role: Option<String>,
}

/// `?username=`; matches username or email unless `exact=true` asks for username only.
#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub username: String,
    #[serde(default)]
    pub exact: bool,
}

#[derive(Debug, Serialize)]
pub struct UserIdResponse {
    pub id: i64,
}
