use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::users::repo_types::{NewUser, Role, User, UserRow};

/// Raised when a write would duplicate a unique column.
#[derive(Debug, thiserror::Error)]
#[error("unique constraint violated on {0}")]
pub struct UniqueViolation(pub String);

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>>;
    async fn find_all(&self) -> anyhow::Result<Vec<User>>;
    async fn find_by_role(&self, role: Role) -> anyhow::Result<Vec<User>>;
    async fn create(&self, new_user: NewUser) -> anyhow::Result<User>;
    /// Persists username, email, role and active flag of an existing user.
    async fn save(&self, user: &User) -> anyhow::Result<User>;
    async fn delete(&self, id: i64) -> anyhow::Result<bool>;
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_user(row: UserRow) -> anyhow::Result<User> {
    User::try_from(row).context("decode users row")
}

fn into_users(rows: Vec<UserRow>) -> anyhow::Result<Vec<User>> {
    rows.into_iter().map(into_user).collect()
}

fn map_write_error(e: sqlx::Error, what: &'static str) -> anyhow::Error {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let column = db.constraint().unwrap_or("users").to_string();
            return UniqueViolation(column).into();
        }
    }
    anyhow::Error::new(e).context(what)
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        row.map(into_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        row.map(into_user).transpose()
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("find user by username")?;
        row.map(into_user).transpose()
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE username = $1 OR email = $2
             ORDER BY id
             LIMIT 1
            "#
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by username or email")?;
        row.map(into_user).transpose()
    }

    async fn find_all(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        into_users(rows)
    }

    async fn find_by_role(&self, role: Role) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY id"
        ))
        .bind(role.as_str())
        .fetch_all(&self.db)
        .await
        .context("list users by role")?;
        into_users(rows)
    }

    async fn create(&self, new_user: NewUser) -> anyhow::Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "insert user"))?;
        into_user(row)
    }

    async fn save(&self, user: &User) -> anyhow::Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET username = $2, email = $3, role = $4, is_active = $5, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "update user"))?;
        into_user(row)
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() > 0)
    }
}
