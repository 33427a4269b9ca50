use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::RegisterRequest,
        extractors::Principal,
        password::{hash_password, verify_password},
        validation::{check_email, check_password, check_username, normalize_email},
    },
    error::AppError,
    users::{
        dto::{UpdateUserRequest, UserDto},
        repo::{UniqueViolation, UserRepository},
        repo_types::{NewUser, Role, User},
    },
};

/// CRUD and lookup operations over users, backed by a [`UserRepository`].
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

fn not_found(id: i64) -> AppError {
    AppError::not_found(format!("User not found with id: {id}"))
}

fn to_dtos(users: Vec<User>) -> Vec<UserDto> {
    users.into_iter().map(UserDto::from).collect()
}

fn conflict_or_internal(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<UniqueViolation>() {
        Some(v) if v.0.contains("email") => AppError::conflict("Email already registered"),
        Some(_) => AppError::conflict("Username already taken"),
        None => AppError::Internal(err),
    }
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    pub async fn get_current_user(&self, principal: Option<&Principal>) -> Result<UserDto, AppError> {
        let principal =
            principal.ok_or_else(|| AppError::unauthenticated("User not authenticated"))?;
        let user = self
            .repo
            .find_by_email(&principal.email)
            .await?
            .ok_or_else(|| {
                AppError::unauthenticated(format!("User not found with email: {}", principal.email))
            })?;
        Ok(user.into())
    }

    pub async fn get_user_id_by_username(&self, username: &str) -> Result<Option<i64>, AppError> {
        Ok(self.repo.find_by_username(username).await?.map(|u| u.id))
    }

    pub async fn get_user_id_by_username_or_email(
        &self,
        value: &str,
    ) -> Result<Option<i64>, AppError> {
        Ok(self
            .repo
            .find_by_username_or_email(value, value)
            .await?
            .map(|u| u.id))
    }

    pub async fn get_all_users(&self) -> Result<Vec<UserDto>, AppError> {
        Ok(to_dtos(self.repo.find_all().await?))
    }

    pub async fn get_all_users_by_role(&self, role: Role) -> Result<Vec<UserDto>, AppError> {
        Ok(to_dtos(self.repo.find_by_role(role).await?))
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<UserDto, AppError> {
        let user = self.repo.find_by_id(id).await?.ok_or_else(|| not_found(id))?;
        Ok(user.into())
    }

    #[instrument(skip(self, req))]
    pub async fn update_user(&self, id: i64, req: UpdateUserRequest) -> Result<UserDto, AppError> {
        let mut user = self.repo.find_by_id(id).await?.ok_or_else(|| not_found(id))?;

        if let Some(username) = req.username {
            let username = username.trim().to_string();
            check_username(&username)?;
            user.username = username;
        }
        if let Some(email) = req.email {
            let email = normalize_email(&email);
            check_email(&email)?;
            user.email = email;
        }
        if let Some(active) = req.is_active {
            user.is_active = active;
        }

        let saved = self.repo.save(&user).await.map_err(conflict_or_internal)?;
        info!(user_id = saved.id, "user updated");
        Ok(saved.into())
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: i64) -> Result<(), AppError> {
        let user = self.repo.find_by_id(id).await?.ok_or_else(|| not_found(id))?;
        if !self.repo.delete(user.id).await? {
            return Err(not_found(id));
        }
        info!(user_id = id, "user deleted");
        Ok(())
    }

    pub async fn get_public_trainers(&self) -> Result<Vec<UserDto>, AppError> {
        self.active_with_role(Role::Trainer).await
    }

    pub async fn get_public_nutritionists(&self) -> Result<Vec<UserDto>, AppError> {
        self.active_with_role(Role::Nutritionist).await
    }

    async fn active_with_role(&self, role: Role) -> Result<Vec<UserDto>, AppError> {
        let users = self.repo.find_by_role(role).await?;
        Ok(to_dtos(users.into_iter().filter(|u| u.is_active).collect()))
    }

    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn register(&self, req: RegisterRequest) -> Result<User, AppError> {
        let username = req.username.trim().to_string();
        let email = normalize_email(&req.email);
        check_username(&username)?;
        check_email(&email)?;
        check_password(&req.password)?;

        let role = req.role.unwrap_or_default();
        if role == Role::Admin {
            warn!(%email, "self-registration as admin refused");
            return Err(AppError::forbidden("Cannot self-register as ADMIN"));
        }

        if self.repo.find_by_username(&username).await?.is_some() {
            return Err(AppError::conflict("Username already taken"));
        }
        if self.repo.find_by_email(&email).await?.is_some() {
            return Err(AppError::conflict("Email already registered"));
        }

        let password_hash = hash_password(&req.password)?;
        let user = self
            .repo
            .create(NewUser {
                username,
                email,
                password_hash,
                role,
            })
            .await
            .map_err(conflict_or_internal)?;
        info!(user_id = user.id, role = %user.role, "user registered");
        Ok(user)
    }

    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<User, AppError> {
        let login = login.trim();
        let user = match self
            .repo
            .find_by_username_or_email(login, &normalize_email(login))
            .await?
        {
            Some(u) => u,
            None => {
                warn!("login unknown user");
                return Err(AppError::unauthenticated("Invalid credentials"));
            }
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = user.id, "login invalid password");
            return Err(AppError::unauthenticated("Invalid credentials"));
        }
        if !user.is_active {
            warn!(user_id = user.id, "login on inactive account");
            return Err(AppError::unauthenticated("Invalid credentials"));
        }
        Ok(user)
    }

    /// Loads the account behind a refresh token; missing or inactive users fail.
    pub async fn load_active(&self, id: i64) -> Result<User, AppError> {
        match self.repo.find_by_id(id).await? {
            Some(u) if u.is_active => Ok(u),
            _ => Err(AppError::unauthenticated("User not found")),
        }
    }
}
