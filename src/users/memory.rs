use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::users::{
    repo::{UniqueViolation, UserRepository},
    repo_types::{NewUser, Role, User},
};

/// In-process stand-in for the `users` table, with the same unique constraints.
#[derive(Default)]
pub struct MemoryUserRepository {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: Vec<User>,
}

impl Inner {
    fn check_unique(&self, id: Option<i64>, username: &str, email: &str) -> anyhow::Result<()> {
        for u in self.users.iter().filter(|u| Some(u.id) != id) {
            if u.username == username {
                return Err(UniqueViolation("users_username_key".into()).into());
            }
            if u.email == email {
                return Err(UniqueViolation("users_email_key".into()).into());
            }
        }
        Ok(())
    }
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        let inner = self.inner.lock().unwrap();
        inner.users.iter().find(|u| pred(*u)).cloned()
    }

    fn filter(&self, pred: impl Fn(&User) -> bool) -> Vec<User> {
        let inner = self.inner.lock().unwrap();
        inner.users.iter().filter(|u| pred(*u)).cloned().collect()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.id == id))
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.email == email))
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.username == username))
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        Ok(self.find(|u| u.username == username || u.email == email))
    }

    async fn find_all(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.filter(|_| true))
    }

    async fn find_by_role(&self, role: Role) -> anyhow::Result<Vec<User>> {
        Ok(self.filter(|u| u.role == role))
    }

    async fn create(&self, new_user: NewUser) -> anyhow::Result<User> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_unique(None, &new_user.username, &new_user.email)?;
        inner.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: inner.next_id,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> anyhow::Result<User> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_unique(Some(user.id), &user.username, &user.email)?;
        let stored = inner
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| anyhow::anyhow!("no user with id {}", user.id))?;
        stored.username = user.username.clone();
        stored.email = user.email.clone();
        stored.role = user.role;
        stored.is_active = user.is_active;
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.users.len();
        inner.users.retain(|u| u.id != id);
        Ok(inner.users.len() != before)
    }
}
