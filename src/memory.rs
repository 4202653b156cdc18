use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::repo::UserRepo;
use crate::auth::repo_types::{NewUser, User};
use crate::auth::services::normalize_email;
use crate::db::StoreError;
use crate::tasks::repo::TaskRepo;
use crate::tasks::repo_types::{Task, TaskFilter};

/// Process-local store used by tests and by runs without `DATABASE_URL`.
/// Each operation holds the lock for its whole read-modify-write, which gives the
/// same per-record atomicity the database provides.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    tasks: Mutex<HashMap<Uuid, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Email equality under the same folding as `lower(email)` in Postgres.
fn same_email(a: &str, b: &str) -> bool {
    normalize_email(a) == normalize_email(b)
}

fn email_taken(users: &HashMap<Uuid, User>, email: &str, except: Option<Uuid>) -> bool {
    users
        .values()
        .any(|u| same_email(&u.email, email) && Some(u.id) != except)
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|u| same_email(&u.email, email))
            .cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().await;
        if email_taken(&users, &new.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            reset_token: None,
            reset_token_expiry: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().await;
        if email_taken(&users, email, Some(id)) {
            return Err(StoreError::DuplicateEmail);
        }
        Ok(users.get_mut(&id).map(|u| {
            u.name = name.to_string();
            u.email = email.to_string();
            u.clone()
        }))
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let mut users = self.users.lock().await;
        Ok(users
            .get_mut(&id)
            .map(|u| u.password_hash = password_hash.to_string())
            .is_some())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expiry: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut users = self.users.lock().await;
        Ok(users
            .get_mut(&id)
            .map(|u| {
                u.reset_token = Some(token.to_string());
                u.reset_token_expiry = Some(expiry);
            })
            .is_some())
    }

    async fn find_by_reset_token(
        &self,
        id: Uuid,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .get(&id)
            .filter(|u| u.reset_matches(token, now))
            .cloned())
    }

    async fn complete_reset(
        &self,
        id: Uuid,
        token: &str,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().await;
        let Some(user) = users.get_mut(&id).filter(|u| u.reset_matches(token, now)) else {
            return Ok(None);
        };
        user.password_hash = password_hash.to_string();
        user.reset_token = None;
        user.reset_token_expiry = None;
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl TaskRepo for MemoryStore {
    async fn list(&self, owner: Uuid, filter: &TaskFilter) -> anyhow::Result<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| t.owner == owner && filter.matches(t))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        Ok(self.tasks.lock().await.get(&id).cloned())
    }

    async fn create(&self, task: Task) -> anyhow::Result<Task> {
        self.tasks.lock().await.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update(&self, task: &Task) -> anyhow::Result<Option<Task>> {
        let mut tasks = self.tasks.lock().await;
        match tasks.get_mut(&task.id) {
            Some(stored) if stored.owner == task.owner => {
                let created_at = stored.created_at;
                *stored = Task {
                    created_at,
                    ..task.clone()
                };
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> anyhow::Result<bool> {
        let mut tasks = self.tasks.lock().await;
        if tasks.get(&id).map(|t| t.owner) != Some(owner) {
            return Ok(false);
        }
        Ok(tasks.remove(&id).is_some())
    }
}
