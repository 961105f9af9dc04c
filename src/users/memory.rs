use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreError;
use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUser, User, UserChanges};

/// In-process `UserStore` with the same contract as the MySQL one.
/// `set_offline(true)` makes every call fail like an unreachable database.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryUserStore {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of store operations attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn email_taken(users: &[User], email: &str, except: Option<Uuid>) -> bool {
        users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id) != except)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        self.enter()?;
        let mut users = self.users.lock().unwrap();
        if Self::email_taken(&users, &new.email, None) {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn get_all_users(&self) -> Result<Vec<User>, StoreError> {
        self.enter()?;
        let mut all = self.users.lock().unwrap().clone();
        // Stable sort on a reversed insertion order keeps ties newest-first.
        all.reverse();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.enter()?;
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        self.enter()?;
        let mut users = self.users.lock().unwrap();
        if !users.iter().any(|u| u.id == id) {
            return Ok(None);
        }
        if let Some(email) = &changes.email {
            if Self::email_taken(&users, email, Some(id)) {
                return Err(StoreError::Conflict);
            }
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if changes.is_empty() {
            return Ok(Some(user.clone()));
        }
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        user.updated_at =
            OffsetDateTime::now_utc().max(user.updated_at + time::Duration::MICROSECOND);
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        self.enter()?;
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_the_same_record() {
        let store = MemoryUserStore::default();
        let created = store.create_user(new_user("A", "a@x.io")).await.unwrap();
        assert_eq!(store.get_user_by_id(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = MemoryUserStore::default();
        assert!(store.get_all_users().await.unwrap().is_empty());
        let a = store.create_user(new_user("A", "a@x.io")).await.unwrap();
        let b = store.create_user(new_user("B", "b@x.io")).await.unwrap();
        let c = store.create_user(new_user("C", "c@x.io")).await.unwrap();
        let ids: Vec<Uuid> = store
            .get_all_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let store = MemoryUserStore::default();
        let a = store.create_user(new_user("A", "a@x.io")).await.unwrap();
        let changes = UserChanges {
            name: Some("Alpha".into()),
            email: None,
        };
        let updated = store.update_user(a.id, changes).await.unwrap().unwrap();
        assert_eq!(updated.email, a.email);
        assert_eq!(updated.created_at, a.created_at);
        assert!(updated.updated_at > a.updated_at);

        let same = store
            .update_user(a.id, UserChanges::default())
            .await
            .unwrap();
        assert_eq!(same, Some(updated));
    }

    #[tokio::test]
    async fn offline_store_fails_then_recovers() {
        let store = MemoryUserStore::default();
        store.set_offline(true);
        assert!(matches!(
            store.get_all_users().await,
            Err(StoreError::Database(_))
        ));
        store.set_offline(false);
        assert!(store.get_all_users().await.is_ok());
        assert_eq!(store.calls(), 2);
    }
}
