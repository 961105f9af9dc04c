use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::StoreError;
use crate::users::repo_types::{NewUser, User, UserChanges, UserRow};

const USER_COLUMNS: &str = "id, name, email, created_at, updated_at";

/// Persistence for users. Every call is a single statement (plus a
/// re-read); uniqueness and atomicity are left to the database.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;
    async fn get_all_users(&self) -> Result<Vec<User>, StoreError>;
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn update_user(&self, id: Uuid, changes: UserChanges)
        -> Result<Option<User>, StoreError>;
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct MySqlUserStore {
    db: MySqlPool,
}

impl MySqlUserStore {
    pub fn new(db: MySqlPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for MySqlUserStore {
    #[instrument(skip(self, new))]
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, name, email) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(&new.name)
            .bind(&new.email)
            .execute(&self.db)
            .await
            .map_err(StoreError::from_sqlx)?;

        // Re-read so defaults come back exactly as the database stored them.
        self.get_user_by_id(id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("inserted user {id} not readable")))
    }

    #[instrument(skip(self))]
    async fn get_all_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.db)
        .await
        .map_err(StoreError::from_sqlx)?;
        rows.into_iter().map(User::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await
        .map_err(StoreError::from_sqlx)?;
        row.map(User::try_from).transpose()
    }

    #[instrument(skip(self, changes))]
    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        if changes.is_empty() {
            return self.get_user_by_id(id).await;
        }

        let mut qb = update_statement(id, &changes);
        let result = qb
            .build()
            .execute(&self.db)
            .await
            .map_err(StoreError::from_sqlx)?;
        debug!(rows = result.rows_affected(), "user updated");

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user_by_id(id).await
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.db)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }
}

/// `UPDATE` touching only the supplied columns plus `updated_at`.
fn update_statement(id: Uuid, changes: &UserChanges) -> QueryBuilder<'static, MySql> {
    let mut qb = QueryBuilder::<MySql>::new("UPDATE users SET ");
    let mut set = qb.separated(", ");
    if let Some(name) = &changes.name {
        set.push("name = ").push_bind_unseparated(name.clone());
    }
    if let Some(email) = &changes.email {
        set.push("email = ").push_bind_unseparated(email.clone());
    }
    set.push("updated_at = CURRENT_TIMESTAMP(6)");
    qb.push(" WHERE id = ").push_bind(id.to_string());
    qb
}
