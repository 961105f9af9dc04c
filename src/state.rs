use std::sync::Arc;

use sqlx::MySqlPool;

use crate::users::{MySqlUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    /// State backed by the process-wide MySQL pool.
    pub fn from_pool(db: MySqlPool) -> Self {
        Self::from_parts(Arc::new(MySqlUserStore::new(db)))
    }

    pub fn from_parts(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}
