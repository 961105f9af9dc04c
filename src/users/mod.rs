mod handlers;
#[cfg(test)]
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod validation;

use crate::state::AppState;
use axum::Router;

pub use repo::{MySqlUserStore, UserStore};

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
