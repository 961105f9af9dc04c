use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, StoreError},
    state::AppState,
    users::{
        repo_types::User,
        validation::{validate_create, validate_update, ValidationError},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(body) = payload.map_err(rejected_body)?;
    let new = validate_create(&body).map_err(invalid)?;

    match state.users.create_user(new).await {
        Ok(user) => {
            info!(user_id = %user.id, email = %user.email, "user created");
            Ok((StatusCode::CREATED, Json(user)))
        }
        Err(StoreError::Conflict) => Err(email_taken()),
        Err(e) => Err(internal("create_user", None, e, "failed to create user")),
    }
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .users
        .get_all_users()
        .await
        .map_err(|e| internal("list_users", None, e, "failed to list users"))?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(users)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<User>, ApiError> {
    let Path(raw_id) = path.map_err(rejected_path)?;
    let id = parse_id(&raw_id)?;
    match state.users.get_user_by_id(id).await {
        Ok(Some(user)) => Ok(Json(user)),
        Ok(None) => Err(not_found(&raw_id)),
        Err(e) => Err(internal("get_user", Some(id), e, "failed to get user")),
    }
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Path(raw_id) = path.map_err(rejected_path)?;
    let Json(body) = payload.map_err(rejected_body)?;
    let changes = validate_update(&body).map_err(invalid)?;
    let id = parse_id(&raw_id)?;

    match state.users.update_user(id, changes).await {
        Ok(Some(user)) => {
            info!(user_id = %user.id, "user updated");
            Ok(Json(user))
        }
        Ok(None) => Err(not_found(&raw_id)),
        Err(StoreError::Conflict) => Err(email_taken()),
        Err(e) => Err(internal("update_user", Some(id), e, "failed to update user")),
    }
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(raw_id) = path.map_err(rejected_path)?;
    let id = parse_id(&raw_id)?;
    match state.users.delete_user(id).await {
        Ok(true) => {
            info!(user_id = %id, "user deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(not_found(&raw_id)),
        Err(e) => Err(internal("delete_user", Some(id), e, "failed to delete user")),
    }
}

/// Anything that is not a UUID can never name a stored user.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| not_found(raw))
}

fn not_found(raw_id: &str) -> ApiError {
    ApiError::NotFound(format!("user with id {raw_id} not found"))
}

fn email_taken() -> ApiError {
    warn!("email already registered");
    ApiError::Conflict("a user with that email already exists".into())
}

fn invalid(e: ValidationError) -> ApiError {
    warn!(field = ?e.field, reason = %e.message, "validation failed");
    ApiError::Validation(e.message)
}

fn rejected_body(e: JsonRejection) -> ApiError {
    warn!(error = %e, "unreadable request body");
    ApiError::Validation(e.body_text())
}

fn rejected_path(e: PathRejection) -> ApiError {
    warn!(error = %e, "unreadable path parameter");
    ApiError::Validation(e.body_text())
}

fn internal(op: &'static str, id: Option<Uuid>, e: StoreError, message: &str) -> ApiError {
    match id {
        Some(id) => error!(operation = op, user_id = %id, error = %e, "store call failed"),
        None => error!(operation = op, error = %e, "store call failed"),
    }
    ApiError::Internal(message.into())
}
