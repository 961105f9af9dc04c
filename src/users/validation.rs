use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::users::repo_types::{NewUser, UserChanges};

/// First rule a request body broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: Option<&'static str>,
    pub message: String,
}

impl ValidationError {
    fn field(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field),
            message: message.into(),
        }
    }

    fn body(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn validate_create(body: &Value) -> Result<NewUser, ValidationError> {
    let fields = as_object(body)?;

    let name = match fields.get("name") {
        None | Some(Value::Null) => {
            return Err(ValidationError::field(
                "name",
                r#"field "name" is required and must be a string"#,
            ))
        }
        Some(v) => name_field(v)?,
    };

    let email = match fields.get("email") {
        None | Some(Value::Null) => {
            return Err(ValidationError::field(
                "email",
                r#"field "email" is required and must be a string"#,
            ))
        }
        Some(v) => email_field(v)?,
    };

    Ok(NewUser { name, email })
}

/// Absent keys are left alone; a key that is present (even as `null`)
/// must hold a valid value.
pub fn validate_update(body: &Value) -> Result<UserChanges, ValidationError> {
    let fields = as_object(body)?;

    let changes = UserChanges {
        name: fields.get("name").map(name_field).transpose()?,
        email: fields.get("email").map(email_field).transpose()?,
    };

    if changes.is_empty() {
        return Err(ValidationError::body(
            "at least one field to update must be provided (name or email)",
        ));
    }
    Ok(changes)
}

fn as_object(body: &Value) -> Result<&Map<String, Value>, ValidationError> {
    body.as_object()
        .ok_or_else(|| ValidationError::body("request body must be a JSON object"))
}

fn name_field(value: &Value) -> Result<String, ValidationError> {
    let name = value
        .as_str()
        .ok_or_else(|| ValidationError::field("name", r#"field "name" must be a string"#))?
        .trim();
    if name.is_empty() {
        return Err(ValidationError::field("name", r#"field "name" must not be empty"#));
    }
    Ok(name.to_string())
}

fn email_field(value: &Value) -> Result<String, ValidationError> {
    let email = value
        .as_str()
        .ok_or_else(|| ValidationError::field("email", r#"field "email" must be a string"#))?
        .trim()
        .to_lowercase();
    if !is_valid_email(&email) {
        return Err(ValidationError::field("email", "email format is not valid"));
    }
    Ok(email)
}
