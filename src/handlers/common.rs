use crate::errors::ServiceError;
use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

pub const ALL_FIELDS_REQUIRED: &str = "All fields are required.";
pub const REQUIRED_FIELDS_MISSING: &str = "Required fields are missing.";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// `{ "msg": ... }` body used by the user routes
pub fn msg_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(MsgResponse { msg: msg.into() })).into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(format!("Validation failed: {}", e)))
}

/// Turns a JSON extractor rejection into a 400 with the standard error body.
pub fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))
}

/// Numeric `{id}` path segment; anything else is a 400.
pub fn parse_id(path: Result<Path<i32>, PathRejection>) -> Result<i32, ServiceError> {
    path.map(|Path(id)| id)
        .map_err(|_| ServiceError::BadRequest("Invalid id.".to_string()))
}

/// A field counts as present when it is a non-blank string.
pub fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `sequence` arrives as either a JSON string or a JSON number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SequenceValue {
    Text(String),
    Number(serde_json::Number),
}

impl SequenceValue {
    /// The stored form; `None` for a blank string.
    pub fn into_present(self) -> Option<String> {
        match self {
            Self::Text(text) => present(Some(text)),
            Self::Number(number) => Some(number.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Category deleted successfully.")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MsgResponse {
    #[schema(example = "User registered successfully")]
    pub msg: String,
}
