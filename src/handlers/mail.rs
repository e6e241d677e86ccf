use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Response,
    routing::post,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use super::common::{msg_response, parse_body, present, MsgResponse};
use crate::{
    auth::password_reset_token,
    errors::{ErrorResponse, ServiceError},
    notifications::password_reset_message,
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMailRequest {
    #[schema(example = "jane@example.com")]
    pub email: Option<String>,
}

pub fn mail_routes() -> Router<AppState> {
    Router::new().route("/send-mail", post(send_reset_mail))
}

/// Email a single-use password reset link
#[utoipa::path(
    post,
    path = "/send-mail",
    request_body = SendMailRequest,
    responses(
        (status = 200, description = "Reset email handed to the relay", body = MsgResponse),
        (status = 400, description = "Missing email", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = MsgResponse),
        (status = 502, description = "Mail relay failed", body = ErrorResponse)
    ),
    tag = "Users"
)]
#[instrument(skip_all)]
pub async fn send_reset_mail(
    State(state): State<AppState>,
    payload: Result<Json<SendMailRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let payload = parse_body(payload)?;
    let Some(email) = present(payload.email) else {
        return Err(ServiceError::ValidationError("Email is required.".to_string()));
    };

    if state.users.find_by_email(&email).await?.is_none() {
        return Ok(msg_response(StatusCode::NOT_FOUND, "User not found"));
    }

    let mail_config = &state.config.mail;
    let (token, token_hash) = password_reset_token::generate_token();
    let ttl = Duration::seconds(mail_config.reset_token_ttl_secs as i64);
    let issued = state
        .users
        .create_reset_token(&email, token_hash, Utc::now() + ttl)
        .await?;

    let message = password_reset_message(mail_config, &email, &token)?;
    if let Err(e) = state.mailer.send(message).await {
        error!(token_id = issued.id, error = %e, "Password reset email failed");
        return Err(e.into());
    }

    info!(token_id = issued.id, "Password reset email sent");
    Ok(msg_response(
        StatusCode::OK,
        "Reset password email sent successfully!",
    ))
}
