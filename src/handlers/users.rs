use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use super::common::{
    msg_response, parse_body, present, success_response, validate_input, MsgResponse,
};
use crate::{
    auth::{password_reset_token, user, AuthRouterExt, AuthService, AuthUser, TokenResponse},
    errors::{ErrorResponse, ServiceError},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(email)]
    #[schema(example = "jane@example.com")]
    pub email: Option<String>,
    pub password: Option<String>,
    /// Password confirmation; must equal `password`
    pub reset_password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "jane@example.com")]
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckEmailRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckEmailResponse {
    pub msg: String,
    pub user_exists: bool,
}

/// New password plus one proof of identity: a session for the same email,
/// the current password, or a reset token from `/send-mail`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub email: Option<String>,
    pub new_password: Option<String>,
    pub current_password: Option<String>,
    pub reset_token: Option<String>,
}

pub fn user_routes() -> Router<AppState> {
    let gated = Router::new().route("/logout", post(logout)).with_auth();
    let recognised = Router::new()
        .route("/update-password", post(update_password))
        .with_optional_auth();

    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/checkEmail", post(check_email))
        .merge(gated)
        .merge(recognised)
}

async fn hash_password(password: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || AuthService::hash_password(&password))
        .await
        .map_err(|e| ServiceError::InternalError(e.to_string()))?
        .map_err(ServiceError::from)
}

async fn verify_password(password: String, stored_hash: String) -> Result<bool, ServiceError> {
    tokio::task::spawn_blocking(move || AuthService::verify_password(&password, &stored_hash))
        .await
        .map_err(|e| ServiceError::InternalError(e.to_string()))?
        .map_err(ServiceError::from)
}

/// Proof of identity accepted for a password change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordChange {
    /// A session for the same account, or the current password.
    Reauthenticated,
    /// Hash of a usable reset token; consumed when the new password is written.
    ResetToken(String),
}

/// Checks the caller's proof of identity without writing anything.
/// `None` means the change must be refused.
pub async fn authorize_password_change(
    state: &AppState,
    user: &user::Model,
    session: Option<&AuthUser>,
    current_password: Option<String>,
    reset_token: Option<String>,
) -> Result<Option<PasswordChange>, ServiceError> {
    if session.is_some_and(|auth| auth.user_id == user.id && auth.email == user.email) {
        return Ok(Some(PasswordChange::Reauthenticated));
    }

    if let Some(current) = present(current_password) {
        if verify_password(current, user.password_hash.clone()).await? {
            return Ok(Some(PasswordChange::Reauthenticated));
        }
    }

    if let Some(token) = present(reset_token) {
        let token_hash = password_reset_token::hash_token(&token);
        if state
            .users
            .has_usable_reset_token(&user.email, &token_hash)
            .await?
        {
            return Ok(Some(PasswordChange::ResetToken(token_hash)));
        }
    }

    Ok(None)
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/user/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Registered, or the email was already registered", body = MsgResponse),
        (status = 400, description = "Missing fields, mismatched confirmation or duplicate email", body = MsgResponse)
    ),
    tag = "Users"
)]
#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let payload = parse_body(payload)?;
    validate_input(&payload)?;

    let (Some(email), Some(password), Some(confirmation)) = (
        present(payload.email),
        present(payload.password),
        present(payload.reset_password),
    ) else {
        return Err(ServiceError::ValidationError(
            "Email, password and resetPassword are required.".to_string(),
        ));
    };

    if state.users.find_by_email(&email).await?.is_some() {
        return Ok(msg_response(StatusCode::OK, "Email already registered"));
    }

    if password != confirmation {
        return Ok(msg_response(StatusCode::BAD_REQUEST, "Password does not match"));
    }

    let password_hash = hash_password(password).await?;
    register_user(&state, &email, password_hash).await
}

/// Inserts the account; an email taken since the existence check is a 400.
pub async fn register_user(
    state: &AppState,
    email: &str,
    password_hash: String,
) -> Result<Response, ServiceError> {
    match state.users.create(email, password_hash).await {
        Ok(user) => {
            info!(user_id = user.id, "Signup complete");
            Ok(msg_response(StatusCode::OK, "User registered successfully"))
        }
        Err(e) if e.is_unique_violation() => {
            warn!("Signup lost a race on a duplicate email");
            Ok(msg_response(StatusCode::BAD_REQUEST, "Email already exists"))
        }
        Err(e) => Err(e),
    }
}

/// Exchange credentials for a session token
#[utoipa::path(
    post,
    path = "/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session token", body = TokenResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "Wrong password", body = MsgResponse),
        (status = 404, description = "Unknown email", body = MsgResponse)
    ),
    tag = "Users"
)]
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let payload = parse_body(payload)?;
    let (Some(email), Some(password)) = (present(payload.email), present(payload.password))
    else {
        return Err(ServiceError::ValidationError(
            "Email and password are required.".to_string(),
        ));
    };

    let Some(user) = state.users.find_by_email(&email).await? else {
        return Ok(msg_response(StatusCode::NOT_FOUND, "User not found"));
    };

    if !verify_password(password, user.password_hash.clone()).await? {
        warn!(user_id = user.id, "Login rejected: wrong password");
        return Ok(msg_response(StatusCode::UNAUTHORIZED, "Invalid credentials"));
    }

    let token = state.auth.generate_token(&user)?;
    info!(user_id = user.id, "Login successful");
    Ok(success_response(token))
}

/// Revoke the presented session token
#[utoipa::path(
    post,
    path = "/user/logout",
    responses(
        (status = 200, description = "Token revoked", body = MsgResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    state.auth.revoke_session(&user).await;
    info!(user_id = user.user_id, "Logout");
    msg_response(StatusCode::OK, "Logout successful. Token revoked.")
}

/// Report whether an email is registered
#[utoipa::path(
    post,
    path = "/user/checkEmail",
    request_body = CheckEmailRequest,
    responses(
        (status = 200, description = "Email is registered", body = CheckEmailResponse),
        (status = 404, description = "Email is not registered", body = CheckEmailResponse),
        (status = 400, description = "Missing email", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn check_email(
    State(state): State<AppState>,
    payload: Result<Json<CheckEmailRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let payload = parse_body(payload)?;
    let Some(email) = present(payload.email) else {
        return Err(ServiceError::ValidationError("Email is required.".to_string()));
    };

    let exists = state.users.find_by_email(&email).await?.is_some();
    let (status, body) = if exists {
        (
            StatusCode::OK,
            CheckEmailResponse {
                msg: "User exists".to_string(),
                user_exists: true,
            },
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            CheckEmailResponse {
                msg: "User does not exist".to_string(),
                user_exists: false,
            },
        )
    };
    Ok((status, Json(body)).into_response())
}

/// Set a new password after re-authentication
#[utoipa::path(
    post,
    path = "/user/update-password",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MsgResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "No valid proof of identity", body = MsgResponse),
        (status = 404, description = "Unknown email", body = MsgResponse)
    ),
    security((), ("bearer_auth" = [])),
    tag = "Users"
)]
#[instrument(skip_all)]
pub async fn update_password(
    State(state): State<AppState>,
    session: Option<Extension<AuthUser>>,
    payload: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let payload = parse_body(payload)?;
    let (Some(email), Some(new_password)) =
        (present(payload.email), present(payload.new_password))
    else {
        return Err(ServiceError::ValidationError(
            "Email and newPassword are required.".to_string(),
        ));
    };

    let Some(user) = state.users.find_by_email(&email).await? else {
        return Ok(msg_response(StatusCode::NOT_FOUND, "User not found"));
    };

    let session = session.as_ref().map(|Extension(auth)| auth);
    let change = authorize_password_change(
        &state,
        &user,
        session,
        payload.current_password,
        payload.reset_token,
    )
    .await?;
    let Some(change) = change else {
        warn!(user_id = user.id, "Password update rejected: not re-authenticated");
        return Ok(msg_response(StatusCode::UNAUTHORIZED, "Re-authentication required"));
    };

    let new_hash = hash_password(new_password).await?;
    let updated = match change {
        PasswordChange::Reauthenticated => {
            state.users.update_password(&email, new_hash).await? > 0
        }
        PasswordChange::ResetToken(token_hash) => {
            state
                .users
                .reset_password_with_token(&email, &token_hash, new_hash)
                .await?
        }
    };

    if !updated {
        warn!(user_id = user.id, "Password update rejected: reset token already consumed");
        return Ok(msg_response(StatusCode::UNAUTHORIZED, "Re-authentication required"));
    }

    info!(user_id = user.id, "Password updated");
    Ok(msg_response(StatusCode::OK, "Password updated successfully"))
}
