/*!
 * # Authentication Module
 *
 * Session tokens for the catalog API:
 *
 * - argon2 password hashing and verification
 * - HS256 JWT issuance with a unique `jti` per login
 * - validation of signature, expiry, issuer, audience and revocation
 * - per-token logout through an in-memory revocation list
 *
 * `auth_middleware` rejects requests without a valid bearer token;
 * `optional_auth_middleware` only attaches the caller when one is present.
 */

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

// Entity modules
pub mod password_reset_token;
pub mod user;

/// Claim structure for session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // User id
    pub email: String, // User's email
    pub jti: String,   // Unique per issued token
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated caller extracted from a bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
    pub token_id: String,
    pub expires_at: i64,
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_audience: String,
        jwt_issuer: String,
        access_token_expiration: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            access_token_expiration,
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(config: &AppConfig) -> Self {
        Self::new(
            config.jwt_secret.clone(),
            config.auth_audience.clone(),
            config.auth_issuer.clone(),
            Duration::from_secs(config.jwt_expiration as u64),
        )
    }
}

/// Token blacklist entry
#[derive(Clone, Debug)]
struct BlacklistedToken {
    jti: String,
    expiry: DateTime<Utc>,
}

/// Issues, validates and revokes session tokens
#[derive(Debug, Clone)]
pub struct AuthService {
    config: AuthConfig,
    blacklisted_tokens: Arc<RwLock<Vec<BlacklistedToken>>>,
}

/// Body returned by a successful login
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Seconds until the token expires
    #[schema(example = 3600)]
    pub expires_in: i64,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            blacklisted_tokens: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Hashes a password into an argon2id PHC string.
    pub fn hash_password(password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Checks `password` against a stored PHC string.
    pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AuthError> {
        let parsed =
            PasswordHash::new(stored_hash).map_err(|e| AuthError::Hashing(e.to_string()))?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Hashing(e.to_string())),
        }
    }

    /// Generate a session token for a user
    pub fn generate_token(&self, user: &user::Model) -> Result<TokenResponse, AuthError> {
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(self.config.access_token_expiration)
            .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;
        let exp = now + ttl;

        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        debug!(user_id = user.id, jti = %claims.jti, "Issued session token");
        Ok(TokenResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: ttl.num_seconds(),
        })
    }

    /// Validate a token and extract the claims
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Revocation entries outlive `exp` by one second, so no leeway past it.
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        if self.is_token_blacklisted(&claims.jti).await {
            return Err(AuthError::RevokedToken);
        }

        Ok(claims)
    }

    /// Revoke the session an authenticated request arrived with
    pub async fn revoke_session(&self, user: &AuthUser) {
        self.revoke_jti(user.token_id.clone(), user.expires_at).await;
    }

    async fn revoke_jti(&self, jti: String, exp: i64) {
        let expiry = Utc
            .timestamp_opt(exp, 0)
            .single()
            .unwrap_or_else(Utc::now);

        let mut blacklist = self.blacklisted_tokens.write().await;
        blacklist.push(BlacklistedToken {
            jti: jti.clone(),
            expiry,
        });
        prune_revocations(&mut blacklist, Utc::now());
        info!(jti = %jti, "Session token revoked");
    }

    async fn is_token_blacklisted(&self, token_id: &str) -> bool {
        let blacklist = self.blacklisted_tokens.read().await;
        blacklist.iter().any(|t| t.jti == token_id)
    }

    async fn authenticate_headers(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
        let claims = self.validate_token(token).await?;
        let user_id = claims
            .sub
            .parse::<i32>()
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(AuthUser {
            user_id,
            email: claims.email,
            token_id: claims.jti,
            expires_at: claims.exp,
        })
    }
}

/// Returns the token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message) = match &self {
            Self::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING_TOKEN",
                "No authentication token provided",
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token",
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired",
            ),
            Self::RevokedToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REVOKED_TOKEN",
                "Authentication token has been revoked",
            ),
            Self::TokenCreation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                "Could not issue token",
            ),
            Self::Hashing(_) | Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                "Internal server error",
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "authentication failure");
        }

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Hashing(msg) => ServiceError::HashError(msg),
            AuthError::TokenCreation(msg) => ServiceError::JwtError(msg),
            AuthError::InternalError(msg) => ServiceError::InternalError(msg),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

fn auth_service_from(request: &Request) -> Option<Arc<AuthService>> {
    request.extensions().get::<Arc<AuthService>>().cloned()
}

/// Authentication middleware that rejects requests without a valid session
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(auth_service) = auth_service_from(&request) else {
        return AuthError::InternalError("Authentication service not available".to_string())
            .into_response();
    };

    match auth_service.authenticate_headers(request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            debug!(error = %e, "Rejected unauthenticated request");
            e.into_response()
        }
    }
}

/// Attaches the caller when a valid session is presented; never rejects
pub async fn optional_auth_middleware(mut request: Request, next: Next) -> Response {
    if let Some(auth_service) = auth_service_from(&request) {
        match auth_service.authenticate_headers(request.headers()).await {
            Ok(user) => {
                request.extensions_mut().insert(user);
            }
            Err(AuthError::MissingToken) => {}
            Err(e) => warn!(error = %e, "Ignoring invalid session on optional route"),
        }
    }
    next.run(request).await
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_optional_auth(self) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_optional_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(optional_auth_middleware))
    }
}

/// `exp` has whole-second resolution and a token still validates during the
/// second it names, so an entry stays until that second has fully passed.
fn prune_revocations(blacklist: &mut Vec<BlacklistedToken>, now: DateTime<Utc>) {
    blacklist.retain(|t| t.expiry + ChronoDuration::seconds(1) > now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::Extension, routing::get, Router};
    use tower::ServiceExt;

    const SECRET: &str =
        "Qm9vdHN0cmFwLXNlY3JldC1mb3ItdGVzdHMtb25seS1Yc2Z3cVpMdkJ0Tm1rUHJKZ0g";

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(
            SECRET.to_string(),
            "catalog-clients".to_string(),
            "catalog-api".to_string(),
            Duration::from_secs(3600),
        ))
    }

    fn user(id: i32, email: &str) -> user::Model {
        user::Model {
            id,
            email: email.to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = AuthService::hash_password("s3cret!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(AuthService::verify_password("s3cret!", &hash).unwrap());
        assert!(!AuthService::verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        assert!(matches!(
            AuthService::verify_password("x", "not-a-phc-string"),
            Err(AuthError::Hashing(_))
        ));
    }

    #[tokio::test]
    async fn issued_token_validates() {
        let auth = service();
        let issued = auth.generate_token(&user(7, "a@example.com")).unwrap();

        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, 3600);

        let claims = auth.validate_token(&issued.token).await.unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.email, "a@example.com");
    }

    #[tokio::test]
    async fn every_login_gets_a_distinct_jti() {
        let auth = service();
        let u = user(1, "b@example.com");
        let first = auth.generate_token(&u).unwrap();
        let second = auth.generate_token(&u).unwrap();

        let a = auth.validate_token(&first.token).await.unwrap();
        let b = auth.validate_token(&second.token).await.unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[tokio::test]
    async fn revoking_one_token_leaves_others_valid() {
        let auth = service();
        let u = user(1, "c@example.com");
        let first = auth.generate_token(&u).unwrap();
        let second = auth.generate_token(&u).unwrap();

        let claims = auth.validate_token(&first.token).await.unwrap();
        auth.revoke_session(&AuthUser {
            user_id: 1,
            email: claims.email,
            token_id: claims.jti,
            expires_at: claims.exp,
        })
        .await;

        assert!(matches!(
            auth.validate_token(&first.token).await,
            Err(AuthError::RevokedToken)
        ));
        assert!(auth.validate_token(&second.token).await.is_ok());
    }

    #[test]
    fn revocation_outlives_the_expiry_second() {
        let expiry = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut list = vec![BlacklistedToken {
            jti: "last-second".to_string(),
            expiry,
        }];

        prune_revocations(&mut list, expiry + ChronoDuration::milliseconds(999));
        assert_eq!(list.len(), 1);

        prune_revocations(&mut list, expiry + ChronoDuration::seconds(1));
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn token_revoked_in_its_final_second_stays_rejected() {
        let auth = AuthService::new(AuthConfig::new(
            SECRET.to_string(),
            "catalog-clients".to_string(),
            "catalog-api".to_string(),
            Duration::ZERO,
        ));
        let token = auth.generate_token(&user(5, "f@example.com")).unwrap().token;
        let Ok(claims) = auth.validate_token(&token).await else {
            return;
        };

        auth.revoke_session(&AuthUser {
            user_id: 5,
            email: claims.email,
            token_id: claims.jti,
            expires_at: claims.exp,
        })
        .await;

        assert!(auth.validate_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn foreign_secret_or_audience_is_rejected() {
        let auth = service();
        let other = AuthService::new(AuthConfig::new(
            SECRET.to_string(),
            "someone-else".to_string(),
            "catalog-api".to_string(),
            Duration::from_secs(3600),
        ));
        let token = other.generate_token(&user(1, "d@example.com")).unwrap().token;

        assert!(matches!(
            auth.validate_token(&token).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth.validate_token("garbage").await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    async fn whoami(Extension(user): Extension<AuthUser>) -> String {
        user.email
    }

    fn gated(auth: Arc<AuthService>) -> Router {
        Router::new()
            .route("/me", get(whoami))
            .with_auth()
            .layer(axum::middleware::from_fn(
                move |mut req: Request, next: Next| {
                    let auth = auth.clone();
                    async move {
                        req.extensions_mut().insert(auth);
                        next.run(req).await
                    }
                },
            ))
    }

    #[tokio::test]
    async fn middleware_requires_valid_bearer() {
        let auth = Arc::new(service());
        let token = auth.generate_token(&user(3, "e@example.com")).unwrap().token;

        let missing = gated(auth.clone())
            .oneshot(
                axum::http::Request::builder()
                    .uri("/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let ok = gated(auth.clone())
            .oneshot(
                axum::http::Request::builder()
                    .uri("/me")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }
}
