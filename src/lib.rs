//! Catalog API Library
//!
//! Users, categories, subcategories and products behind an axum router, with
//! catalog images kept as base64 text files next to the relational rows.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod image_store;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod repositories;
pub mod tracing;

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware::Next,
    routing::get,
    Router,
};
use http::HeaderValue;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};

use crate::auth::{AuthConfig, AuthRouterExt, AuthService};
use crate::config::{AppConfig, AppConfigError};
use crate::errors::ServiceError;
use crate::image_store::ImageStore;
use crate::notifications::Mailer;
use crate::repositories::{
    CategoryRepository, ProductRepository, SubcategoryRepository, UserRepository,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub categories: CategoryRepository,
    pub subcategories: SubcategoryRepository,
    pub products: ProductRepository,
    pub users: UserRepository,
    pub auth: Arc<AuthService>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Wires repositories, image directories and the auth service from configuration.
    pub async fn new(
        config: AppConfig,
        db: Arc<DatabaseConnection>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, ServiceError> {
        let images = &config.images;
        let categories =
            CategoryRepository::new(db.clone(), ImageStore::new(&images.category_dir).await?);
        let subcategories = SubcategoryRepository::new(
            db.clone(),
            ImageStore::new(&images.subcategory_dir).await?,
        );
        let products =
            ProductRepository::new(db.clone(), ImageStore::new(&images.product_dir).await?);

        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));

        Ok(Self {
            users: UserRepository::new(db.clone()),
            db,
            config: Arc::new(config),
            categories,
            subcategories,
            products,
            auth,
            mailer,
        })
    }
}

/// Full HTTP surface: catalog, users, mail, health and the OpenAPI UI.
pub fn build_router(state: AppState) -> Router {
    let mut catalog = Router::new()
        .nest("/category", handlers::categories::category_routes())
        .nest("/subCategory", handlers::subcategories::subcategory_routes())
        .nest("/product", handlers::products::product_routes());
    if state.config.require_auth_for_catalog {
        ::tracing::info!("Catalog routes require a bearer token");
        catalog = catalog.with_auth();
    }

    let auth_service = state.auth.clone();
    let max_body_size = state.config.max_body_size;

    Router::new()
        .route("/", get(|| async { "catalog-api up" }))
        .route("/health", get(handlers::health::health_check))
        .merge(catalog)
        .nest("/user", handlers::users::user_routes())
        .merge(handlers::mail::mail_routes())
        .merge(openapi::swagger_ui())
        .layer(DefaultBodyLimit::max(max_body_size))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |State(auth): State<Arc<AuthService>>,
             mut req: axum::extract::Request,
             next: Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

/// CORS from configuration: an explicit origin list, or permissive when allowed.
pub fn cors_layer(cfg: &AppConfig) -> Result<CorsLayer, AppConfigError> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        let layer = CorsLayer::new().allow_origin(origins);
        // Credentials cannot be combined with wildcard methods or headers.
        return Ok(if cfg.cors_allow_credentials {
            layer
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
                .allow_credentials(true)
        } else {
            layer.allow_methods(Any).allow_headers(Any)
        });
    }

    if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        return Ok(CorsLayer::permissive());
    }

    let mut errors = validator::ValidationErrors::new();
    errors.add("cors_allowed_origins", crate::config::cors_origins_required());
    Err(AppConfigError::Validation(errors))
}
