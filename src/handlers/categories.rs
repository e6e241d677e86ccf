use std::str::FromStr;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    response::Response,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use super::common::{
    created_response, parse_body, parse_id, present, success_response, validate_input,
    MessageResponse, SequenceValue, ALL_FIELDS_REQUIRED, REQUIRED_FIELDS_MISSING,
};
use crate::{
    entities::{category::CategoryView, CatalogStatus},
    errors::{ErrorResponse, ServiceError},
    repositories::{CategoryChanges, NewCategory},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    #[validate(length(max = 255))]
    #[schema(example = "Drinks")]
    pub category_name: Option<String>,
    #[schema(value_type = Option<String>, example = "1")]
    pub sequence: Option<SequenceValue>,
    /// Base64 image payload, stored verbatim
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    #[validate(length(max = 255))]
    pub category_name: Option<String>,
    #[schema(value_type = Option<String>, example = "2")]
    pub sequence: Option<SequenceValue>,
    #[schema(example = "Inactive")]
    pub status: Option<String>,
    /// Replaces the stored image when present
    pub image: Option<String>,
}

pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", put(update_category).delete(delete_category))
}

/// `Active` or `Inactive`, case-insensitive.
pub(crate) fn parse_status(raw: &str) -> Result<CatalogStatus, ServiceError> {
    CatalogStatus::from_str(raw.trim()).map_err(|_| {
        ServiceError::ValidationError("Status must be Active or Inactive.".to_string())
    })
}

/// Create a category
#[utoipa::path(
    post,
    path = "/category",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryView),
        (status = 400, description = "Missing or invalid fields", body = ErrorResponse)
    ),
    tag = "Categories"
)]
pub async fn create_category(
    State(state): State<AppState>,
    payload: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let payload = parse_body(payload)?;
    validate_input(&payload)?;

    let (Some(category_name), Some(sequence), Some(image)) = (
        present(payload.category_name),
        payload.sequence.and_then(SequenceValue::into_present),
        present(payload.image),
    ) else {
        return Err(ServiceError::ValidationError(ALL_FIELDS_REQUIRED.to_string()));
    };

    let created = state
        .categories
        .create(NewCategory {
            category_name,
            sequence,
            image_base64: Some(image),
        })
        .await?;

    let view = state
        .categories
        .find_by_id(created.id)
        .await?
        .ok_or_else(|| ServiceError::InternalError("Category vanished after insert".into()))?;

    info!(id = view.id, "Category created");
    Ok(created_response(view))
}

/// List all categories with their images
#[utoipa::path(
    get,
    path = "/category",
    responses(
        (status = 200, description = "All categories in id order", body = [CategoryView])
    ),
    tag = "Categories"
)]
pub async fn list_categories(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let categories = state.categories.get_all().await?;
    Ok(success_response(categories))
}

/// Update a category
#[utoipa::path(
    put,
    path = "/category/{id}",
    params(("id" = i32, Path, description = "Category id")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = CategoryView),
        (status = 400, description = "Missing or invalid fields", body = ErrorResponse),
        (status = 404, description = "Category not found", body = ErrorResponse)
    ),
    tag = "Categories"
)]
pub async fn update_category(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
    payload: Result<Json<UpdateCategoryRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let id = parse_id(id)?;
    let payload = parse_body(payload)?;
    validate_input(&payload)?;

    let (Some(category_name), Some(sequence), Some(status)) = (
        present(payload.category_name),
        payload.sequence.and_then(SequenceValue::into_present),
        present(payload.status),
    ) else {
        return Err(ServiceError::ValidationError(REQUIRED_FIELDS_MISSING.to_string()));
    };

    let changes = CategoryChanges {
        category_name,
        sequence,
        status: parse_status(&status)?,
        image_base64: present(payload.image),
    };

    state
        .categories
        .update(id, changes)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Category not found.".to_string()))?;

    let view = state
        .categories
        .find_by_id(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Category not found.".to_string()))?;

    info!(id, "Category updated");
    Ok(success_response(view))
}

/// Delete a category and its image
#[utoipa::path(
    delete,
    path = "/category/{id}",
    params(("id" = i32, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category deleted", body = MessageResponse),
        (status = 404, description = "Category not found", body = ErrorResponse)
    ),
    tag = "Categories"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Response, ServiceError> {
    let id = parse_id(id)?;

    if state.categories.delete(id).await? == 0 {
        return Err(ServiceError::NotFound("Category not found.".to_string()));
    }

    Ok(success_response(MessageResponse::new(
        "Category deleted successfully.",
    )))
}
