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

use super::categories::parse_status;
use super::common::{
    created_response, parse_body, parse_id, present, success_response, validate_input,
    MessageResponse, SequenceValue, ALL_FIELDS_REQUIRED, REQUIRED_FIELDS_MISSING,
};
use crate::{
    entities::subcategory::SubcategoryView,
    errors::{ErrorResponse, ServiceError},
    repositories::{NewSubcategory, SubcategoryChanges},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubcategoryRequest {
    #[validate(length(max = 255))]
    #[schema(example = "Juices")]
    pub subcategory_name: Option<String>,
    /// Name of the parent category; not checked against existing categories
    #[validate(length(max = 255))]
    #[schema(example = "Drinks")]
    pub category_name: Option<String>,
    #[schema(value_type = Option<String>, example = "1")]
    pub sequence: Option<SequenceValue>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubcategoryRequest {
    #[validate(length(max = 255))]
    pub subcategory_name: Option<String>,
    #[validate(length(max = 255))]
    pub category_name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub sequence: Option<SequenceValue>,
    #[schema(example = "Active")]
    pub status: Option<String>,
    pub image: Option<String>,
}

pub fn subcategory_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subcategories).post(create_subcategory))
        .route("/:id", put(update_subcategory).delete(delete_subcategory))
}

/// Create a subcategory
#[utoipa::path(
    post,
    path = "/subCategory",
    request_body = CreateSubcategoryRequest,
    responses(
        (status = 201, description = "Subcategory created", body = SubcategoryView),
        (status = 400, description = "Missing or invalid fields", body = ErrorResponse)
    ),
    tag = "Subcategories"
)]
pub async fn create_subcategory(
    State(state): State<AppState>,
    payload: Result<Json<CreateSubcategoryRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let payload = parse_body(payload)?;
    validate_input(&payload)?;

    let (Some(subcategory_name), Some(category_name), Some(sequence), Some(image)) = (
        present(payload.subcategory_name),
        present(payload.category_name),
        payload.sequence.and_then(SequenceValue::into_present),
        present(payload.image),
    ) else {
        return Err(ServiceError::ValidationError(ALL_FIELDS_REQUIRED.to_string()));
    };

    let created = state
        .subcategories
        .create(NewSubcategory {
            subcategory_name,
            category_name,
            sequence,
            image_base64: Some(image),
        })
        .await?;

    let view = state
        .subcategories
        .find_by_id(created.id)
        .await?
        .ok_or_else(|| ServiceError::InternalError("Subcategory vanished after insert".into()))?;

    info!(id = view.id, "Subcategory created");
    Ok(created_response(view))
}

/// List all subcategories with their images
#[utoipa::path(
    get,
    path = "/subCategory",
    responses(
        (status = 200, description = "All subcategories in id order", body = [SubcategoryView])
    ),
    tag = "Subcategories"
)]
pub async fn list_subcategories(
    State(state): State<AppState>,
) -> Result<Response, ServiceError> {
    Ok(success_response(state.subcategories.get_all().await?))
}

/// Update a subcategory
#[utoipa::path(
    put,
    path = "/subCategory/{id}",
    params(("id" = i32, Path, description = "Subcategory id")),
    request_body = UpdateSubcategoryRequest,
    responses(
        (status = 200, description = "Subcategory updated", body = SubcategoryView),
        (status = 400, description = "Missing or invalid fields", body = ErrorResponse),
        (status = 404, description = "Subcategory not found", body = ErrorResponse)
    ),
    tag = "Subcategories"
)]
pub async fn update_subcategory(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
    payload: Result<Json<UpdateSubcategoryRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let id = parse_id(id)?;
    let payload = parse_body(payload)?;
    validate_input(&payload)?;

    let (Some(subcategory_name), Some(category_name), Some(sequence), Some(status)) = (
        present(payload.subcategory_name),
        present(payload.category_name),
        payload.sequence.and_then(SequenceValue::into_present),
        present(payload.status),
    ) else {
        return Err(ServiceError::ValidationError(REQUIRED_FIELDS_MISSING.to_string()));
    };

    let changes = SubcategoryChanges {
        subcategory_name,
        category_name,
        sequence,
        status: parse_status(&status)?,
        image_base64: present(payload.image),
    };

    state
        .subcategories
        .update(id, changes)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Subcategory not found.".to_string()))?;

    let view = state
        .subcategories
        .find_by_id(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Subcategory not found.".to_string()))?;

    info!(id, "Subcategory updated");
    Ok(success_response(view))
}

/// Delete a subcategory and its image
#[utoipa::path(
    delete,
    path = "/subCategory/{id}",
    params(("id" = i32, Path, description = "Subcategory id")),
    responses(
        (status = 200, description = "Subcategory deleted", body = MessageResponse),
        (status = 404, description = "Subcategory not found", body = ErrorResponse)
    ),
    tag = "Subcategories"
)]
pub async fn delete_subcategory(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Response, ServiceError> {
    let id = parse_id(id)?;

    if state.subcategories.delete(id).await? == 0 {
        return Err(ServiceError::NotFound("Subcategory not found.".to_string()));
    }

    Ok(success_response(MessageResponse::new(
        "Subcategory deleted successfully.",
    )))
}
