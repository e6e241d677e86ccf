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
use tracing::{debug, info};
use utoipa::ToSchema;
use validator::Validate;

use super::categories::parse_status;
use super::common::{
    created_response, parse_body, parse_id, present, success_response, validate_input,
    MessageResponse, ALL_FIELDS_REQUIRED, REQUIRED_FIELDS_MISSING,
};
use crate::{
    entities::product::ProductView,
    errors::{ErrorResponse, ServiceError},
    repositories::{NewProduct, ProductChanges},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(max = 255))]
    #[schema(example = "Orange juice 1L")]
    pub product_name: Option<String>,
    #[validate(length(max = 255))]
    pub category_name: Option<String>,
    #[validate(length(max = 255))]
    pub subcategory_name: Option<String>,
    /// Accepted for compatibility; new products always start `Active`
    pub status: Option<String>,
    /// Base64 image payload; `imageBase64` is accepted as an alias
    #[serde(alias = "imageBase64")]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[validate(length(max = 255))]
    pub product_name: Option<String>,
    #[validate(length(max = 255))]
    pub category_name: Option<String>,
    #[validate(length(max = 255))]
    pub subcategory_name: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "imageBase64")]
    pub image: Option<String>,
}

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", put(update_product).delete(delete_product))
}

/// Create a product
#[utoipa::path(
    post,
    path = "/product",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductView),
        (status = 400, description = "Missing or invalid fields", body = ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let payload = parse_body(payload)?;
    validate_input(&payload)?;

    if let Some(status) = payload.status.as_deref() {
        debug!(requested = status, "Ignoring status on product create");
    }

    let (Some(product_name), Some(category_name), Some(subcategory_name), Some(image)) = (
        present(payload.product_name),
        present(payload.category_name),
        present(payload.subcategory_name),
        present(payload.image),
    ) else {
        return Err(ServiceError::ValidationError(ALL_FIELDS_REQUIRED.to_string()));
    };

    let created = state
        .products
        .create(NewProduct {
            product_name,
            category_name,
            subcategory_name,
            image_base64: Some(image),
        })
        .await?;

    let view = state
        .products
        .find_by_id(created.id)
        .await?
        .ok_or_else(|| ServiceError::InternalError("Product vanished after insert".into()))?;

    info!(id = view.id, "Product created");
    Ok(created_response(view))
}

/// List all products with their images
#[utoipa::path(
    get,
    path = "/product",
    responses(
        (status = 200, description = "All products in id order", body = [ProductView])
    ),
    tag = "Products"
)]
pub async fn list_products(State(state): State<AppState>) -> Result<Response, ServiceError> {
    Ok(success_response(state.products.get_all().await?))
}

/// Update a product
#[utoipa::path(
    put,
    path = "/product/{id}",
    params(("id" = i32, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ProductView),
        (status = 400, description = "Missing or invalid fields", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
    payload: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let id = parse_id(id)?;
    let payload = parse_body(payload)?;
    validate_input(&payload)?;

    let (Some(product_name), Some(category_name), Some(subcategory_name), Some(status)) = (
        present(payload.product_name),
        present(payload.category_name),
        present(payload.subcategory_name),
        present(payload.status),
    ) else {
        return Err(ServiceError::ValidationError(REQUIRED_FIELDS_MISSING.to_string()));
    };

    let changes = ProductChanges {
        product_name,
        category_name,
        subcategory_name,
        status: parse_status(&status)?,
        image_base64: present(payload.image),
    };

    state
        .products
        .update(id, changes)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Product not found.".to_string()))?;

    let view = state
        .products
        .find_by_id(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Product not found.".to_string()))?;

    info!(id, "Product updated");
    Ok(success_response(view))
}

/// Delete a product and its image
#[utoipa::path(
    delete,
    path = "/product/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product deleted", body = MessageResponse),
        (status = 404, description = "Product not found", body = ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Response, ServiceError> {
    let id = parse_id(id)?;

    if state.products.delete(id).await? == 0 {
        return Err(ServiceError::NotFound("Product not found.".to_string()));
    }

    Ok(success_response(MessageResponse::new(
        "Product deleted successfully.",
    )))
}
