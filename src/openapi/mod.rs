use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Catalog API",
        version = "0.1.0",
        description = r#"
# Catalog API

Users, categories, subcategories and products for a small storefront.

Catalog entities may carry an image sent as base64 text. The text is stored
verbatim and returned as `imageBase64` on every read.

## Authentication

`POST /user/login` returns a bearer token:

```
Authorization: Bearer <token>
```

`POST /user/logout` revokes only the token it is called with.

## Errors

Failures use one body shape:

```json
{
  "error": "Bad Request",
  "message": "All fields are required.",
  "request_id": "3f1c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

User routes answer their own outcomes with `{ "msg": "..." }`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Categories", description = "Category management"),
        (name = "Subcategories", description = "Subcategory management"),
        (name = "Products", description = "Product management"),
        (name = "Users", description = "Signup, sessions and password changes"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Catalog
        handlers::categories::create_category,
        handlers::categories::list_categories,
        handlers::categories::update_category,
        handlers::categories::delete_category,
        handlers::subcategories::create_subcategory,
        handlers::subcategories::list_subcategories,
        handlers::subcategories::update_subcategory,
        handlers::subcategories::delete_subcategory,
        handlers::products::create_product,
        handlers::products::list_products,
        handlers::products::update_product,
        handlers::products::delete_product,

        // Users
        handlers::users::signup,
        handlers::users::login,
        handlers::users::logout,
        handlers::users::check_email,
        handlers::users::update_password,
        handlers::mail::send_reset_mail,

        handlers::health::health_check
    ),
    components(
        schemas(
            crate::entities::CatalogStatus,
            crate::entities::category::CategoryView,
            crate::entities::subcategory::SubcategoryView,
            crate::entities::product::ProductView,
            handlers::categories::CreateCategoryRequest,
            handlers::categories::UpdateCategoryRequest,
            handlers::subcategories::CreateSubcategoryRequest,
            handlers::subcategories::UpdateSubcategoryRequest,
            handlers::products::CreateProductRequest,
            handlers::products::UpdateProductRequest,
            handlers::users::SignupRequest,
            handlers::users::LoginRequest,
            handlers::users::CheckEmailRequest,
            handlers::users::CheckEmailResponse,
            handlers::users::UpdatePasswordRequest,
            handlers::mail::SendMailRequest,
            handlers::common::MessageResponse,
            handlers::common::MsgResponse,
            handlers::health::HealthResponse,
            crate::auth::TokenResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
