mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{response_json, TestApp, PIXEL_B64};

#[tokio::test]
async fn create_category_returns_stored_entity_with_image() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/category",
            Some(json!({ "categoryName": "Drinks", "sequence": "1", "image": PIXEL_B64 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    assert_eq!(body["categoryName"], "Drinks");
    assert_eq!(body["sequence"], "1");
    assert_eq!(body["status"], "Active");
    assert_eq!(body["imageBase64"], PIXEL_B64);

    let id = body["id"].as_i64().expect("numeric id");
    let file = app
        .image_root
        .path()
        .join("categories")
        .join(format!("{id}.txt"));
    assert_eq!(std::fs::read_to_string(file).unwrap(), PIXEL_B64);
}

#[tokio::test]
async fn listed_categories_carry_exact_image_content() {
    let app = TestApp::new().await;
    for (name, seq) in [("Drinks", json!("1")), ("Snacks", json!(2))] {
        let response = app
            .request(
                Method::POST,
                "/category",
                Some(json!({ "categoryName": name, "sequence": seq, "image": PIXEL_B64 })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app.request(Method::GET, "/category", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let list = response_json(response).await;
    let list = list.as_array().expect("array body");
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["categoryName"], "Drinks");
    assert_eq!(list[1]["sequence"], "2");
    assert!(list.iter().all(|c| c["imageBase64"] == PIXEL_B64));
}

#[tokio::test]
async fn create_without_required_fields_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/category",
            Some(json!({ "categoryName": "  ", "sequence": "1", "image": PIXEL_B64 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response_json(response).await["message"],
        "All fields are required."
    );

    let response = app
        .request(Method::GET, "/category", None, None)
        .await;
    assert_eq!(response_json(response).await, json!([]));
}

#[tokio::test]
async fn update_without_image_keeps_previous_image() {
    let app = TestApp::new().await;
    let created = response_json(
        app.request(
            Method::POST,
            "/subCategory",
            Some(json!({
                "subcategoryName": "Juice",
                "categoryName": "Drinks",
                "sequence": "3",
                "image": PIXEL_B64
            })),
            None,
        )
        .await,
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let response = app
        .request(
            Method::PUT,
            &format!("/subCategory/{id}"),
            Some(json!({
                "subcategoryName": "Fresh juice",
                "categoryName": "Drinks",
                "sequence": 4,
                "status": "Inactive"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = response_json(response).await;
    assert_eq!(updated["subcategoryName"], "Fresh juice");
    assert_eq!(updated["sequence"], "4");
    assert_eq!(updated["status"], "Inactive");
    assert_eq!(updated["image"], created["image"]);
    assert_eq!(updated["imageBase64"], PIXEL_B64);
}

#[tokio::test]
async fn update_rejects_unknown_status_and_missing_rows() {
    let app = TestApp::new().await;
    let created = response_json(
        app.request(
            Method::POST,
            "/category",
            Some(json!({ "categoryName": "Drinks", "sequence": "1", "image": PIXEL_B64 })),
            None,
        )
        .await,
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let response = app
        .request(
            Method::PUT,
            &format!("/category/{id}"),
            Some(json!({ "categoryName": "Drinks", "sequence": "1", "status": "Archived" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::PUT,
            "/category/9999",
            Some(json!({ "categoryName": "Drinks", "sequence": "1", "status": "Active" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response_json(response).await["message"], "Category not found.");

    let response = app
        .request(Method::DELETE, "/category/abc", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_removes_row_and_image_file() {
    let app = TestApp::new().await;
    let created = response_json(
        app.request(
            Method::POST,
            "/product",
            Some(json!({
                "productName": "Orange juice 1L",
                "categoryName": "Drinks",
                "subcategoryName": "Juice",
                "imageBase64": PIXEL_B64
            })),
            None,
        )
        .await,
    )
    .await;
    let id = created["id"].as_i64().unwrap();
    let file = app
        .image_root
        .path()
        .join("products")
        .join(format!("{id}.txt"));
    assert!(file.exists());

    let response = app
        .request(Method::DELETE, &format!("/product/{id}"), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response_json(response).await["message"],
        "Product deleted successfully."
    );
    assert!(!file.exists());

    let id = i32::try_from(id).unwrap();
    assert!(app.state.products.find_by_id(id).await.unwrap().is_none());

    let response = app
        .request(Method::DELETE, &format!("/product/{id}"), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn catalog_can_be_gated_behind_auth() {
    let app = TestApp::with_config(|cfg| cfg.require_auth_for_catalog = true).await;

    let response = app.request(Method::GET, "/category", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = app.signup_and_login("gate@example.com", "s3cret-pass").await;
    let response = app
        .request(Method::GET, "/category", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let id = response
        .headers()
        .get("x-request-id")
        .expect("request id header");
    assert!(!id.is_empty());

    let body = response_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["checks"]["database"], "up");
}
