mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::services::{
    orders::{FinalizeOrder, PaymentReference},
    payments::OrderedProduct,
};
use uuid::Uuid;

fn address(street: &str, is_default: bool) -> serde_json::Value {
    json!({
        "type": "home",
        "street": street,
        "city": "Springfield",
        "state": "IL",
        "zip_code": "62704",
        "country": "US",
        "is_default": is_default
    })
}

#[tokio::test]
async fn health_reports_database() {
    let app = TestApp::new().await;
    for uri in ["/health", "/api/v1/health"] {
        let response = app.request(Method::GET, uri, None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["data"]["status"], "healthy");
        assert_eq!(body["data"]["checks"]["database"], "healthy");
    }
}

#[tokio::test]
async fn cart_add_update_and_clear() {
    let app = TestApp::new().await;
    let mug = app.seed_product("Mug", dec!(12.50), "kitchen").await;
    let plate = app.seed_product("Plate", dec!(8.00), "kitchen").await;

    for _ in 0..2 {
        let response = app
            .request_authenticated(
                Method::POST,
                "/api/v1/cart",
                Some(json!({ "product_id": mug.id })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    app.request_authenticated(
        Method::POST,
        "/api/v1/cart",
        Some(json!({ "product_id": plate.id, "quantity": 3 })),
    )
    .await;

    let body = response_json(
        app.request_authenticated(Method::GET, "/api/v1/cart", None)
            .await,
    )
    .await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let mug_line = items.iter().find(|i| i["product_id"] == json!(mug.id)).unwrap();
    assert_eq!(mug_line["quantity"], 2);

    let body = response_json(
        app.request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/{}", mug.id),
            Some(json!({ "quantity": 0 })),
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let body = response_json(
        app.request_authenticated(
            Method::DELETE,
            "/api/v1/cart",
            Some(json!({ "product_id": plate.id })),
        )
        .await,
    )
    .await;
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cart_rejects_unknown_product_and_anonymous_callers() {
    let app = TestApp::new().await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "product_id": Uuid::new_v4() })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.request(Method::GET, "/api/v1/cart", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wishlist_add_check_and_remove() {
    let app = TestApp::new().await;
    let vase = app.seed_product("Vase", dec!(22.00), "home").await;
    let uri = format!("/api/v1/wishlist/{}", vase.id);

    let response = app.request_authenticated(Method::POST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request_authenticated(Method::POST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(
        app.request_authenticated(
            Method::GET,
            &format!("/api/v1/wishlist/check/{}", vase.id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["in_wishlist"], true);

    let body = response_json(
        app.request_authenticated(Method::GET, "/api/v1/wishlist", None)
            .await,
    )
    .await;
    assert_eq!(body["data"][0]["product"]["name"], "Vase");

    let response = app.request_authenticated(Method::DELETE, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(
        app.request_authenticated(
            Method::GET,
            &format!("/api/v1/wishlist/check/{}", vase.id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(body["data"]["in_wishlist"], false);
}

#[tokio::test]
async fn addresses_keep_a_single_default() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/addresses",
            Some(address("1 Main St", true)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let first = response_json(response).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/addresses",
            Some(address("2 Oak Ave", true)),
        )
        .await;
    let second = response_json(response).await;

    let body = response_json(
        app.request_authenticated(Method::GET, "/api/v1/addresses", None)
            .await,
    )
    .await;
    let defaults: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["is_default"] == true)
        .collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0]["id"], second["data"]["id"]);

    let first_id = first["data"]["id"].as_str().unwrap();
    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/addresses/{}/default", first_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/addresses/{}", first_id),
            Some(json!({ "city": "Shelbyville", "street": "" })),
        )
        .await;
    let updated = response_json(response).await;
    assert_eq!(updated["data"]["city"], "Shelbyville");
    assert_eq!(updated["data"]["street"], "1 Main St");
    assert_eq!(updated["data"]["is_default"], true);

    // Not visible to anybody else
    let other = app.token_for(Uuid::new_v4());
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/addresses/{}", first_id),
            None,
            Some(&other),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_filters_by_text_and_category() {
    let app = TestApp::new().await;
    app.seed_product("Blue Denim Jacket", dec!(89.00), "outerwear").await;
    app.seed_product("Rain Jacket", dec!(59.00), "outerwear").await;
    app.seed_product("Denim Shorts", dec!(35.00), "bottoms").await;

    let body = response_json(
        app.request(Method::GET, "/api/v1/search?q=denim", None, None)
            .await,
    )
    .await;
    assert_eq!(body["data"]["pagination"]["total_products"], 2);

    let body = response_json(
        app.request(
            Method::GET,
            "/api/v1/search?q=jacket&category=outerwear&sort_by=price&sort_order=asc",
            None,
            None,
        )
        .await,
    )
    .await;
    let products = body["data"]["products"].as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0]["name"], "Rain Jacket");

    let categories = body["data"]["filters"]["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 2);

    // LIKE wildcards are matched literally
    let body = response_json(
        app.request(Method::GET, "/api/v1/search?q=%25", None, None)
            .await,
    )
    .await;
    assert_eq!(body["data"]["pagination"]["total_products"], 0);
}

#[tokio::test]
async fn suggestions_and_category_listing() {
    let app = TestApp::new().await;
    app.seed_product("Denim Jacket", dec!(89.00), "denim").await;
    app.seed_product("Denim Shorts", dec!(35.00), "bottoms").await;

    let body = response_json(
        app.request(Method::GET, "/api/v1/search/suggestions?q=den", None, None)
            .await,
    )
    .await;
    let suggestions = body["data"].as_array().unwrap();
    assert!(suggestions
        .iter()
        .any(|s| s["type"] == "category" && s["value"] == "denim"));
    assert!(suggestions
        .iter()
        .any(|s| s["type"] == "product" && s["value"] == "Denim Shorts"));

    let body = response_json(
        app.request(Method::GET, "/api/v1/search/category/bottoms", None, None)
            .await,
    )
    .await;
    assert_eq!(body["data"]["products"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn only_admins_create_products() {
    let app = TestApp::new().await;
    let product = json!({
        "name": "Scarf",
        "description": "Warm wool scarf",
        "price": "25.00",
        "category": "accessories"
    });

    let response = app
        .request_authenticated(Method::POST, "/api/v1/products", Some(product.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(product),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;

    let id = body["data"]["id"].as_str().unwrap();
    let response = app
        .request(Method::GET, &format!("/api/v1/products/{}", id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["num_reviews"], 0);
}

#[tokio::test]
async fn admin_moves_order_status_forward() {
    let app = TestApp::new().await;
    let mug = app.seed_product("Mug", dec!(12.50), "kitchen").await;
    let finalized = app
        .state
        .services
        .orders
        .finalize(FinalizeOrder {
            user_id: app.user_id,
            payment: PaymentReference::StripeSession("cs_admin".into()),
            products: vec![OrderedProduct {
                id: mug.id,
                quantity: 1,
                price: mug.price,
            }],
            total_amount: mug.price,
            currency: "USD".into(),
            coupon_code: None,
            shipping_address: None,
        })
        .await
        .unwrap();
    let order_id = finalized.order.order.id;
    let status_uri = format!("/api/v1/orders/{}/status", order_id);

    let response = app
        .request_authenticated(
            Method::PUT,
            &status_uri,
            Some(json!({ "status": "processing" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::PUT,
            &status_uri,
            Some(json!({ "status": "processing" })),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["status"], "processing");

    // Skipping straight to delivered is not allowed
    let response = app
        .request(
            Method::PUT,
            &status_uri,
            Some(json!({ "status": "delivered" })),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The owner sees it, a stranger does not
    let response = app
        .request_authenticated(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let stranger = app.token_for(Uuid::new_v4());
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", order_id),
            None,
            Some(&stranger),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
