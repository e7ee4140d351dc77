mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

async fn post_review(app: &TestApp, token: &str, product_id: Uuid, rating: i32) -> Value {
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/reviews/product/{}", product_id),
            Some(json!({ "rating": rating, "comment": format!("{} stars", rating) })),
            Some(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await
}

async fn product_rating(app: &TestApp, product_id: Uuid) -> (f64, i64) {
    let body = response_json(
        app.request(Method::GET, &format!("/api/v1/products/{}", product_id), None, None)
            .await,
    )
    .await;
    (
        body["data"]["average_rating"].as_f64().unwrap(),
        body["data"]["num_reviews"].as_i64().unwrap(),
    )
}

#[tokio::test]
async fn rating_follows_reviews_through_create_and_delete() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Lamp", dec!(45.00), "home").await;

    let tokens: Vec<String> = (0..3).map(|_| app.token_for(Uuid::new_v4())).collect();
    let mut review_ids = Vec::new();
    for (token, rating) in tokens.iter().zip([4, 5, 3]) {
        let body = post_review(&app, token, lamp.id, rating).await;
        review_ids.push(body["data"]["id"].as_str().unwrap().to_string());
    }
    assert_eq!(product_rating(&app, lamp.id).await, (4.0, 3));

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/reviews/{}", review_ids[2]),
            None,
            Some(&tokens[2]),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(product_rating(&app, lamp.id).await, (4.5, 2));

    for (token, id) in tokens.iter().zip(&review_ids).take(2) {
        let response = app
            .request(Method::DELETE, &format!("/api/v1/reviews/{}", id), None, Some(token))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(product_rating(&app, lamp.id).await, (0.0, 0));
}

#[tokio::test]
async fn second_review_by_same_user_conflicts() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Lamp", dec!(45.00), "home").await;

    post_review(&app, app.token(), lamp.id, 5).await;
    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/reviews/product/{}", lamp.id),
            Some(json!({ "rating": 1, "comment": "changed my mind" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn editing_a_rating_recomputes_the_average() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Lamp", dec!(45.00), "home").await;

    let other = app.token_for(Uuid::new_v4());
    post_review(&app, &other, lamp.id, 2).await;
    let mine = post_review(&app, app.token(), lamp.id, 2).await;
    assert_eq!(product_rating(&app, lamp.id).await, (2.0, 2));

    let id = mine["data"]["id"].as_str().unwrap();
    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/reviews/{}", id),
            Some(json!({ "rating": 5 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(product_rating(&app, lamp.id).await, (3.5, 2));

    // Someone else cannot edit it
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/reviews/{}", id),
            Some(json!({ "rating": 1 })),
            Some(&other),
        )
        .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn reviews_are_listed_publicly_with_pagination() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Lamp", dec!(45.00), "home").await;
    for rating in [1, 2, 3] {
        let token = app.token_for(Uuid::new_v4());
        post_review(&app, &token, lamp.id, rating).await;
    }

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/reviews/product/{}?page=1&limit=2", lamp.id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["reviews"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["pagination"]["total_reviews"], 3);
    assert_eq!(body["data"]["pagination"]["total_pages"], 2);
    assert_eq!(body["data"]["pagination"]["has_next"], true);
}

#[tokio::test]
async fn invalid_rating_is_rejected() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Lamp", dec!(45.00), "home").await;

    let response = app
        .request_authenticated(
            Method::POST,
            &format!("/api/v1/reviews/product/{}", lamp.id),
            Some(json!({ "rating": 6, "comment": "too good" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
