//! Remote cart and wishlist backed by the storefront HTTP API.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::errors::{ClientError, ClientResult};
use super::{AppliedCoupon, CartItem, WishlistItem};
use crate::services::cart::CartView;
use crate::services::wishlist::WishlistEntry;

#[async_trait]
pub trait RemoteCart: Send + Sync {
    async fn fetch_cart(&self) -> ClientResult<Vec<CartItem>>;

    /// Adds one unit, creating the line when missing.
    async fn add_item(&self, product_id: Uuid) -> ClientResult<()>;

    async fn set_quantity(&self, product_id: Uuid, quantity: u32) -> ClientResult<()>;

    async fn remove_item(&self, product_id: Uuid) -> ClientResult<()>;

    async fn current_coupon(&self) -> ClientResult<Option<AppliedCoupon>>;

    async fn validate_coupon(&self, code: &str) -> ClientResult<AppliedCoupon>;
}

#[async_trait]
pub trait RemoteWishlist: Send + Sync {
    async fn fetch_wishlist(&self) -> ClientResult<Vec<WishlistItem>>;

    async fn add(&self, product_id: Uuid) -> ClientResult<()>;

    async fn remove(&self, product_id: Uuid) -> ClientResult<()>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Bearer-authenticated client for `/api/v1`
#[derive(Debug, Clone)]
pub struct HttpStorefrontClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpStorefrontClient {
    /// `base_url` points at the API root, e.g. `https://shop.example/api/v1`.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "storefront request");
        self.http.request(method, url).bearer_auth(&self.token)
    }

    async fn check(response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.message)
            .unwrap_or(text);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> ClientResult<()> {
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    async fn send_for<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<Option<T>> {
        let response = Self::check(builder.send().await?).await?;
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.data)
    }

    async fn send_for_data<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        self.send_for(builder).await?.ok_or_else(|| ClientError::Api {
            status: 200,
            message: "Response carried no data".to_string(),
        })
    }
}

#[async_trait]
impl RemoteCart for HttpStorefrontClient {
    async fn fetch_cart(&self) -> ClientResult<Vec<CartItem>> {
        let view: CartView = self.send_for_data(self.request(Method::GET, "/cart")).await?;
        Ok(view.items.into_iter().map(CartItem::from).collect())
    }

    async fn add_item(&self, product_id: Uuid) -> ClientResult<()> {
        self.send(
            self.request(Method::POST, "/cart")
                .json(&json!({ "product_id": product_id })),
        )
        .await
    }

    async fn set_quantity(&self, product_id: Uuid, quantity: u32) -> ClientResult<()> {
        self.send(
            self.request(Method::PUT, &format!("/cart/{}", product_id))
                .json(&json!({ "quantity": quantity })),
        )
        .await
    }

    async fn remove_item(&self, product_id: Uuid) -> ClientResult<()> {
        self.send(
            self.request(Method::DELETE, "/cart")
                .json(&json!({ "product_id": product_id })),
        )
        .await
    }

    async fn current_coupon(&self) -> ClientResult<Option<AppliedCoupon>> {
        self.send_for(self.request(Method::GET, "/coupons")).await
    }

    async fn validate_coupon(&self, code: &str) -> ClientResult<AppliedCoupon> {
        self.send_for_data(
            self.request(Method::POST, "/coupons/validate")
                .json(&json!({ "code": code })),
        )
        .await
    }
}

#[async_trait]
impl RemoteWishlist for HttpStorefrontClient {
    async fn fetch_wishlist(&self) -> ClientResult<Vec<WishlistItem>> {
        let entries: Vec<WishlistEntry> = self
            .send_for(self.request(Method::GET, "/wishlist"))
            .await?
            .unwrap_or_default();
        Ok(entries.into_iter().map(WishlistItem::from).collect())
    }

    async fn add(&self, product_id: Uuid) -> ClientResult<()> {
        self.send(self.request(Method::POST, &format!("/wishlist/{}", product_id)))
            .await
    }

    async fn remove(&self, product_id: Uuid) -> ClientResult<()> {
        self.send(self.request(Method::DELETE, &format!("/wishlist/{}", product_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpStorefrontClient {
        HttpStorefrontClient::new(
            format!("{}/api/v1", server.uri()),
            "token-123",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_cart_maps_lines() {
        let server = MockServer::start().await;
        let product_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/api/v1/cart"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "items": [{
                        "product_id": product_id,
                        "name": "Tee",
                        "image": null,
                        "unit_price": "20.00",
                        "quantity": 2,
                        "line_total": "40.00"
                    }],
                    "subtotal": "40.00"
                }
            })))
            .mount(&server)
            .await;

        let items = client(&server).fetch_cart().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, product_id);
        assert_eq!(items[0].quantity, 2);
    }

    #[tokio::test]
    async fn set_quantity_puts_exact_value() {
        let server = MockServer::start().await;
        let product_id = Uuid::new_v4();
        Mock::given(method("PUT"))
            .and(path(format!("/api/v1/cart/{}", product_id)))
            .and(body_json(json!({ "quantity": 4 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).set_quantity(product_id, 4).await.unwrap();
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/coupons/validate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "Not Found",
                "message": "Coupon not found"
            })))
            .mount(&server)
            .await;

        let err = client(&server).validate_coupon("NOPE").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("Coupon not found"));
    }

    #[tokio::test]
    async fn missing_coupon_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/coupons"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": null})),
            )
            .mount(&server)
            .await;

        assert!(client(&server).current_coupon().await.unwrap().is_none());
    }
}
