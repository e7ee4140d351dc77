use super::{provider_error, PaypalCapture, PaypalGateway, PaypalOrderRequest};
use crate::config::PaypalConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

const PROVIDER: &str = "paypal";
/// Refresh the access token this long before PayPal says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AmountValue {
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct CaptureList {
    #[serde(default)]
    captures: Vec<CaptureEntry>,
}

#[derive(Debug, Deserialize)]
struct CaptureEntry {
    amount: Option<AmountValue>,
}

#[derive(Debug, Deserialize)]
struct CapturedUnit {
    #[serde(default)]
    amount: Option<AmountValue>,
    #[serde(default)]
    payments: Option<CaptureList>,
}

/// Body of `POST /v2/checkout/orders/{id}/capture`
#[derive(Debug, Deserialize)]
pub struct CaptureResponse {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<CapturedUnit>,
}

impl CaptureResponse {
    /// Amount of the first capture, falling back to the purchase unit amount.
    pub fn into_capture(self) -> PaypalCapture {
        let unit = self.purchase_units.first();
        let captured = unit
            .and_then(|u| u.payments.as_ref())
            .and_then(|p| p.captures.first())
            .and_then(|c| c.amount.as_ref());
        let declared = unit.and_then(|u| u.amount.as_ref());

        let amount = captured
            .or(declared)
            .and_then(|a| Decimal::from_str(&a.value).ok());

        PaypalCapture {
            id: self.id,
            status: self.status,
            amount,
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// PayPal Orders v2 client using client-credentials OAuth
#[derive(Clone)]
pub struct PaypalClient {
    http: Client,
    api_base: String,
    client_id: String,
    client_secret: String,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl PaypalClient {
    pub fn new(cfg: &PaypalConfig, timeout: Duration) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            token: Arc::new(Mutex::new(None)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .http
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| provider_error(PROVIDER, e))?;
        let token: TokenResponse = Self::read(response).await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        debug!("obtained paypal access token");
        Ok(token.access_token)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provider_error(
                PROVIDER,
                format!("{} {}", status, body.chars().take(200).collect::<String>()),
            ));
        }
        response.json::<T>().await.map_err(|e| provider_error(PROVIDER, e))
    }
}

#[async_trait]
impl PaypalGateway for PaypalClient {
    #[instrument(skip(self, request))]
    async fn create_order(&self, request: &PaypalOrderRequest) -> Result<String, ServiceError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| provider_error(PROVIDER, e))?;

        let order: CreatedOrder = Self::read(response).await?;
        Ok(order.id)
    }

    #[instrument(skip(self))]
    async fn capture_order(&self, order_id: &str) -> Result<PaypalCapture, ServiceError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.url(&format!("/v2/checkout/orders/{}/capture", order_id)))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|e| provider_error(PROVIDER, e))?;

        let capture: CaptureResponse = Self::read(response).await?;
        Ok(capture.into_capture())
    }
}
