use super::{provider_error, CreatedSession, StripeGateway, StripeSession, StripeSessionRequest};
use crate::config::StripeConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const PROVIDER: &str = "stripe";

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedCoupon {
    id: String,
}

/// Minimal Stripe REST client (form-encoded requests, bearer secret key)
#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(cfg: &StripeConfig, timeout: Duration) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(provider_error(PROVIDER, message));
        }
        response.json::<T>().await.map_err(|e| provider_error(PROVIDER, e))
    }
}

#[async_trait]
impl StripeGateway for StripeClient {
    #[instrument(skip(self, request), fields(items = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &StripeSessionRequest,
    ) -> Result<CreatedSession, ServiceError> {
        let params = request.form_params()?;
        let response = self
            .http
            .post(self.url("/v1/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| provider_error(PROVIDER, e))?;

        let session: CreatedSession = Self::read(response).await?;
        debug!(session_id = %session.id, "created checkout session");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<StripeSession, ServiceError> {
        let response = self
            .http
            .get(self.url(&format!("/v1/checkout/sessions/{}", session_id)))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| provider_error(PROVIDER, e))?;

        Self::read(response).await
    }

    #[instrument(skip(self))]
    async fn create_coupon(&self, percent_off: Decimal) -> Result<String, ServiceError> {
        let params = [
            ("percent_off", percent_off.normalize().to_string()),
            ("duration", "once".to_string()),
        ];
        let response = self
            .http
            .post(self.url("/v1/coupons"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| provider_error(PROVIDER, e))?;

        let coupon: CreatedCoupon = Self::read(response).await?;
        Ok(coupon.id)
    }
}
