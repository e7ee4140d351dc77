use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    services::checkout::{
        CapturePaypalRequest, CheckoutSessionResponse, ConfirmStripeRequest,
        CreatePaypalOrderRequest, CreateStripeSessionRequest, PaymentConfirmation,
        PaypalOrderResponse, WebhookOutcome,
    },
    ApiResponse, AppState,
};

use super::common::validate_input;

pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

/// POST /api/v1/payments/stripe/session
pub async fn create_stripe_session(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateStripeSessionRequest>,
) -> Result<Json<ApiResponse<CheckoutSessionResponse>>, ServiceError> {
    validate_input(&payload)?;
    let session = state
        .services
        .checkout
        .create_stripe_session(auth_user.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

/// POST /api/v1/payments/stripe/confirm
pub async fn confirm_stripe_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<ConfirmStripeRequest>,
) -> Result<Json<ApiResponse<PaymentConfirmation>>, ServiceError> {
    validate_input(&payload)?;
    let confirmation = state
        .services
        .checkout
        .confirm_stripe_payment(auth_user.user_id, &payload.session_id)
        .await?;
    Ok(Json(ApiResponse::success(confirmation)))
}

/// POST /api/v1/payments/stripe/webhook
///
/// Takes the raw body so the signature is computed over the exact bytes
/// Stripe sent.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .services
        .checkout
        .handle_stripe_webhook(&body, signature)
        .await?;

    match &outcome {
        WebhookOutcome::Finalized(order_id) => {
            info!(%order_id, "Stripe webhook finalized order")
        }
        WebhookOutcome::Unpaid => warn!("Stripe webhook for unpaid session"),
        WebhookOutcome::Ignored(kind) => info!(event_type = %kind, "Ignoring Stripe event"),
        WebhookOutcome::UnknownSession(session_id) => {
            warn!(%session_id, "Stripe webhook for a session this store did not create")
        }
    }

    Ok(Json(json!({ "received": true })))
}

/// POST /api/v1/payments/paypal/orders
pub async fn create_paypal_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreatePaypalOrderRequest>,
) -> Result<Json<ApiResponse<PaypalOrderResponse>>, ServiceError> {
    validate_input(&payload)?;
    let order = state
        .services
        .checkout
        .create_paypal_order(auth_user.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/payments/paypal/capture
pub async fn capture_paypal_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CapturePaypalRequest>,
) -> Result<Json<ApiResponse<PaymentConfirmation>>, ServiceError> {
    validate_input(&payload)?;
    let confirmation = state
        .services
        .checkout
        .capture_paypal_order(auth_user.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(confirmation)))
}

pub fn payment_routes() -> Router<AppState> {
    let authenticated = Router::new()
        .route("/stripe/session", post(create_stripe_session))
        .route("/stripe/confirm", post(confirm_stripe_payment))
        .route("/paypal/orders", post(create_paypal_order))
        .route("/paypal/capture", post(capture_paypal_order))
        .with_auth();

    Router::new()
        .route("/stripe/webhook", post(stripe_webhook))
        .merge(authenticated)
}
