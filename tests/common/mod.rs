#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use storefront_api::{
    auth::{AuthConfig, AuthService, ADMIN_ROLE},
    config::AppConfig,
    db::{self, DbConfig},
    entities::product,
    events::{self, EventSender},
    handlers::AppServices,
    services::products::CreateProductInput,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::MockServer;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Helper harness for an application backed by an in-memory SQLite database,
/// with Stripe and PayPal replaced by mock servers.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub stripe: MockServer,
    pub paypal: MockServer,
    pub user_id: Uuid,
    token: String,
    admin_token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Like `new`, with a hook to adjust the configuration before the
    /// services are built.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let stripe = MockServer::start().await;
        let paypal = MockServer::start().await;

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.client_url = "http://shop.test".to_string();
        cfg.stripe.api_base = stripe.uri();
        cfg.stripe.secret_key = "sk_test_123".to_string();
        cfg.stripe.webhook_secret = Some(WEBHOOK_SECRET.to_string());
        cfg.paypal.api_base = paypal.uri();
        cfg.paypal.client_id = "paypal-client".to_string();
        cfg.paypal.client_secret = "paypal-secret".to_string();
        adjust(&mut cfg);

        // One connection so every query sees the same in-memory database
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth = Arc::new(AuthService::new(AuthConfig::new(
            cfg.jwt_secret.clone(),
            Duration::from_secs(3600),
        )));

        let cfg = Arc::new(cfg);
        let services = AppServices::from_config(db_arc.clone(), event_sender.clone(), cfg.clone())
            .expect("provider clients for tests");

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
            auth: auth.clone(),
        };

        let user_id = Uuid::new_v4();
        let token = auth
            .issue_token(user_id, Some("Test User".to_string()), vec![])
            .expect("user token");
        let admin_token = auth
            .issue_token(Uuid::new_v4(), Some("Admin".to_string()), vec![ADMIN_ROLE.to_string()])
            .expect("admin token");

        Self {
            router: storefront_api::app_router(state.clone()),
            state,
            stripe,
            paypal,
            user_id,
            token,
            admin_token,
            _event_task: event_task,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Token for another, non-admin user
    pub fn token_for(&self, user_id: Uuid) -> String {
        self.state
            .auth
            .issue_token(user_id, Some("Other".to_string()), vec![])
            .expect("token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for requests as the default user.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    /// Serves the router on an ephemeral port and returns the API base URL.
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let router = self.router.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}/api/v1", addr)
    }

    /// Raw-body POST, used for webhook deliveries.
    pub async fn post_raw(&self, uri: &str, payload: &[u8], headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(payload.to_vec()))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, category: &str) -> product::Model {
        self.state
            .services
            .products
            .create(CreateProductInput {
                name: name.to_string(),
                description: format!("{} for integration tests", name),
                price,
                image: None,
                category: category.to_string(),
                is_featured: false,
            })
            .await
            .expect("seed product for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
