#![allow(dead_code)]

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use farmstay_coupons::{config::AppConfig, events, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Helper harness for spinning up the full router over fresh in-memory services.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(cfg: AppConfig) -> Self {
        let (event_sender, event_rx) = events::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(cfg, event_sender);
        let router = farmstay_coupons::app(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Send a request against the router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("failed to build request"))
            .await
            .expect("router should respond")
    }

    /// Sends a request and returns the status plus the decoded JSON body.
    pub async fn json(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let response = self.request(method, uri, body).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    /// Creates a coupon through the admin API and returns its `data` payload.
    pub async fn create_coupon(&self, payload: Value) -> Value {
        let (status, body) = self
            .json(Method::POST, "/api/v1/coupons", Some(payload))
            .await;
        assert_eq!(status, StatusCode::OK, "coupon creation failed: {body}");
        body["data"].clone()
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// The canonical `WELCOME20` coupon.
pub fn welcome20() -> Value {
    json!({
        "code": "WELCOME20",
        "title": "Welcome to the farm",
        "type": "percentage",
        "value": "20",
        "maxDiscount": "500",
        "minOrderAmount": "100",
        "validUntil": "2099-12-31T23:59:59Z"
    })
}
