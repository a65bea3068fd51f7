//! Farm-stay coupon and refund service
//!
//! Coupon administration, eligibility checks, discount and booking pricing,
//! redemption accounting, bulk coupon generation and the refund lifecycle.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod models;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    http::HeaderValue,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(config: config::AppConfig, event_sender: events::EventSender) -> Self {
        let services = handlers::AppServices::new(&config, Arc::new(event_sender.clone()));
        Self {
            config,
            event_sender,
            services,
        }
    }

    pub fn coupon_registry(&self) -> Arc<services::CouponRegistry> {
        self.services.coupons.clone()
    }
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    /// Cuts one page out of an already ordered collection. Pages are 1-indexed.
    pub fn paginate(all: Vec<T>, page: u64, limit: u64) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        let total = all.len() as u64;
        let skip = usize::try_from((page - 1).saturating_mul(limit)).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        let items = all.into_iter().skip(skip).take(take).collect();
        Self {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    let coupons = Router::new()
        .route(
            "/coupons",
            get(handlers::coupons::list_coupons).post(handlers::coupons::create_coupon),
        )
        .route(
            "/coupons/{id}",
            get(handlers::coupons::get_coupon)
                .put(handlers::coupons::update_coupon)
                .delete(handlers::coupons::delete_coupon),
        )
        .route("/coupons/{id}/toggle", post(handlers::coupons::toggle_coupon))
        .route("/coupons/{id}/usage", get(handlers::coupons::coupon_usage))
        .route(
            "/coupons/by-code/{code}",
            get(handlers::coupons::get_coupon_by_code),
        )
        .route("/coupons/validate", post(handlers::coupons::validate_coupon))
        .route("/coupons/redeem", post(handlers::coupons::redeem_coupon))
        .route(
            "/coupons/bulk",
            get(handlers::coupons::list_bulk_operations).post(handlers::coupons::bulk_generate),
        )
        .route(
            "/coupons/bulk/{id}",
            get(handlers::coupons::get_bulk_operation),
        );

    let bookings = Router::new().route(
        "/bookings/calculate",
        post(handlers::bookings::calculate_booking_total),
    );

    let refunds = Router::new()
        .route(
            "/refunds",
            get(handlers::refunds::list_refunds).post(handlers::refunds::create_refund),
        )
        .route("/refunds/{id}", get(handlers::refunds::get_refund))
        .route(
            "/refunds/{id}/process",
            put(handlers::refunds::process_refund),
        );

    Router::new()
        .route("/status", get(api_status))
        .merge(coupons)
        .merge(bookings)
        .merge(refunds)
}

/// The complete HTTP application: versioned API, health check and middleware.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("No usable CORS origins configured; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

async fn api_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "farmstay-coupons",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
        "taxRate": state.services.pricing.tax_rate().to_string(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let events_status = if state.event_sender.is_closed() {
        "unhealthy"
    } else {
        "healthy"
    };

    let health_data = json!({
        "status": events_status,
        "checks": {
            "event_channel": events_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
