use crate::{
    errors::ServiceError,
    models::{BulkCouponOperation, Coupon, CouponUpdate, CouponUsage, NewCoupon},
    services::{
        check_money_amount, BulkGenerateRequest, CouponCheck, CouponValidation, RedemptionRequest,
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize, Default)]
pub struct CouponListQuery {
    /// Only active (`true`) or inactive (`false`) coupons
    pub active: Option<bool>,
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (capped by configuration)
    pub limit: Option<u32>,
}

/// Successful validation outcome. Rejections are returned as errors.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidationResponse {
    pub valid: bool,
    pub coupon: Coupon,
    pub discount_amount: Decimal,
}

pub async fn list_coupons(
    State(state): State<AppState>,
    Query(query): Query<CouponListQuery>,
) -> ApiResult<PaginatedResponse<Coupon>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = state.config.page_limit(query.limit);

    let coupons = state.services.coupons.list(query.active);
    Ok(Json(ApiResponse::success(PaginatedResponse::paginate(
        coupons,
        page,
        u64::from(limit),
    ))))
}

pub async fn get_coupon(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Coupon> {
    let coupon = state.services.coupons.get_by_id(id)?;
    Ok(Json(ApiResponse::success(coupon)))
}

pub async fn get_coupon_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Coupon> {
    let coupon = state.services.coupons.get_by_code(&code)?;
    Ok(Json(ApiResponse::success(coupon)))
}

pub async fn create_coupon(
    State(state): State<AppState>,
    Json(payload): Json<NewCoupon>,
) -> ApiResult<Coupon> {
    let created = state.services.coupons.create(payload).await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn update_coupon(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CouponUpdate>,
) -> ApiResult<Coupon> {
    let updated = state.services.coupons.update(id, payload).await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    state.services.usage.delete_coupon(id).await?;
    Ok(Json(ApiResponse::success(json!({ "id": id, "deleted": true }))))
}

pub async fn toggle_coupon(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Coupon> {
    let toggled = state.services.coupons.toggle_active(id).await?;
    Ok(Json(ApiResponse::success(toggled)))
}

pub async fn coupon_usage(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Vec<CouponUsage>> {
    let rows = state.services.usage.history(id)?;
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(payload): Json<CouponCheck>,
) -> ApiResult<CouponValidationResponse> {
    check_money_amount("bookingAmount", payload.booking_amount)?;
    match state.services.validator.validate(&payload) {
        CouponValidation::Valid {
            coupon,
            discount_amount,
        } => Ok(Json(ApiResponse::success(CouponValidationResponse {
            valid: true,
            coupon,
            discount_amount,
        }))),
        CouponValidation::Invalid(reason) => Err(ServiceError::CouponRejected(reason)),
    }
}

pub async fn redeem_coupon(
    State(state): State<AppState>,
    Json(payload): Json<RedemptionRequest>,
) -> ApiResult<CouponUsage> {
    let usage = state.services.usage.redeem(payload).await?;
    Ok(Json(ApiResponse::success(usage)))
}

pub async fn bulk_generate(
    State(state): State<AppState>,
    Json(payload): Json<BulkGenerateRequest>,
) -> ApiResult<BulkCouponOperation> {
    let BulkGenerateRequest {
        template,
        count,
        prefix,
    } = payload;
    let operation = state
        .services
        .bulk
        .generate(template, count, &prefix)
        .await?;
    Ok(Json(ApiResponse::success(operation)))
}

pub async fn list_bulk_operations(
    State(state): State<AppState>,
) -> ApiResult<Vec<BulkCouponOperation>> {
    Ok(Json(ApiResponse::success(state.services.bulk.list())))
}

pub async fn get_bulk_operation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<BulkCouponOperation> {
    let operation = state.services.bulk.get(id)?;
    Ok(Json(ApiResponse::success(operation)))
}
