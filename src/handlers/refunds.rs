use crate::{
    errors::ServiceError,
    models::{NewRefund, Refund, RefundStatus},
    services::RefundFilter,
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefundListQuery {
    /// Page number (1-indexed)
    pub page: Option<u64>,
    /// Page size (capped by configuration)
    pub limit: Option<u32>,
    /// Optional status filter (case-insensitive)
    pub status: Option<String>,
    pub user_id: Option<i64>,
    pub booking_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRefundRequest {
    pub status: RefundStatus,
    #[serde(default)]
    pub notes: Option<String>,
    /// Admin performing the change, when the caller identifies one
    #[serde(default)]
    pub processed_by: Option<i64>,
}

pub async fn list_refunds(
    State(state): State<AppState>,
    Query(query): Query<RefundListQuery>,
) -> ApiResult<PaginatedResponse<Refund>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = state.config.page_limit(query.limit);

    let status = query
        .status
        .as_deref()
        .map(RefundStatus::from_str)
        .transpose()
        .map_err(|_| ServiceError::InvalidInput("unknown refund status".into()))?;

    let refunds = state.services.refunds.list(&RefundFilter {
        status,
        user_id: query.user_id,
        booking_id: query.booking_id,
    });

    Ok(Json(ApiResponse::success(PaginatedResponse::paginate(
        refunds,
        page,
        u64::from(limit),
    ))))
}

pub async fn get_refund(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Refund> {
    let refund = state.services.refunds.get(id)?;
    Ok(Json(ApiResponse::success(refund)))
}

pub async fn create_refund(
    State(state): State<AppState>,
    Json(payload): Json<NewRefund>,
) -> ApiResult<Refund> {
    let created = state.services.refunds.create(payload).await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn process_refund(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ProcessRefundRequest>,
) -> ApiResult<Refund> {
    let updated = state
        .services
        .refunds
        .update_status(id, payload.status, payload.processed_by, payload.notes)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}
