use crate::{
    models::BookingCalculation, services::PriceBookingRequest, ApiResponse, ApiResult, AppState,
};
use axum::{extract::State, response::Json};

/// Prices a booking. An ineligible coupon is ignored rather than reported.
pub async fn calculate_booking_total(
    State(state): State<AppState>,
    Json(payload): Json<PriceBookingRequest>,
) -> ApiResult<BookingCalculation> {
    let calculation = state.services.pricing.price_booking(&payload)?;
    Ok(Json(ApiResponse::success(calculation)))
}
