use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Coupon details surfaced on a priced booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub code: String,
    pub title: String,
    pub discount_amount: Decimal,
}

/// Price breakdown for a booking, computed fresh for every request.
///
/// All amounts carry exactly two fraction digits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCalculation {
    pub subtotal: Decimal,
    pub coupon_discount: Decimal,
    pub taxes: Decimal,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_coupon: Option<AppliedCoupon>,
}
