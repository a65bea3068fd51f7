use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One successful redemption. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponUsage {
    pub id: i64,
    pub coupon_id: i64,
    pub user_id: i64,
    pub booking_id: i64,
    pub discount_amount: Decimal,
    pub used_at: DateTime<Utc>,
}
