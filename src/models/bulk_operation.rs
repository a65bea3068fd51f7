use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::coupon::CouponTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BulkOperationType {
    Generate,
}

/// `Completed` means every item was attempted, whatever the failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BulkOperationStatus {
    Processing,
    Completed,
}

/// Why a single generated code could not be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemError {
    /// 1-based position in the batch.
    pub index: u32,
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCouponOperation {
    pub id: i64,
    pub operation_type: BulkOperationType,
    pub prefix: String,
    pub total_coupons: u32,
    pub processed_coupons: u32,
    pub failed_coupons: u32,
    pub status: BulkOperationStatus,
    pub template: CouponTemplate,
    pub errors: Vec<BulkItemError>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkCouponOperation {
    pub fn attempted(&self) -> u32 {
        self.processed_coupons + self.failed_coupons
    }
}
