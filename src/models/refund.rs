use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use validator::Validate;

use crate::errors::ServiceError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefundType {
    Full,
    Partial,
}

/// Refund lifecycle: `pending -> approved -> processed`, or `pending -> rejected`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RefundStatus {
    Pending,
    Approved,
    Processed,
    Rejected,
}

impl RefundStatus {
    /// Whether an admin may move a refund from `self` to `next`.
    pub fn can_transition_to(self, next: RefundStatus) -> bool {
        matches!(
            (self, next),
            (RefundStatus::Pending, RefundStatus::Approved)
                | (RefundStatus::Pending, RefundStatus::Rejected)
                | (RefundStatus::Approved, RefundStatus::Processed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RefundStatus::Processed | RefundStatus::Rejected)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefundMethod {
    OriginalPayment,
    Wallet,
    BankTransfer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub id: i64,
    pub booking_id: i64,
    pub user_id: i64,
    pub reason: String,
    pub refund_type: RefundType,
    pub original_amount: Decimal,
    pub refund_amount: Decimal,
    pub refund_method: RefundMethod,
    pub status: RefundStatus,
    /// Admin who performed the last status change.
    pub processed_by: Option<i64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for opening a refund against a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewRefund {
    pub booking_id: i64,
    pub user_id: i64,
    #[validate(length(min = 1, max = 1000, message = "Reason cannot be empty"))]
    pub reason: String,
    pub refund_type: RefundType,
    pub original_amount: Decimal,
    pub refund_amount: Decimal,
    pub refund_method: RefundMethod,
    /// Initial status; `pending` when omitted.
    #[serde(default)]
    pub status: Option<RefundStatus>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewRefund {
    /// Full refunds return exactly the original amount; partial ones strictly less, but more than zero.
    pub fn check_amounts(&self) -> Result<(), ServiceError> {
        if self.original_amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidRefundAmount(format!(
                "original amount must be positive, got {}",
                self.original_amount
            )));
        }
        match self.refund_type {
            RefundType::Full if self.refund_amount != self.original_amount => {
                Err(ServiceError::InvalidRefundAmount(format!(
                    "full refund must equal the original amount {}, got {}",
                    self.original_amount, self.refund_amount
                )))
            }
            RefundType::Partial
                if self.refund_amount <= Decimal::ZERO
                    || self.refund_amount >= self.original_amount =>
            {
                Err(ServiceError::InvalidRefundAmount(format!(
                    "partial refund must be between 0 and {} exclusive, got {}",
                    self.original_amount, self.refund_amount
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case(RefundStatus::Pending, RefundStatus::Approved, true)]
    #[case(RefundStatus::Pending, RefundStatus::Rejected, true)]
    #[case(RefundStatus::Approved, RefundStatus::Processed, true)]
    #[case(RefundStatus::Pending, RefundStatus::Processed, false)]
    #[case(RefundStatus::Approved, RefundStatus::Rejected, false)]
    #[case(RefundStatus::Rejected, RefundStatus::Processed, false)]
    #[case(RefundStatus::Processed, RefundStatus::Pending, false)]
    fn transition_table(
        #[case] from: RefundStatus,
        #[case] to: RefundStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in RefundStatus::iter().filter(|s| s.is_terminal()) {
            assert!(RefundStatus::iter().all(|to| !from.can_transition_to(to)));
        }
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            RefundStatus::from_str("Approved").unwrap(),
            RefundStatus::Approved
        );
        assert_eq!(RefundStatus::Processed.to_string(), "processed");
    }
}
