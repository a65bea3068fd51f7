use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, sync::Arc};
use tracing::{debug, instrument};

use super::{
    discount::{check_money_amount, round_currency},
    eligibility::{CouponCheck, CouponValidation, EligibilityValidator},
};
use crate::{
    errors::ServiceError,
    models::{AppliedCoupon, BookingCalculation},
};

/// Tax charged on the discounted booking amount.
pub trait TaxPolicy: Send + Sync + Debug {
    fn rate(&self) -> Decimal;

    /// `None` when the product leaves `Decimal` range.
    fn taxes_on(&self, amount: Decimal) -> Option<Decimal> {
        amount.checked_mul(self.rate())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatRateTaxPolicy {
    rate: Decimal,
}

impl FlatRateTaxPolicy {
    pub const DEFAULT_RATE: Decimal = dec!(0.18);

    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }
}

impl Default for FlatRateTaxPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RATE)
    }
}

impl TaxPolicy for FlatRateTaxPolicy {
    fn rate(&self) -> Decimal {
        self.rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBookingRequest {
    pub booking_amount: Decimal,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub farm_id: Option<i64>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

fn out_of_range() -> ServiceError {
    ServiceError::InvalidInput("booking amount is out of range".into())
}

/// Prices a booking, applying a coupon when one is supplied and eligible.
#[derive(Debug, Clone)]
pub struct BookingPricingService {
    validator: Arc<EligibilityValidator>,
    tax_policy: Arc<dyn TaxPolicy>,
}

impl BookingPricingService {
    pub fn new(validator: Arc<EligibilityValidator>, tax_policy: Arc<dyn TaxPolicy>) -> Self {
        Self {
            validator,
            tax_policy,
        }
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_policy.rate()
    }

    /// An ineligible coupon yields an undiscounted price rather than an error.
    #[instrument(skip(self, request), fields(amount = %request.booking_amount))]
    pub fn price_booking(
        &self,
        request: &PriceBookingRequest,
    ) -> Result<BookingCalculation, ServiceError> {
        check_money_amount("bookingAmount", request.booking_amount)?;

        let subtotal = request.booking_amount;
        let mut coupon_discount = Decimal::ZERO;
        let mut applied_coupon = None;

        if let (Some(code), Some(user_id)) = (&request.coupon_code, request.user_id) {
            let check = CouponCheck {
                code: code.clone(),
                user_id,
                booking_amount: subtotal,
                farm_id: request.farm_id,
                category_id: request.category_id,
            };
            match self.validator.validate(&check) {
                CouponValidation::Valid {
                    coupon,
                    discount_amount,
                } => {
                    coupon_discount = discount_amount;
                    applied_coupon = Some(AppliedCoupon {
                        code: coupon.code,
                        title: coupon.title,
                        discount_amount,
                    });
                }
                CouponValidation::Invalid(reason) => {
                    debug!(%reason, "coupon not applied to booking");
                }
            }
        }

        let after_discount = subtotal
            .checked_sub(coupon_discount)
            .ok_or_else(out_of_range)?
            .max(Decimal::ZERO);
        let taxes = self
            .tax_policy
            .taxes_on(after_discount)
            .ok_or_else(out_of_range)?;
        let total = after_discount.checked_add(taxes).ok_or_else(out_of_range)?;

        Ok(BookingCalculation {
            subtotal: round_currency(subtotal),
            coupon_discount: round_currency(coupon_discount),
            taxes: round_currency(taxes),
            total: round_currency(total),
            applied_coupon,
        })
    }
}
