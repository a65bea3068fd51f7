use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::{
    errors::ServiceError,
    models::{Coupon, DiscountType},
};

/// Ceiling for booking amounts, coupon values and recorded discounts. Keeps
/// every product and sum the pricing path forms inside `Decimal` range.
pub const MAX_MONEY_AMOUNT: Decimal = dec!(1000000000000);

/// Rejects a caller-supplied amount that is negative or above [`MAX_MONEY_AMOUNT`].
pub fn check_money_amount(field: &str, amount: Decimal) -> Result<(), ServiceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ServiceError::InvalidInput(format!(
            "{field} must not be negative"
        )));
    }
    if amount > MAX_MONEY_AMOUNT {
        return Err(ServiceError::InvalidInput(format!(
            "{field} must not exceed {MAX_MONEY_AMOUNT}"
        )));
    }
    Ok(())
}

/// Rounds a monetary amount to exactly two fraction digits, half away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Turns a coupon and a booking amount into a discount.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscountCalculator;

impl DiscountCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Discount for `booking_amount`, rounded to two digits.
    ///
    /// Percentage coupons are capped by `max_discount` when one is set. Fixed
    /// coupons return their face value even when it exceeds the booking amount;
    /// clamping the payable total is the pricing step's job. A product too large
    /// for `Decimal` saturates instead of panicking.
    pub fn compute(&self, coupon: &Coupon, booking_amount: Decimal) -> Decimal {
        let discount = match coupon.discount_type {
            DiscountType::Percentage => {
                let raw = booking_amount
                    .max(Decimal::ZERO)
                    .checked_mul(coupon.value)
                    .map_or(Decimal::MAX, |product| product / Decimal::ONE_HUNDRED);
                match coupon.max_discount {
                    Some(cap) if raw > cap => cap,
                    _ => raw,
                }
            }
            DiscountType::Fixed => coupon.value,
        };

        round_currency(discount.max(Decimal::ZERO))
    }
}
