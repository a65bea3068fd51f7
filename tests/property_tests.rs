//! Property-based tests for discount and booking arithmetic.
//!
//! These tests use proptest to check the money invariants over a wide range of
//! amounts, coupon values and caps.

use chrono::{Duration, Utc};
use farmstay_coupons::{
    config::AppConfig,
    events,
    models::{Coupon, CouponTemplate, DiscountType},
    services::{round_currency, DiscountCalculator, PriceBookingRequest},
    AppState,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::OnceLock;

// Strategies for generating test data
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn percentage_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|hundredths| Decimal::new(hundredths, 2))
}

fn coupon(discount_type: DiscountType, value: Decimal, max_discount: Option<Decimal>) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: 1,
        code: "PROP".into(),
        title: "Property".into(),
        description: None,
        discount_type,
        value,
        max_discount,
        min_order_amount: None,
        usage_limit: None,
        used_count: 0,
        user_limit: None,
        applicable_categories: None,
        applicable_farms: None,
        valid_from: now,
        valid_until: now + Duration::days(1),
        is_active: true,
        total_used: 0,
        total_discount: Decimal::ZERO,
        is_expired: false,
        can_use: true,
        created_at: now,
        updated_at: now,
    }
}

fn template(discount_type: DiscountType, value: Decimal) -> CouponTemplate {
    CouponTemplate {
        title: "Property".into(),
        description: None,
        discount_type,
        value,
        max_discount: None,
        min_order_amount: None,
        usage_limit: None,
        user_limit: None,
        applicable_categories: None,
        applicable_farms: None,
        valid_from: None,
        valid_until: Utc::now() + Duration::days(365),
        is_active: true,
    }
}

/// Shared state seeded with a fixed coupon bigger than many bookings and a
/// plain 20% coupon.
fn seeded_state() -> &'static AppState {
    static STATE: OnceLock<(tokio::runtime::Runtime, AppState)> = OnceLock::new();
    let (_, state) = STATE.get_or_init(|| {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let state = runtime.block_on(async {
            let (sender, rx) = events::channel(256);
            tokio::spawn(events::process_events(rx));
            let state = AppState::new(AppConfig::default(), sender);
            state
                .services
                .coupons
                .create(template(DiscountType::Fixed, dec!(5000)).with_code("BIGFIX", "Big"))
                .await
                .expect("seed BIGFIX");
            state
                .services
                .coupons
                .create(template(DiscountType::Percentage, dec!(20)).with_code("TWENTY", "Twenty"))
                .await
                .expect("seed TWENTY");
            state
        });
        (runtime, state)
    });
    state
}

fn price(code: &str, amount: Decimal) -> PriceBookingRequest {
    PriceBookingRequest {
        booking_amount: amount,
        coupon_code: Some(code.into()),
        user_id: Some(1),
        farm_id: None,
        category_id: None,
    }
}

// Property: percentage discounts honor the cap
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn percentage_discount_is_min_of_share_and_cap(
        amount in amount_strategy(),
        pct in percentage_strategy(),
        cap in amount_strategy(),
    ) {
        let c = coupon(DiscountType::Percentage, pct, Some(cap));
        let discount = DiscountCalculator::new().compute(&c, amount);
        let expected = round_currency((amount * pct / Decimal::ONE_HUNDRED).min(cap));
        prop_assert_eq!(discount, expected);
        prop_assert!(discount <= round_currency(cap));
    }

    #[test]
    fn uncapped_percentage_never_exceeds_amount(
        amount in amount_strategy(),
        pct in percentage_strategy(),
    ) {
        let c = coupon(DiscountType::Percentage, pct, None);
        let discount = DiscountCalculator::new().compute(&c, amount);
        prop_assert!(discount >= Decimal::ZERO);
        prop_assert!(discount <= round_currency(amount));
    }

    #[test]
    fn fixed_discount_is_face_value(amount in amount_strategy(), value in amount_strategy()) {
        let c = coupon(DiscountType::Fixed, value, None);
        prop_assert_eq!(DiscountCalculator::new().compute(&c, amount), round_currency(value));
    }
}

// Property: rounding yields two fraction digits
proptest! {
    #[test]
    fn rounding_keeps_two_digits(mantissa in -1_000_000_000i64..1_000_000_000, scale in 0u32..6) {
        let rounded = round_currency(Decimal::new(mantissa, scale));
        prop_assert_eq!(rounded.scale(), 2);
        prop_assert!((rounded - Decimal::new(mantissa, scale)).abs() <= dec!(0.005));
    }
}

// Property: booking totals are never negative and tax follows the discount
proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn oversized_fixed_coupon_clamps_to_zero(amount in amount_strategy()) {
        let calc = seeded_state()
            .services
            .pricing
            .price_booking(&price("BIGFIX", amount))
            .expect("pricing");
        prop_assert!(calc.total >= Decimal::ZERO);
        prop_assert!(calc.taxes >= Decimal::ZERO);
        prop_assert_eq!(calc.coupon_discount, dec!(5000.00));
        if amount <= dec!(5000) {
            prop_assert_eq!(calc.total, Decimal::ZERO);
        }
    }

    #[test]
    fn total_is_after_discount_plus_tax(amount in amount_strategy()) {
        let calc = seeded_state()
            .services
            .pricing
            .price_booking(&price("TWENTY", amount))
            .expect("pricing");
        let after_discount = (calc.subtotal - calc.coupon_discount).max(Decimal::ZERO);
        prop_assert_eq!(calc.subtotal, round_currency(amount));
        prop_assert_eq!(calc.coupon_discount, round_currency(amount * dec!(0.20)));
        prop_assert_eq!(calc.taxes, round_currency(after_discount * dec!(0.18)));
        prop_assert_eq!(calc.total, after_discount + calc.taxes);
    }
}
