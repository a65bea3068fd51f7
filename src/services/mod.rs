// Coupon management
pub mod bulk_coupons;
pub mod coupons;

// Redemption
pub mod discount;
pub mod eligibility;
pub mod usage_ledger;

// Pricing
pub mod booking_pricing;

// Refunds
pub mod refunds;

pub use booking_pricing::{BookingPricingService, FlatRateTaxPolicy, PriceBookingRequest, TaxPolicy};
pub use bulk_coupons::{BulkCouponService, BulkGenerateRequest};
pub use coupons::CouponRegistry;
pub use discount::{check_money_amount, round_currency, DiscountCalculator, MAX_MONEY_AMOUNT};
pub use eligibility::{
    CouponCheck, CouponValidation, EligibilityContext, EligibilityRule, EligibilityValidator,
    RejectionReason,
};
pub use refunds::{RefundFilter, RefundService};
pub use usage_ledger::{RedemptionRequest, UsageHistory, UsageLedger};
