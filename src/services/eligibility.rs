//! Ordered eligibility checks for coupon redemption.
//!
//! Each check is an [`EligibilityRule`]; the validator runs them in sequence and
//! stops at the first failure so the reason a caller sees is deterministic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{debug, instrument};

use super::{coupons::CouponRegistry, discount::DiscountCalculator, usage_ledger::UsageHistory};
use crate::models::Coupon;

/// Why a coupon was refused. The `Display` text is shown to end users verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    NotFoundOrInactive,
    Expired,
    UsageLimitReached,
    UserLimitReached,
    BelowMinimumOrder { minimum: Decimal },
    CategoryNotApplicable,
    FarmNotApplicable,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFoundOrInactive => f.write_str("Coupon not found or inactive"),
            Self::Expired => f.write_str("Coupon has expired"),
            Self::UsageLimitReached => f.write_str("Coupon usage limit reached"),
            Self::UserLimitReached => f.write_str("Coupon user limit reached"),
            Self::BelowMinimumOrder { minimum } => {
                write!(f, "Minimum order amount of {} required", minimum)
            }
            Self::CategoryNotApplicable => f.write_str("Coupon not applicable to this category"),
            Self::FarmNotApplicable => f.write_str("Coupon not applicable to this farm"),
        }
    }
}

/// Everything a rule may look at.
#[derive(Debug, Clone)]
pub struct EligibilityContext<'a> {
    pub coupon: &'a Coupon,
    pub user_id: i64,
    pub booking_amount: Decimal,
    pub farm_id: Option<i64>,
    pub category_id: Option<i64>,
    /// Redemptions already recorded for this coupon and user.
    pub user_redemptions: u32,
    pub now: DateTime<Utc>,
}

pub trait EligibilityRule: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn check(&self, ctx: &EligibilityContext<'_>) -> Result<(), RejectionReason>;
}

#[derive(Debug)]
pub struct ActiveRule;

impl EligibilityRule for ActiveRule {
    fn name(&self) -> &'static str {
        "active"
    }

    fn check(&self, ctx: &EligibilityContext<'_>) -> Result<(), RejectionReason> {
        if ctx.coupon.is_active {
            Ok(())
        } else {
            Err(RejectionReason::NotFoundOrInactive)
        }
    }
}

#[derive(Debug)]
pub struct NotExpiredRule;

impl EligibilityRule for NotExpiredRule {
    fn name(&self) -> &'static str {
        "not_expired"
    }

    fn check(&self, ctx: &EligibilityContext<'_>) -> Result<(), RejectionReason> {
        if ctx.coupon.is_expired_at(ctx.now) {
            Err(RejectionReason::Expired)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
pub struct UsageLimitRule;

impl EligibilityRule for UsageLimitRule {
    fn name(&self) -> &'static str {
        "usage_limit"
    }

    fn check(&self, ctx: &EligibilityContext<'_>) -> Result<(), RejectionReason> {
        if ctx.coupon.usage_exhausted() {
            Err(RejectionReason::UsageLimitReached)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
pub struct UserLimitRule;

impl EligibilityRule for UserLimitRule {
    fn name(&self) -> &'static str {
        "user_limit"
    }

    fn check(&self, ctx: &EligibilityContext<'_>) -> Result<(), RejectionReason> {
        match ctx.coupon.user_limit {
            Some(limit) if ctx.user_redemptions >= limit => Err(RejectionReason::UserLimitReached),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct MinimumOrderRule;

impl EligibilityRule for MinimumOrderRule {
    fn name(&self) -> &'static str {
        "minimum_order"
    }

    fn check(&self, ctx: &EligibilityContext<'_>) -> Result<(), RejectionReason> {
        match ctx.coupon.min_order_amount {
            Some(minimum) if ctx.booking_amount < minimum => {
                Err(RejectionReason::BelowMinimumOrder { minimum })
            }
            _ => Ok(()),
        }
    }
}

/// Only enforced when the caller names a category.
#[derive(Debug)]
pub struct CategoryRule;

impl EligibilityRule for CategoryRule {
    fn name(&self) -> &'static str {
        "category"
    }

    fn check(&self, ctx: &EligibilityContext<'_>) -> Result<(), RejectionReason> {
        match ctx.category_id {
            Some(category_id) if !ctx.coupon.applies_to_category(category_id) => {
                Err(RejectionReason::CategoryNotApplicable)
            }
            _ => Ok(()),
        }
    }
}

/// Only enforced when the caller names a farm.
#[derive(Debug)]
pub struct FarmRule;

impl EligibilityRule for FarmRule {
    fn name(&self) -> &'static str {
        "farm"
    }

    fn check(&self, ctx: &EligibilityContext<'_>) -> Result<(), RejectionReason> {
        match ctx.farm_id {
            Some(farm_id) if !ctx.coupon.applies_to_farm(farm_id) => {
                Err(RejectionReason::FarmNotApplicable)
            }
            _ => Ok(()),
        }
    }
}

/// The standard chain, in evaluation order.
pub fn default_rules() -> Vec<Box<dyn EligibilityRule>> {
    vec![
        Box::new(ActiveRule),
        Box::new(NotExpiredRule),
        Box::new(UsageLimitRule),
        Box::new(UserLimitRule),
        Box::new(MinimumOrderRule),
        Box::new(CategoryRule),
        Box::new(FarmRule),
    ]
}

/// A request to check one coupon against one prospective booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponCheck {
    pub code: String,
    pub user_id: i64,
    pub booking_amount: Decimal,
    #[serde(default)]
    pub farm_id: Option<i64>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CouponValidation {
    Valid {
        coupon: Coupon,
        discount_amount: Decimal,
    },
    Invalid(RejectionReason),
}

impl CouponValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, CouponValidation::Valid { .. })
    }

    pub fn into_result(self) -> Result<(Coupon, Decimal), RejectionReason> {
        match self {
            CouponValidation::Valid {
                coupon,
                discount_amount,
            } => Ok((coupon, discount_amount)),
            CouponValidation::Invalid(reason) => Err(reason),
        }
    }
}

/// Runs the rule chain and, on success, prices the discount.
///
/// Validation never mutates usage counters; recording a redemption is the
/// usage ledger's job.
#[derive(Debug)]
pub struct EligibilityValidator {
    registry: Arc<CouponRegistry>,
    history: Arc<UsageHistory>,
    calculator: DiscountCalculator,
    rules: Vec<Box<dyn EligibilityRule>>,
}

impl EligibilityValidator {
    pub fn new(registry: Arc<CouponRegistry>, history: Arc<UsageHistory>) -> Self {
        Self::with_rules(registry, history, default_rules())
    }

    pub fn with_rules(
        registry: Arc<CouponRegistry>,
        history: Arc<UsageHistory>,
        rules: Vec<Box<dyn EligibilityRule>>,
    ) -> Self {
        Self {
            registry,
            history,
            calculator: DiscountCalculator::new(),
            rules,
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    #[instrument(skip(self, request), fields(code = %request.code, user_id = request.user_id))]
    pub fn validate(&self, request: &CouponCheck) -> CouponValidation {
        let Some(coupon) = self.registry.find_by_code(&request.code) else {
            debug!("unknown coupon code");
            return CouponValidation::Invalid(RejectionReason::NotFoundOrInactive);
        };

        match self.check(&coupon, request, Utc::now()) {
            Ok(discount_amount) => CouponValidation::Valid {
                coupon,
                discount_amount,
            },
            Err(reason) => CouponValidation::Invalid(reason),
        }
    }

    /// Runs the chain against an already loaded coupon.
    pub(crate) fn check(
        &self,
        coupon: &Coupon,
        request: &CouponCheck,
        now: DateTime<Utc>,
    ) -> Result<Decimal, RejectionReason> {
        let ctx = EligibilityContext {
            coupon,
            user_id: request.user_id,
            booking_amount: request.booking_amount,
            farm_id: request.farm_id,
            category_id: request.category_id,
            user_redemptions: self.history.user_redemptions(coupon.id, request.user_id),
            now,
        };

        for rule in &self.rules {
            if let Err(reason) = rule.check(&ctx) {
                debug!(rule = rule.name(), %reason, "coupon rejected");
                return Err(reason);
            }
        }

        Ok(self.calculator.compute(coupon, request.booking_amount))
    }
}
