use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use super::{
    coupons::CouponRegistry,
    discount::{check_money_amount, round_currency},
    eligibility::{CouponCheck, EligibilityValidator, RejectionReason},
};
use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Coupon, CouponUsage},
};

/// Append-only redemption rows, grouped by coupon.
#[derive(Debug)]
pub struct UsageHistory {
    rows: DashMap<i64, Vec<CouponUsage>>,
    next_id: AtomicI64,
}

impl Default for UsageHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageHistory {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn user_redemptions(&self, coupon_id: i64, user_id: i64) -> u32 {
        self.rows.get(&coupon_id).map_or(0, |rows| {
            rows.iter().filter(|row| row.user_id == user_id).count() as u32
        })
    }

    /// Rows for a coupon, oldest first.
    pub fn for_coupon(&self, coupon_id: i64) -> Vec<CouponUsage> {
        self.rows
            .get(&coupon_id)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    pub(crate) fn append(
        &self,
        coupon_id: i64,
        user_id: i64,
        booking_id: i64,
        discount_amount: Decimal,
    ) -> CouponUsage {
        let usage = CouponUsage {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            coupon_id,
            user_id,
            booking_id,
            discount_amount,
            used_at: Utc::now(),
        };
        self.rows.entry(coupon_id).or_default().push(usage.clone());
        usage
    }
}

/// Redeem a coupon code against a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRequest {
    pub coupon_code: String,
    pub user_id: i64,
    pub booking_id: i64,
    pub booking_amount: Decimal,
    #[serde(default)]
    pub farm_id: Option<i64>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

/// Records redemptions and keeps coupon counters in step with the usage rows.
///
/// Writes for a coupon are serialized behind that coupon's lock, and limits are
/// re-read inside the lock before anything is incremented.
#[derive(Debug)]
pub struct UsageLedger {
    registry: Arc<CouponRegistry>,
    history: Arc<UsageHistory>,
    validator: Arc<EligibilityValidator>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
    event_sender: Arc<EventSender>,
}

impl UsageLedger {
    pub fn new(
        registry: Arc<CouponRegistry>,
        history: Arc<UsageHistory>,
        validator: Arc<EligibilityValidator>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            registry,
            history,
            validator,
            locks: DashMap::new(),
            event_sender,
        }
    }

    fn lock_for(&self, coupon_id: i64) -> Arc<Mutex<()>> {
        self.locks.entry(coupon_id).or_default().clone()
    }

    /// Records a redemption with a discount the caller already computed.
    #[instrument(skip(self, discount_amount))]
    pub async fn record(
        &self,
        coupon_code: &str,
        user_id: i64,
        booking_id: i64,
        discount_amount: Decimal,
    ) -> Result<CouponUsage, ServiceError> {
        check_money_amount("discountAmount", discount_amount)?;
        let discount_amount = round_currency(discount_amount);
        let coupon = self.registry.get_by_code(coupon_code)?;

        let lock = self.lock_for(coupon.id);
        let _guard = lock.lock().await;

        let current = self.registry.get_by_id(coupon.id)?;
        if current.usage_exhausted() {
            warn!(coupon_id = current.id, "usage limit reached at record time");
            return Err(ServiceError::CouponRejected(
                RejectionReason::UsageLimitReached,
            ));
        }
        if let Some(limit) = current.user_limit {
            if self.history.user_redemptions(current.id, user_id) >= limit {
                warn!(coupon_id = current.id, "user limit reached at record time");
                return Err(ServiceError::CouponRejected(
                    RejectionReason::UserLimitReached,
                ));
            }
        }

        self.commit(&current, user_id, booking_id, discount_amount)
            .await
    }

    /// Validates and records in one step, under the coupon's lock.
    #[instrument(skip(self, request), fields(code = %request.coupon_code, user_id = request.user_id))]
    pub async fn redeem(&self, request: RedemptionRequest) -> Result<CouponUsage, ServiceError> {
        check_money_amount("bookingAmount", request.booking_amount)?;
        let coupon_id = self
            .registry
            .find_by_code(&request.coupon_code)
            .map(|coupon| coupon.id)
            .ok_or(ServiceError::CouponRejected(
                RejectionReason::NotFoundOrInactive,
            ))?;

        let lock = self.lock_for(coupon_id);
        let _guard = lock.lock().await;

        let coupon = self
            .registry
            .get_by_id(coupon_id)
            .map_err(|_| ServiceError::CouponRejected(RejectionReason::NotFoundOrInactive))?;
        let check = CouponCheck {
            code: request.coupon_code.clone(),
            user_id: request.user_id,
            booking_amount: request.booking_amount,
            farm_id: request.farm_id,
            category_id: request.category_id,
        };
        let discount_amount = self
            .validator
            .check(&coupon, &check, Utc::now())
            .map_err(ServiceError::CouponRejected)?;

        self.commit(&coupon, request.user_id, request.booking_id, discount_amount)
            .await
    }

    /// Deletes a coupon once no redemption of it is in flight, then drops its lock.
    #[instrument(skip(self))]
    pub async fn delete_coupon(&self, coupon_id: i64) -> Result<(), ServiceError> {
        let lock = self.lock_for(coupon_id);
        let deleted = {
            let _guard = lock.lock().await;
            self.registry.delete(coupon_id).await
        };
        drop(lock);
        // A waiter still holding a clone keeps the entry until the next delete.
        self.locks
            .remove_if(&coupon_id, |_, held| Arc::strong_count(held) == 1);
        deleted
    }

    /// Usage rows for an existing coupon.
    pub fn history(&self, coupon_id: i64) -> Result<Vec<CouponUsage>, ServiceError> {
        self.registry.get_by_id(coupon_id)?;
        Ok(self.history.for_coupon(coupon_id))
    }

    // Caller holds the coupon lock. The counter update is the only fallible step
    // and runs first, so a failure never leaves a row without its increment.
    async fn commit(
        &self,
        coupon: &Coupon,
        user_id: i64,
        booking_id: i64,
        discount_amount: Decimal,
    ) -> Result<CouponUsage, ServiceError> {
        self.registry.apply_redemption(coupon.id, discount_amount)?;
        let usage = self
            .history
            .append(coupon.id, user_id, booking_id, discount_amount);

        info!(
            coupon_id = coupon.id,
            user_id,
            booking_id,
            discount = %discount_amount,
            "coupon redemption recorded"
        );
        self.event_sender
            .emit(Event::CouponRedeemed {
                coupon_id: coupon.id,
                user_id,
                booking_id,
                discount_amount,
            })
            .await;
        Ok(usage)
    }
}
