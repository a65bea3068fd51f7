use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use rust_decimal::Decimal;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Coupon, CouponTemplate, CouponUpdate, NewCoupon},
    services::eligibility::RejectionReason,
};

/// Holds coupon definitions and their running usage statistics.
///
/// Codes are indexed separately so that uniqueness is enforced atomically. The
/// code index is always locked before the coupon map, never the other way round.
#[derive(Debug)]
pub struct CouponRegistry {
    coupons: DashMap<i64, Coupon>,
    codes: DashMap<String, i64>,
    next_id: AtomicI64,
    event_sender: Arc<EventSender>,
}

impl CouponRegistry {
    pub fn new(event_sender: Arc<EventSender>) -> Self {
        Self {
            coupons: DashMap::new(),
            codes: DashMap::new(),
            next_id: AtomicI64::new(1),
            event_sender,
        }
    }

    /// All coupons ordered by id, optionally filtered on `is_active`.
    pub fn list(&self, active: Option<bool>) -> Vec<Coupon> {
        let now = Utc::now();
        let mut coupons: Vec<Coupon> = self
            .coupons
            .iter()
            .filter(|entry| active.map_or(true, |flag| entry.is_active == flag))
            .map(|entry| entry.value().clone().refreshed(now))
            .collect();
        coupons.sort_by_key(|c| c.id);
        coupons
    }

    pub fn get_by_id(&self, id: i64) -> Result<Coupon, ServiceError> {
        self.coupons
            .get(&id)
            .map(|entry| entry.value().clone().refreshed(Utc::now()))
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))
    }

    /// Looks a coupon up by code. Inactive coupons are invisible here.
    pub fn get_by_code(&self, code: &str) -> Result<Coupon, ServiceError> {
        self.find_by_code(code)
            .filter(|coupon| coupon.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found or inactive", code)))
    }

    /// Code lookup that also returns inactive coupons, for the eligibility chain.
    pub(crate) fn find_by_code(&self, code: &str) -> Option<Coupon> {
        let id = self.codes.get(code).map(|entry| *entry.value())?;
        self.coupons
            .get(&id)
            .map(|entry| entry.value().clone().refreshed(Utc::now()))
    }

    #[instrument(skip(self, new_coupon), fields(code = %new_coupon.code))]
    pub async fn create(&self, new_coupon: NewCoupon) -> Result<Coupon, ServiceError> {
        new_coupon.validate()?;
        new_coupon.template.check_amounts()?;

        let now = Utc::now();
        let NewCoupon { code, template } = new_coupon;

        let coupon = match self.codes.entry(code.clone()) {
            Entry::Occupied(_) => {
                debug!("duplicate coupon code");
                return Err(ServiceError::Conflict(format!(
                    "Coupon code {} already exists",
                    code
                )));
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let mut coupon = Coupon {
                    id,
                    code: code.clone(),
                    title: template.title,
                    description: template.description,
                    discount_type: template.discount_type,
                    value: template.value,
                    max_discount: template.max_discount,
                    min_order_amount: template.min_order_amount,
                    usage_limit: template.usage_limit,
                    used_count: 0,
                    user_limit: template.user_limit,
                    applicable_categories: template.applicable_categories,
                    applicable_farms: template.applicable_farms,
                    valid_from: template.valid_from.unwrap_or(now),
                    valid_until: template.valid_until,
                    is_active: template.is_active,
                    total_used: 0,
                    total_discount: Decimal::ZERO,
                    is_expired: false,
                    can_use: false,
                    created_at: now,
                    updated_at: now,
                };
                coupon.refresh_derived(now);
                // Visible in the map before the code resolves to it.
                self.coupons.insert(id, coupon.clone());
                slot.insert(id);
                coupon
            }
        };

        info!(coupon_id = coupon.id, "coupon created");
        self.event_sender
            .emit(Event::CouponCreated {
                coupon_id: coupon.id,
                code: coupon.code.clone(),
            })
            .await;
        Ok(coupon)
    }

    #[instrument(skip(self, update))]
    pub async fn update(&self, id: i64, update: CouponUpdate) -> Result<Coupon, ServiceError> {
        let current = self.get_by_id(id)?;
        let mut candidate = current.clone();
        update.apply_to(&mut candidate);
        Self::check_candidate(&candidate)?;

        let new_code = update
            .code
            .as_ref()
            .filter(|code| **code != current.code)
            .cloned();
        if let Some(code) = &new_code {
            match self.codes.entry(code.clone()) {
                Entry::Occupied(_) => {
                    return Err(ServiceError::Conflict(format!(
                        "Coupon code {} already exists",
                        code
                    )))
                }
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
        }
        let release_reserved = || {
            if let Some(code) = &new_code {
                self.codes.remove_if(code, |_, owner| *owner == id);
            }
        };

        let now = Utc::now();
        let applied = match self.coupons.get_mut(&id) {
            Some(mut entry) => {
                // Re-apply onto the live record so concurrent redemptions are kept.
                // Redemptions also go through this entry guard, so the limit check
                // below sees the final used_count.
                let mut next = entry.value().clone();
                update.apply_to(&mut next);
                match next.usage_limit {
                    Some(limit) if limit < next.used_count => Err(ServiceError::ValidationError(
                        format!(
                            "usageLimit {} is below the {} redemptions already recorded",
                            limit, next.used_count
                        ),
                    )),
                    _ => {
                        let old_code = std::mem::replace(entry.value_mut(), next).code;
                        entry.updated_at = now;
                        entry.refresh_derived(now);
                        Ok((entry.value().clone(), old_code))
                    }
                }
            }
            None => Err(ServiceError::NotFound(format!("Coupon {} not found", id))),
        };
        let (updated, old_code) = match applied {
            Ok(pair) => pair,
            Err(e) => {
                release_reserved();
                return Err(e);
            }
        };

        if new_code.is_some() {
            self.codes.remove_if(&old_code, |_, owner| *owner == id);
        }

        info!(coupon_id = id, "coupon updated");
        self.event_sender.emit(Event::CouponUpdated(id)).await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        let (_, removed) = self
            .coupons
            .remove(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))?;
        self.codes.remove_if(&removed.code, |_, owner| *owner == id);

        warn!(coupon_id = id, code = %removed.code, "coupon deleted");
        self.event_sender.emit(Event::CouponDeleted(id)).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn toggle_active(&self, id: i64) -> Result<Coupon, ServiceError> {
        let toggled = {
            let mut entry = self
                .coupons
                .get_mut(&id)
                .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))?;
            let now = Utc::now();
            entry.is_active = !entry.is_active;
            entry.updated_at = now;
            entry.refresh_derived(now);
            entry.value().clone()
        };

        info!(coupon_id = id, is_active = toggled.is_active, "coupon toggled");
        self.event_sender
            .emit(Event::CouponToggled {
                coupon_id: id,
                is_active: toggled.is_active,
            })
            .await;
        Ok(toggled)
    }

    /// Counts one redemption against the coupon. Only the usage ledger calls this,
    /// and only while holding the coupon's redemption lock. The global limit is
    /// checked again under the entry guard, which also serializes admin updates.
    pub(crate) fn apply_redemption(
        &self,
        id: i64,
        discount_amount: Decimal,
    ) -> Result<Coupon, ServiceError> {
        let mut entry = self
            .coupons
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))?;
        if entry.usage_exhausted() {
            return Err(ServiceError::CouponRejected(
                RejectionReason::UsageLimitReached,
            ));
        }
        let total_discount = entry
            .total_discount
            .checked_add(discount_amount)
            .ok_or_else(|| ServiceError::InvalidInput("total discount is out of range".into()))?;

        let now = Utc::now();
        entry.used_count += 1;
        entry.total_used += 1;
        entry.total_discount = total_discount;
        entry.updated_at = now;
        entry.refresh_derived(now);
        Ok(entry.value().clone())
    }

    /// Runs the same checks as creation against an edited coupon.
    fn check_candidate(candidate: &Coupon) -> Result<(), ServiceError> {
        let edited = NewCoupon {
            code: candidate.code.clone(),
            template: Self::template_of(candidate),
        };
        edited.validate()?;
        edited.template.check_amounts()
    }

    fn template_of(coupon: &Coupon) -> CouponTemplate {
        CouponTemplate {
            title: coupon.title.clone(),
            description: coupon.description.clone(),
            discount_type: coupon.discount_type,
            value: coupon.value,
            max_discount: coupon.max_discount,
            min_order_amount: coupon.min_order_amount,
            usage_limit: coupon.usage_limit,
            user_limit: coupon.user_limit,
            applicable_categories: coupon.applicable_categories.clone(),
            applicable_farms: coupon.applicable_farms.clone(),
            valid_from: Some(coupon.valid_from),
            valid_until: coupon.valid_until,
            is_active: coupon.is_active,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events;
    use crate::models::DiscountType;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    pub(crate) fn registry() -> CouponRegistry {
        let (sender, rx) = events::channel(64);
        tokio::spawn(events::process_events(rx));
        CouponRegistry::new(Arc::new(sender))
    }

    pub(crate) fn template(discount_type: DiscountType, value: Decimal) -> CouponTemplate {
        CouponTemplate {
            title: "Harvest Weekend".into(),
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
            valid_until: Utc::now() + Duration::days(30),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids_and_derived_fields() {
        let registry = registry();
        let a = registry
            .create(template(DiscountType::Fixed, dec!(100)).with_code("A", "A"))
            .await
            .unwrap();
        let b = registry
            .create(template(DiscountType::Fixed, dec!(100)).with_code("B", "B"))
            .await
            .unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert!(a.can_use);
        assert!(!a.is_expired);
        assert_eq!(a.total_discount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn duplicate_code_conflicts() {
        let registry = registry();
        let t = template(DiscountType::Fixed, dec!(10));
        registry.create(t.with_code("DUP", "x")).await.unwrap();
        let err = registry.create(t.with_code("DUP", "y")).await.unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));
        assert_eq!(registry.list(None).len(), 1);
    }

    #[tokio::test]
    async fn codes_are_case_sensitive() {
        let registry = registry();
        let t = template(DiscountType::Fixed, dec!(10));
        registry.create(t.with_code("Summer", "x")).await.unwrap();
        registry.create(t.with_code("SUMMER", "y")).await.unwrap();
        assert!(registry.get_by_code("summer").is_err());
        assert_eq!(registry.get_by_code("SUMMER").unwrap().title, "y");
    }

    #[tokio::test]
    async fn inactive_coupon_is_invisible_to_code_lookup() {
        let registry = registry();
        let created = registry
            .create(template(DiscountType::Fixed, dec!(10)).with_code("OFF", "x"))
            .await
            .unwrap();
        let toggled = registry.toggle_active(created.id).await.unwrap();
        assert!(!toggled.is_active);
        assert!(!toggled.can_use);

        assert_matches!(registry.get_by_code("OFF"), Err(ServiceError::NotFound(_)));
        assert!(registry.get_by_id(created.id).is_ok());
        assert_eq!(registry.list(Some(false)).len(), 1);
        assert!(registry.list(Some(true)).is_empty());
    }

    #[tokio::test]
    async fn update_recomputes_expiry_and_reindexes_code() {
        let registry = registry();
        let created = registry
            .create(template(DiscountType::Fixed, dec!(10)).with_code("OLD", "x"))
            .await
            .unwrap();

        let updated = registry
            .update(
                created.id,
                CouponUpdate {
                    code: Some("NEW".into()),
                    valid_until: Some(Utc::now() - Duration::minutes(1)),
                    valid_from: Some(Utc::now() - Duration::days(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(updated.is_expired);
        assert!(!updated.can_use);
        assert!(registry.get_by_code("OLD").is_err());
        assert_eq!(registry.get_by_code("NEW").unwrap().id, created.id);
    }

    #[tokio::test]
    async fn update_to_taken_code_conflicts_and_keeps_original() {
        let registry = registry();
        let t = template(DiscountType::Fixed, dec!(10));
        registry.create(t.with_code("ONE", "x")).await.unwrap();
        let two = registry.create(t.with_code("TWO", "y")).await.unwrap();

        let err = registry
            .update(
                two.id,
                CouponUpdate {
                    code: Some("ONE".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Conflict(_));
        assert_eq!(registry.get_by_code("TWO").unwrap().id, two.id);
    }

    #[tokio::test]
    async fn invalid_update_is_rejected() {
        let registry = registry();
        let c = registry
            .create(template(DiscountType::Percentage, dec!(10)).with_code("P", "x"))
            .await
            .unwrap();
        let err = registry
            .update(
                c.id,
                CouponUpdate {
                    value: Some(dec!(150)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
        assert_eq!(registry.get_by_id(c.id).unwrap().value, dec!(10));
    }

    #[tokio::test]
    async fn delete_frees_the_code() {
        let registry = registry();
        let t = template(DiscountType::Fixed, dec!(10));
        let c = registry.create(t.with_code("GONE", "x")).await.unwrap();
        registry.delete(c.id).await.unwrap();

        assert_matches!(registry.get_by_id(c.id), Err(ServiceError::NotFound(_)));
        assert_matches!(registry.delete(c.id).await, Err(ServiceError::NotFound(_)));
        assert!(registry.create(t.with_code("GONE", "again")).await.is_ok());
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let registry = registry();
        assert_matches!(
            registry.update(9, CouponUpdate::default()).await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(registry.toggle_active(9).await, Err(ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn apply_redemption_accumulates_stats() {
        let registry = registry();
        let mut t = template(DiscountType::Fixed, dec!(10));
        t.usage_limit = Some(2);
        let c = registry.create(t.with_code("STATS", "x")).await.unwrap();

        registry.apply_redemption(c.id, dec!(10.00)).unwrap();
        let after = registry.apply_redemption(c.id, dec!(10.00)).unwrap();
        assert_eq!(after.used_count, 2);
        assert_eq!(after.total_used, 2);
        assert_eq!(after.total_discount, dec!(20.00));
        assert!(!after.can_use);
    }

    #[tokio::test]
    async fn usage_limit_cannot_drop_below_recorded_redemptions() {
        let registry = registry();
        let mut t = template(DiscountType::Fixed, dec!(10));
        t.usage_limit = Some(5);
        let c = registry.create(t.with_code("LIMIT", "x")).await.unwrap();
        for _ in 0..3 {
            registry.apply_redemption(c.id, dec!(10.00)).unwrap();
        }

        let lower = |limit| CouponUpdate {
            code: Some("LIMIT2".into()),
            usage_limit: Some(Some(limit)),
            ..Default::default()
        };
        let err = registry.update(c.id, lower(2)).await.unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
        let kept = registry.get_by_id(c.id).unwrap();
        assert_eq!(kept.usage_limit, Some(5));
        assert_eq!(kept.code, "LIMIT");
        assert!(registry.get_by_code("LIMIT2").is_err());

        let exact = registry.update(c.id, lower(3)).await.unwrap();
        assert_eq!(exact.usage_limit, Some(3));
        assert!(!exact.can_use);
        assert_eq!(registry.get_by_code("LIMIT2").unwrap().id, c.id);
    }

    #[tokio::test]
    async fn apply_redemption_refuses_an_exhausted_coupon() {
        let registry = registry();
        let mut t = template(DiscountType::Fixed, dec!(10));
        t.usage_limit = Some(1);
        let c = registry.create(t.with_code("ONCE", "x")).await.unwrap();

        registry.apply_redemption(c.id, dec!(10.00)).unwrap();
        assert_matches!(
            registry.apply_redemption(c.id, dec!(10.00)),
            Err(ServiceError::CouponRejected(RejectionReason::UsageLimitReached))
        );
        let stats = registry.get_by_id(c.id).unwrap();
        assert_eq!(stats.used_count, 1);
        assert_eq!(stats.total_discount, dec!(10.00));
    }

    #[tokio::test]
    async fn update_runs_the_creation_field_rules() {
        let registry = registry();
        let c = registry
            .create(template(DiscountType::Fixed, dec!(10)).with_code("RULES", "x"))
            .await
            .unwrap();

        let blank_title = CouponUpdate {
            title: Some(String::new()),
            ..Default::default()
        };
        assert_matches!(
            registry.update(c.id, blank_title).await,
            Err(ServiceError::ValidationError(_))
        );
        let long_code = CouponUpdate {
            code: Some("C".repeat(51)),
            ..Default::default()
        };
        assert_matches!(
            registry.update(c.id, long_code).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_eq!(registry.get_by_id(c.id).unwrap().title, "x");
    }

    #[tokio::test]
    async fn null_fields_clear_optional_settings() {
        let registry = registry();
        let mut t = template(DiscountType::Percentage, dec!(10));
        t.max_discount = Some(dec!(500));
        t.usage_limit = Some(10);
        t.applicable_farms = Some([4, 7].into_iter().collect());
        let c = registry.create(t.with_code("CLEAR", "x")).await.unwrap();

        let cleared = registry
            .update(
                c.id,
                CouponUpdate {
                    max_discount: Some(None),
                    usage_limit: Some(None),
                    applicable_farms: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.max_discount, None);
        assert_eq!(cleared.usage_limit, None);
        assert_eq!(cleared.applicable_farms, None);

        let untouched = registry
            .update(c.id, CouponUpdate::default())
            .await
            .unwrap();
        assert_eq!(untouched.value, dec!(10));
    }
}
