use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use strum::{AsRefStr, Display, EnumString};
use validator::Validate;

use crate::{errors::ServiceError, services::discount::MAX_MONEY_AMOUNT};

/// How a coupon's `value` is interpreted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiscountType {
    /// `value` is a percentage of the booking amount, optionally capped by `max_discount`.
    Percentage,
    /// `value` is a flat amount.
    Fixed,
}

/// A redeemable discount rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: i64,
    /// Unique, case-sensitive redemption code.
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: Decimal,
    /// Cap on the computed discount; only meaningful for percentage coupons.
    pub max_discount: Option<Decimal>,
    /// Floor on the booking subtotal.
    pub min_order_amount: Option<Decimal>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub user_limit: Option<u32>,
    pub applicable_categories: Option<BTreeSet<i64>>,
    pub applicable_farms: Option<BTreeSet<i64>>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub total_used: u32,
    pub total_discount: Decimal,
    pub is_expired: bool,
    pub can_use: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    /// True once `used_count` has reached a configured global limit.
    pub fn usage_exhausted(&self) -> bool {
        matches!(self.usage_limit, Some(limit) if self.used_count >= limit)
    }

    pub fn applies_to_category(&self, category_id: i64) -> bool {
        self.applicable_categories
            .as_ref()
            .map_or(true, |set| set.contains(&category_id))
    }

    pub fn applies_to_farm(&self, farm_id: i64) -> bool {
        self.applicable_farms
            .as_ref()
            .map_or(true, |set| set.contains(&farm_id))
    }

    /// Recomputes `is_expired` and `can_use` against `now`.
    pub fn refresh_derived(&mut self, now: DateTime<Utc>) {
        self.is_expired = self.is_expired_at(now);
        self.can_use = self.is_active && !self.is_expired && !self.usage_exhausted();
    }

    /// Copy of the coupon with derived fields recomputed for `now`.
    pub fn refreshed(mut self, now: DateTime<Utc>) -> Self {
        self.refresh_derived(now);
        self
    }
}

/// The shape stamped onto a coupon: everything except its code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CouponTemplate {
    #[validate(length(min = 1, max = 200, message = "Title cannot be empty"))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub value: Decimal,
    #[serde(default)]
    pub max_discount: Option<Decimal>,
    #[serde(default)]
    pub min_order_amount: Option<Decimal>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub user_limit: Option<u32>,
    #[serde(default)]
    pub applicable_categories: Option<BTreeSet<i64>>,
    #[serde(default)]
    pub applicable_farms: Option<BTreeSet<i64>>,
    /// Defaults to the creation instant.
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl CouponTemplate {
    /// Checks the monetary and date constraints the derive cannot express.
    pub fn check_amounts(&self) -> Result<(), ServiceError> {
        if self.value.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "value must not be negative".into(),
            ));
        }
        if self.value > MAX_MONEY_AMOUNT {
            return Err(ServiceError::ValidationError(format!(
                "value must not exceed {}",
                MAX_MONEY_AMOUNT
            )));
        }
        if self.discount_type == DiscountType::Percentage && self.value > Decimal::ONE_HUNDRED {
            return Err(ServiceError::ValidationError(
                "percentage value must not exceed 100".into(),
            ));
        }
        for (field, amount) in [
            ("maxDiscount", self.max_discount),
            ("minOrderAmount", self.min_order_amount),
        ] {
            if matches!(amount, Some(a) if a.is_sign_negative()) {
                return Err(ServiceError::ValidationError(format!(
                    "{field} must not be negative"
                )));
            }
            if matches!(amount, Some(a) if a > MAX_MONEY_AMOUNT) {
                return Err(ServiceError::ValidationError(format!(
                    "{field} must not exceed {MAX_MONEY_AMOUNT}"
                )));
            }
        }
        if let Some(from) = self.valid_from {
            if from > self.valid_until {
                return Err(ServiceError::ValidationError(
                    "validFrom must not be after validUntil".into(),
                ));
            }
        }
        Ok(())
    }

    /// Pairs the template with a concrete code.
    pub fn with_code(&self, code: impl Into<String>, title: impl Into<String>) -> NewCoupon {
        NewCoupon {
            code: code.into(),
            template: CouponTemplate {
                title: title.into(),
                ..self.clone()
            },
        }
    }
}

/// Input for creating a single coupon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCoupon {
    #[validate(length(min = 1, max = 50, message = "Code must be 1-50 characters"))]
    pub code: String,
    #[serde(flatten)]
    #[validate]
    pub template: CouponTemplate,
}

/// Reads a present JSON field as `Some`, so `null` becomes `Some(None)`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update; absent fields are left untouched.
///
/// Optional restrictions use a nested `Option`: `Some(None)` (JSON `null`)
/// clears the restriction, `Some(Some(v))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CouponUpdate {
    pub code: Option<String>,
    pub title: Option<String>,
    #[serde(deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(rename = "type")]
    pub discount_type: Option<DiscountType>,
    pub value: Option<Decimal>,
    #[serde(deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub max_discount: Option<Option<Decimal>>,
    #[serde(deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub min_order_amount: Option<Option<Decimal>>,
    #[serde(deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<Option<u32>>,
    #[serde(deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub user_limit: Option<Option<u32>>,
    #[serde(deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub applicable_categories: Option<Option<BTreeSet<i64>>>,
    #[serde(deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub applicable_farms: Option<Option<BTreeSet<i64>>>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

impl CouponUpdate {
    /// Applies the present fields to `coupon`. Counters and stats are never touched.
    pub fn apply_to(&self, coupon: &mut Coupon) {
        if let Some(code) = &self.code {
            coupon.code = code.clone();
        }
        if let Some(title) = &self.title {
            coupon.title = title.clone();
        }
        if let Some(description) = &self.description {
            coupon.description = description.clone();
        }
        if let Some(discount_type) = self.discount_type {
            coupon.discount_type = discount_type;
        }
        if let Some(value) = self.value {
            coupon.value = value;
        }
        if let Some(max_discount) = self.max_discount {
            coupon.max_discount = max_discount;
        }
        if let Some(min_order_amount) = self.min_order_amount {
            coupon.min_order_amount = min_order_amount;
        }
        if let Some(usage_limit) = self.usage_limit {
            coupon.usage_limit = usage_limit;
        }
        if let Some(user_limit) = self.user_limit {
            coupon.user_limit = user_limit;
        }
        if let Some(categories) = &self.applicable_categories {
            coupon.applicable_categories = categories.clone();
        }
        if let Some(farms) = &self.applicable_farms {
            coupon.applicable_farms = farms.clone();
        }
        if let Some(valid_from) = self.valid_from {
            coupon.valid_from = valid_from;
        }
        if let Some(valid_until) = self.valid_until {
            coupon.valid_until = valid_until;
        }
        if let Some(is_active) = self.is_active {
            coupon.is_active = is_active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn template() -> CouponTemplate {
        CouponTemplate {
            title: "Monsoon".into(),
            description: None,
            discount_type: DiscountType::Percentage,
            value: dec!(20),
            max_discount: Some(dec!(500)),
            min_order_amount: None,
            usage_limit: Some(2),
            user_limit: None,
            applicable_categories: None,
            applicable_farms: None,
            valid_from: None,
            valid_until: Utc::now() + Duration::days(7),
            is_active: true,
        }
    }

    #[test]
    fn deserializes_admin_payload() {
        let json = serde_json::json!({
            "code": "WELCOME20",
            "title": "Welcome",
            "type": "percentage",
            "value": "20",
            "maxDiscount": "500",
            "minOrderAmount": "100",
            "validUntil": "2030-01-01T00:00:00Z"
        });
        let coupon: NewCoupon = serde_json::from_value(json).unwrap();
        assert_eq!(coupon.code, "WELCOME20");
        assert_eq!(coupon.template.discount_type, DiscountType::Percentage);
        assert_eq!(coupon.template.max_discount, Some(dec!(500)));
        assert!(coupon.template.is_active);
        assert!(coupon.validate().is_ok());
    }

    #[test]
    fn empty_code_fails_validation() {
        let coupon = template().with_code("", "Monsoon");
        assert!(coupon.validate().is_err());
    }

    #[test]
    fn negative_value_is_rejected() {
        let mut t = template();
        t.value = dec!(-1);
        assert!(t.check_amounts().is_err());
    }

    #[test]
    fn percentage_above_hundred_is_rejected() {
        let mut t = template();
        t.value = dec!(101);
        assert!(t.check_amounts().is_err());
        t.discount_type = DiscountType::Fixed;
        assert!(t.check_amounts().is_ok());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut t = template();
        t.valid_from = Some(t.valid_until + Duration::seconds(1));
        assert!(t.check_amounts().is_err());
    }

    #[test]
    fn missing_restriction_lists_apply_to_everything() {
        let now = Utc::now();
        let mut coupon = Coupon {
            id: 1,
            code: "X".into(),
            title: "X".into(),
            description: None,
            discount_type: DiscountType::Fixed,
            value: dec!(10),
            max_discount: None,
            min_order_amount: None,
            usage_limit: Some(1),
            used_count: 0,
            user_limit: None,
            applicable_categories: None,
            applicable_farms: Some([3].into_iter().collect()),
            valid_from: now,
            valid_until: now + Duration::days(1),
            is_active: true,
            total_used: 0,
            total_discount: Decimal::ZERO,
            is_expired: false,
            can_use: false,
            created_at: now,
            updated_at: now,
        };
        assert!(coupon.applies_to_category(42));
        assert!(coupon.applies_to_farm(3));
        assert!(!coupon.applies_to_farm(4));

        coupon.refresh_derived(now);
        assert!(coupon.can_use);
        coupon.used_count = 1;
        coupon.refresh_derived(now);
        assert!(!coupon.can_use);
        assert!(!coupon.is_expired);
        assert!(coupon.is_expired_at(now + Duration::days(2)));
    }

    #[test]
    fn update_tells_null_apart_from_absent() {
        let update: CouponUpdate = serde_json::from_str(
            r#"{"maxDiscount": null, "usageLimit": 40, "applicableFarms": null}"#,
        )
        .unwrap();
        assert_eq!(update.max_discount, Some(None));
        assert_eq!(update.usage_limit, Some(Some(40)));
        assert_eq!(update.applicable_farms, Some(None));
        assert_eq!(update.min_order_amount, None);
        assert_eq!(update.description, None);
    }
}
