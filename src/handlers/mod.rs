pub mod bookings;
pub mod coupons;
pub mod refunds;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{
    BookingPricingService, BulkCouponService, CouponRegistry, EligibilityValidator,
    FlatRateTaxPolicy, RefundService, UsageHistory, UsageLedger,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub coupons: Arc<CouponRegistry>,
    pub validator: Arc<EligibilityValidator>,
    pub usage: Arc<UsageLedger>,
    pub pricing: Arc<BookingPricingService>,
    pub bulk: Arc<BulkCouponService>,
    pub refunds: Arc<RefundService>,
}

impl AppServices {
    /// Wires fresh in-memory services together.
    pub fn new(config: &AppConfig, event_sender: Arc<EventSender>) -> Self {
        let coupons = Arc::new(CouponRegistry::new(event_sender.clone()));
        let history = Arc::new(UsageHistory::new());
        let validator = Arc::new(EligibilityValidator::new(coupons.clone(), history.clone()));
        let usage = Arc::new(UsageLedger::new(
            coupons.clone(),
            history,
            validator.clone(),
            event_sender.clone(),
        ));
        let pricing = Arc::new(BookingPricingService::new(
            validator.clone(),
            Arc::new(FlatRateTaxPolicy::new(config.default_tax_rate)),
        ));
        let bulk = Arc::new(BulkCouponService::new(
            coupons.clone(),
            config.bulk_max_coupons,
            config.bulk_concurrency,
            event_sender.clone(),
        ));
        let refunds = Arc::new(RefundService::new(event_sender));

        Self {
            coupons,
            validator,
            usage,
            pricing,
            bulk,
            refunds,
        }
    }
}
