use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{NewRefund, Refund, RefundStatus},
};

/// Optional filters for listing refunds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundFilter {
    pub status: Option<RefundStatus>,
    pub user_id: Option<i64>,
    pub booking_id: Option<i64>,
}

impl RefundFilter {
    fn matches(&self, refund: &Refund) -> bool {
        self.status.map_or(true, |s| refund.status == s)
            && self.user_id.map_or(true, |u| refund.user_id == u)
            && self.booking_id.map_or(true, |b| refund.booking_id == b)
    }
}

/// Service for managing refunds
#[derive(Debug)]
pub struct RefundService {
    refunds: DashMap<i64, Refund>,
    next_id: AtomicI64,
    event_sender: Arc<EventSender>,
}

impl RefundService {
    pub fn new(event_sender: Arc<EventSender>) -> Self {
        Self {
            refunds: DashMap::new(),
            next_id: AtomicI64::new(1),
            event_sender,
        }
    }

    /// Opens a refund. Amounts must satisfy the full/partial invariant.
    #[instrument(skip(self, new_refund), fields(booking_id = new_refund.booking_id))]
    pub async fn create(&self, new_refund: NewRefund) -> Result<Refund, ServiceError> {
        new_refund.validate()?;
        new_refund.check_amounts()?;

        let status = new_refund.status.unwrap_or(RefundStatus::Pending);
        if !matches!(status, RefundStatus::Pending | RefundStatus::Approved) {
            return Err(ServiceError::InvalidInput(format!(
                "refunds cannot be created as {}",
                status
            )));
        }

        let now = Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let refund = Refund {
            id,
            booking_id: new_refund.booking_id,
            user_id: new_refund.user_id,
            reason: new_refund.reason,
            refund_type: new_refund.refund_type,
            original_amount: new_refund.original_amount,
            refund_amount: new_refund.refund_amount,
            refund_method: new_refund.refund_method,
            status,
            processed_by: None,
            processed_at: None,
            notes: new_refund.notes,
            metadata: new_refund.metadata,
            created_at: now,
            updated_at: now,
        };
        self.refunds.insert(id, refund.clone());

        info!(refund_id = id, status = %status, amount = %refund.refund_amount, "refund created");
        self.event_sender
            .emit(Event::RefundCreated {
                refund_id: id,
                booking_id: refund.booking_id,
            })
            .await;
        Ok(refund)
    }

    pub fn get(&self, id: i64) -> Result<Refund, ServiceError> {
        self.refunds
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("Refund {} not found", id)))
    }

    /// Matching refunds, newest first.
    pub fn list(&self, filter: &RefundFilter) -> Vec<Refund> {
        let mut refunds: Vec<Refund> = self
            .refunds
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        refunds.sort_by(|a, b| b.id.cmp(&a.id));
        refunds
    }

    /// Moves a refund along its lifecycle. Transitions on one refund are serialized.
    #[instrument(skip(self, notes))]
    pub async fn update_status(
        &self,
        id: i64,
        new_status: RefundStatus,
        processed_by: Option<i64>,
        notes: Option<String>,
    ) -> Result<Refund, ServiceError> {
        let (updated, old_status) = {
            let mut entry = self
                .refunds
                .get_mut(&id)
                .ok_or_else(|| ServiceError::NotFound(format!("Refund {} not found", id)))?;

            let old_status = entry.status;
            if !old_status.can_transition_to(new_status) {
                warn!(refund_id = id, from = %old_status, to = %new_status, "illegal refund transition");
                return Err(ServiceError::InvalidTransition {
                    from: old_status,
                    to: new_status,
                });
            }

            let now = Utc::now();
            entry.status = new_status;
            if processed_by.is_some() {
                entry.processed_by = processed_by;
            }
            entry.processed_at = Some(now);
            if notes.is_some() {
                entry.notes = notes;
            }
            entry.updated_at = now;
            (entry.value().clone(), old_status)
        };

        info!(refund_id = id, from = %old_status, to = %new_status, "refund status updated");
        self.event_sender
            .emit(Event::RefundStatusChanged {
                refund_id: id,
                old_status,
                new_status,
                processed_by,
            })
            .await;
        Ok(updated)
    }
}
