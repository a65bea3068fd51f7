use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::RefundStatus;

/// Things that happened to coupons and refunds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Coupon admin events
    CouponCreated { coupon_id: i64, code: String },
    CouponUpdated(i64),
    CouponDeleted(i64),
    CouponToggled { coupon_id: i64, is_active: bool },

    // Redemption
    CouponRedeemed {
        coupon_id: i64,
        user_id: i64,
        booking_id: i64,
        discount_amount: Decimal,
    },

    BulkGenerationCompleted {
        operation_id: i64,
        processed: u32,
        failed: u32,
    },

    // Refund events
    RefundCreated { refund_id: i64, booking_id: i64 },
    RefundStatusChanged {
        refund_id: i64,
        old_status: RefundStatus,
        new_status: RefundStatus,
        processed_by: Option<i64>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// True once the processing loop has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Sends an event, logging instead of failing when nobody is listening.
    pub async fn emit(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
        }
    }
}

/// Sender plus receiver pair with the given capacity.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CouponRedeemed {
                coupon_id,
                user_id,
                booking_id,
                discount_amount,
            } => {
                info!(
                    coupon_id,
                    user_id,
                    booking_id,
                    discount = %discount_amount,
                    "coupon redeemed"
                );
            }
            Event::BulkGenerationCompleted {
                operation_id,
                processed,
                failed,
            } => {
                if *failed > 0 {
                    warn!(operation_id, processed, failed, "bulk generation finished with failures");
                } else {
                    info!(operation_id, processed, "bulk generation finished");
                }
            }
            Event::RefundStatusChanged {
                refund_id,
                old_status,
                new_status,
                processed_by,
            } => {
                info!(
                    refund_id,
                    from = %old_status,
                    to = %new_status,
                    processed_by = ?processed_by,
                    "refund status changed"
                );
            }
            other => debug!(event = ?other, "event received"),
        }
    }

    info!("Event processing loop stopped");
}
