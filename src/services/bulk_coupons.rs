use chrono::Utc;
use dashmap::DashMap;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use tracing::{info, instrument, warn};
use validator::Validate;

use super::coupons::CouponRegistry;
use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        BulkCouponOperation, BulkItemError, BulkOperationStatus, BulkOperationType, CouponTemplate,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkGenerateRequest {
    pub template: CouponTemplate,
    pub count: u32,
    pub prefix: String,
}

/// Code for the `index`-th coupon of a batch, e.g. `X0001`.
pub fn bulk_code(prefix: &str, index: u32) -> String {
    format!("{prefix}{index:04}")
}

/// Stamps many coupons out of one template.
///
/// Items are created independently; one failed code never aborts the batch.
#[derive(Debug)]
pub struct BulkCouponService {
    registry: Arc<CouponRegistry>,
    operations: DashMap<i64, BulkCouponOperation>,
    next_id: AtomicI64,
    max_coupons: u32,
    concurrency: usize,
    event_sender: Arc<EventSender>,
}

impl BulkCouponService {
    pub fn new(
        registry: Arc<CouponRegistry>,
        max_coupons: u32,
        concurrency: usize,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            registry,
            operations: DashMap::new(),
            next_id: AtomicI64::new(1),
            max_coupons,
            concurrency: concurrency.max(1),
            event_sender,
        }
    }

    #[instrument(skip(self, template), fields(title = %template.title))]
    pub async fn generate(
        &self,
        template: CouponTemplate,
        count: u32,
        prefix: &str,
    ) -> Result<BulkCouponOperation, ServiceError> {
        if count == 0 || count > self.max_coupons {
            return Err(ServiceError::InvalidInput(format!(
                "count must be between 1 and {}",
                self.max_coupons
            )));
        }
        if prefix.is_empty() {
            return Err(ServiceError::InvalidInput("prefix cannot be empty".into()));
        }
        template.validate()?;
        template.check_amounts()?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.operations.insert(
            id,
            BulkCouponOperation {
                id,
                operation_type: BulkOperationType::Generate,
                prefix: prefix.to_string(),
                total_coupons: count,
                processed_coupons: 0,
                failed_coupons: 0,
                status: BulkOperationStatus::Processing,
                template: template.clone(),
                errors: Vec::new(),
                created_at: Utc::now(),
                completed_at: None,
            },
        );

        let template = &template;
        stream::iter(1..=count)
            .map(|index| async move {
                let code = bulk_code(prefix, index);
                let title = format!("{} #{}", template.title, index);
                let outcome = self.registry.create(template.with_code(code.clone(), title)).await;
                (index, code, outcome)
            })
            .buffer_unordered(self.concurrency)
            .for_each(|(index, code, outcome)| async move {
                let Some(mut operation) = self.operations.get_mut(&id) else {
                    return;
                };
                match outcome {
                    Ok(_) => operation.processed_coupons += 1,
                    Err(e) => {
                        warn!(operation_id = id, %code, error = %e, "bulk item failed");
                        operation.failed_coupons += 1;
                        operation.errors.push(BulkItemError {
                            index,
                            code,
                            reason: e.to_string(),
                        });
                    }
                }
            })
            .await;

        let finished = {
            let mut operation = self.operations.get_mut(&id).ok_or_else(|| {
                ServiceError::InternalError(format!("bulk operation {} disappeared", id))
            })?;
            operation.errors.sort_by_key(|e| e.index);
            operation.status = BulkOperationStatus::Completed;
            operation.completed_at = Some(Utc::now());
            operation.value().clone()
        };

        info!(
            operation_id = id,
            processed = finished.processed_coupons,
            failed = finished.failed_coupons,
            "bulk generation completed"
        );
        self.event_sender
            .emit(Event::BulkGenerationCompleted {
                operation_id: id,
                processed: finished.processed_coupons,
                failed: finished.failed_coupons,
            })
            .await;
        Ok(finished)
    }

    pub fn get(&self, id: i64) -> Result<BulkCouponOperation, ServiceError> {
        self.operations
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("Bulk operation {} not found", id)))
    }

    /// Newest first.
    pub fn list(&self) -> Vec<BulkCouponOperation> {
        let mut operations: Vec<_> = self
            .operations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        operations.sort_by(|a, b| b.id.cmp(&a.id));
        operations
    }
}
