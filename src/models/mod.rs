pub mod booking;
pub mod bulk_operation;
pub mod coupon;
pub mod coupon_usage;
pub mod refund;

pub use booking::{AppliedCoupon, BookingCalculation};
pub use bulk_operation::{BulkCouponOperation, BulkItemError, BulkOperationStatus, BulkOperationType};
pub use coupon::{Coupon, CouponTemplate, CouponUpdate, DiscountType, NewCoupon};
pub use coupon_usage::CouponUsage;
pub use refund::{NewRefund, Refund, RefundMethod, RefundStatus, RefundType};
