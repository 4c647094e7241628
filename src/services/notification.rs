use crate::payments::types::Payment;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Tracing target operators alert on for inventory divergence
pub const STOCK_DISCREPANCY_TARGET: &str = "stock_discrepancy";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationType {
    PaymentConfirmed,
    PaymentFailed,
    StockDiscrepancy,
    /// A stock adjustment kept failing and the resume worker gave up
    StockAdjustmentStuck,
}

/// Operator-facing alerts, emitted as structured log events
#[derive(Debug, Default)]
pub struct NotificationService {
    discrepancies: AtomicU64,
}

impl NotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payment_settled(&self, payment: &Payment, notification_type: NotificationType) {
        match notification_type {
            NotificationType::PaymentConfirmed => info!(
                payment_id = %payment.id,
                order_id = %payment.order_id,
                reference = %payment.merchant_reference,
                amount = payment.amount,
                operator = %payment.operator,
                "🔔 NOTIFICATION: Payment confirmed"
            ),
            NotificationType::PaymentFailed => warn!(
                payment_id = %payment.id,
                order_id = %payment.order_id,
                reference = %payment.merchant_reference,
                reason = payment.error_message.as_deref().unwrap_or("unknown"),
                "🔔 NOTIFICATION: Payment failed"
            ),
            other => warn!(
                notification_type = ?other,
                reference = %payment.merchant_reference,
                "Unexpected notification type for a settled payment"
            ),
        }
    }

    /// Money was received but stock could not be decremented
    pub fn stock_discrepancy(
        &self,
        reference: Option<&str>,
        payment_id: Uuid,
        product_id: Uuid,
        detail: &str,
    ) {
        self.discrepancies.fetch_add(1, Ordering::Relaxed);
        error!(
            target: STOCK_DISCREPANCY_TARGET,
            notification_type = ?NotificationType::StockDiscrepancy,
            reference = reference.unwrap_or("-"),
            payment_id = %payment_id,
            product_id = %product_id,
            detail = %detail,
            "Stock discrepancy: paid order could not be fulfilled from stock"
        );
    }

    pub fn stock_adjustment_stuck(
        &self,
        payment_id: Uuid,
        product_id: Uuid,
        attempts: i32,
        last_error: &str,
    ) {
        self.discrepancies.fetch_add(1, Ordering::Relaxed);
        error!(
            target: STOCK_DISCREPANCY_TARGET,
            notification_type = ?NotificationType::StockAdjustmentStuck,
            payment_id = %payment_id,
            product_id = %product_id,
            attempts,
            last_error = %last_error,
            "Stock adjustment abandoned after repeated failures"
        );
    }

    /// Alerts raised on the discrepancy channel since startup
    pub fn discrepancy_count(&self) -> u64 {
        self.discrepancies.load(Ordering::Relaxed)
    }
}
