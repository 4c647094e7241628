use crate::database::repository::PaymentStore;
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use crate::payments::types::{OrderPaymentStatus, OrderStatus, PaymentStatusView};
use crate::services::payment_initiation::PaymentSummary;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Shopper-facing status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusResponse {
    pub payment: PaymentSummary,
    pub fees: Option<i64>,
    pub error_message: Option<String>,
    pub order_id: Uuid,
    pub order_status: OrderStatus,
    pub order_payment_status: OrderPaymentStatus,
    pub order_total: i64,
    pub updated_at: String,
}

impl From<PaymentStatusView> for PaymentStatusResponse {
    fn from(view: PaymentStatusView) -> Self {
        Self {
            payment: PaymentSummary::from(&view.payment),
            fees: view.payment.fees,
            error_message: view.payment.error_message.clone(),
            order_id: view.payment.order_id,
            order_status: view.order_status,
            order_payment_status: view.order_payment_status,
            order_total: view.order_total,
            updated_at: view.payment.updated_at.to_rfc3339(),
        }
    }
}

pub struct PaymentStatusService {
    payments: Arc<dyn PaymentStore>,
}

impl PaymentStatusService {
    pub fn new(payments: Arc<dyn PaymentStore>) -> Self {
        Self { payments }
    }

    /// Payments on other customers' orders are reported as not found
    pub async fn get_status(
        &self,
        reference: &str,
        user_id: Uuid,
    ) -> AppResult<PaymentStatusView> {
        self.payments
            .find_status_for_user(reference, user_id)
            .await?
            .ok_or_else(|| {
                AppError::new(AppErrorKind::Domain(DomainError::PaymentNotFound {
                    reference: reference.to_string(),
                }))
            })
    }
}
