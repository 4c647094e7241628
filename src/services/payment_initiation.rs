//! Payment initiation: validate the order, open a payment attempt, push the
//! request to the gateway and record what it answered.

use crate::database::repository::{
    OrderStore, PaymentStore, ACTIVE_PAYMENT_CONSTRAINT, MERCHANT_REFERENCE_CONSTRAINT,
};
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use crate::payments::gateway::PaymentGateway;
use crate::payments::reference::generate_merchant_reference;
use crate::payments::types::{
    normalize_phone, NewPayment, Operator, Order, OrderPaymentStatus, OrderStatus, Payment,
    PaymentStatus,
};
use crate::payments::utils::mask_phone;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Extra attempts after a merchant reference collision
pub const REFERENCE_RETRIES: u32 = 3;

/// `INITIATING` attempts older than this were interrupted before their
/// gateway answer was recorded. Comfortably above the gateway request timeout.
pub const DEFAULT_STALE_INITIATION_SECS: i64 = 120;

pub type ReferenceGenerator = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,
    pub customer_phone: String,
    pub operator: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PaymentSummary {
    pub id: Uuid,
    pub reference: String,
    pub amount: i64,
    pub operator: Operator,
    pub status: PaymentStatus,
}

impl From<&Payment> for PaymentSummary {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            reference: payment.merchant_reference.clone(),
            amount: payment.amount,
            operator: payment.operator,
            status: payment.status,
        }
    }
}

/// Result of an initiation. A gateway rejection is a normal outcome with
/// `success = false`, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct InitiationOutcome {
    pub success: bool,
    pub payment: PaymentSummary,
    pub message: String,
    pub gateway_raw_response: String,
}

pub struct PaymentInitiationService {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    generate_reference: ReferenceGenerator,
    stale_initiation_after: chrono::Duration,
}

impl PaymentInitiationService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            orders,
            payments,
            gateway,
            generate_reference: Arc::new(generate_merchant_reference),
            stale_initiation_after: chrono::Duration::seconds(DEFAULT_STALE_INITIATION_SECS),
        }
    }

    pub fn with_reference_generator(mut self, generator: ReferenceGenerator) -> Self {
        self.generate_reference = generator;
        self
    }

    pub fn with_stale_initiation_after(mut self, after: chrono::Duration) -> Self {
        self.stale_initiation_after = after;
        self
    }

    pub async fn initiate(
        &self,
        user_id: Uuid,
        request: InitiatePaymentRequest,
    ) -> AppResult<InitiationOutcome> {
        let operator = Operator::from_str(&request.operator)?;
        let customer_phone = normalize_phone(&request.customer_phone)?;

        let order = self.payable_order(request.order_id, user_id).await?;

        let cutoff = chrono::Utc::now() - self.stale_initiation_after;
        let expired = self
            .payments
            .expire_stale_initiations(order.id, cutoff)
            .await?;
        if expired > 0 {
            warn!(
                order_id = %order.id,
                expired,
                "Expired interrupted payment attempts still INITIATING"
            );
        }

        if let Some(active) = self.payments.find_active_for_order(order.id).await? {
            return Err(payment_in_progress(order.id, &active.merchant_reference));
        }

        let payment = self.create_payment(&order, &customer_phone, operator).await?;
        let reference = payment.merchant_reference.clone();

        info!(
            payment_id = %payment.id,
            order_id = %order.id,
            reference = %reference,
            operator = %operator,
            amount = payment.amount,
            phone = %mask_phone(&customer_phone),
            "Payment attempt created"
        );

        // No store lock is held across the gateway call
        let gateway_result = match self
            .gateway
            .initiate(payment.amount, &reference, &customer_phone, operator)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let message = e.to_string();
                error!(reference = %reference, error = %message, "Gateway call could not be made");
                self.payments
                    .record_initiation_result(
                        payment.id,
                        PaymentStatus::Error,
                        &message,
                        Some(&message),
                    )
                    .await?;
                return Err(AppError::from(e).with_context(format!("payment {}", reference)));
            }
        };

        let status = if gateway_result.success {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Error
        };
        let error_message = (!gateway_result.success).then_some(gateway_result.raw_body.as_str());

        let payment = match self
            .payments
            .record_initiation_result(payment.id, status, &gateway_result.raw_body, error_message)
            .await?
        {
            Some(updated) => updated,
            None => {
                // A callback settled the attempt before the gateway answered us
                info!(reference = %reference, "Payment settled before initiation completed");
                self.payments
                    .find_by_reference(&reference)
                    .await?
                    .unwrap_or(payment)
            }
        };

        if !self
            .orders
            .mark_payment_processing(order.id, &reference)
            .await?
        {
            info!(
                order_id = %order.id,
                reference = %reference,
                "Order already settled, leaving payment status untouched"
            );
        }

        let message = if gateway_result.success {
            info!(reference = %reference, "Payment request accepted by gateway");
            "Payment request sent. Confirm the payment on your phone".to_string()
        } else {
            warn!(reference = %reference, "Payment request rejected by gateway");
            "The payment request was rejected by the mobile-money operator".to_string()
        };

        Ok(InitiationOutcome {
            success: gateway_result.success,
            payment: PaymentSummary::from(&payment),
            message,
            gateway_raw_response: gateway_result.raw_body,
        })
    }

    async fn payable_order(&self, order_id: Uuid, user_id: Uuid) -> AppResult<Order> {
        let order = self
            .orders
            .find_for_customer(order_id, user_id)
            .await?
            .ok_or_else(|| {
                AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
                    order_id: order_id.to_string(),
                }))
            })?;

        if order.payment_status == OrderPaymentStatus::Completed {
            return Err(AppError::new(AppErrorKind::Domain(DomainError::AlreadyPaid {
                order_id: order_id.to_string(),
            })));
        }

        if order.status == OrderStatus::Cancelled {
            return Err(AppError::new(AppErrorKind::Domain(
                DomainError::OrderNotPayable {
                    order_id: order_id.to_string(),
                    status: order.status.as_str().to_lowercase(),
                },
            )));
        }

        Ok(order)
    }

    /// Insert the INITIATING row, regenerating the reference on collision
    async fn create_payment(
        &self,
        order: &Order,
        customer_phone: &str,
        operator: Operator,
    ) -> AppResult<Payment> {
        for attempt in 0..=REFERENCE_RETRIES {
            let new_payment = NewPayment {
                order_id: order.id,
                merchant_reference: (self.generate_reference)(),
                amount: order.total_amount,
                customer_phone: customer_phone.to_string(),
                operator,
            };

            match self.payments.create_payment(&new_payment).await {
                Ok(payment) => return Ok(payment),
                Err(e) if e.is_unique_violation_on(MERCHANT_REFERENCE_CONSTRAINT) => {
                    warn!(
                        reference = %new_payment.merchant_reference,
                        attempt = attempt + 1,
                        "Merchant reference collision, regenerating"
                    );
                }
                Err(e) if e.is_unique_violation_on(ACTIVE_PAYMENT_CONSTRAINT) => {
                    // Lost a race with a concurrent initiation for the same order
                    let reference = self
                        .payments
                        .find_active_for_order(order.id)
                        .await?
                        .map(|p| p.merchant_reference)
                        .unwrap_or_default();
                    return Err(payment_in_progress(order.id, &reference));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::new(AppErrorKind::Domain(
            DomainError::DuplicateReference {
                attempts: REFERENCE_RETRIES + 1,
            },
        )))
    }
}

fn payment_in_progress(order_id: Uuid, reference: &str) -> AppError {
    AppError::new(AppErrorKind::Domain(DomainError::PaymentInProgress {
        order_id: order_id.to_string(),
        reference: reference.to_string(),
    }))
}
