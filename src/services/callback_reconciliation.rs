//! Callback reconciliation
//!
//! Turns a gateway callback into the final payment state, mirrors it on the
//! order and moves stock for successful payments. Every step is idempotent:
//! redelivering a callback never changes stored values twice.

use crate::database::error::DatabaseError;
use crate::database::repository::{
    AdjustmentResult, CallbackUpdate, PaymentStore, ReconciliationStore, TokenStore,
    TransitionResult,
};
use crate::payments::callback::{parse_callback, CallbackError, CallbackResult};
use crate::payments::types::{PaymentOutcome, PaymentStatus, StockAdjustment};
use crate::services::notification::{NotificationService, NotificationType};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("callback body has no result element")]
    MissingPayload,

    #[error("malformed callback: {0}")]
    MalformedPayload(String),

    #[error("no payment with reference {reference}")]
    PaymentNotFound { reference: String },

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ReconciliationError {
    pub fn http_status_code(&self) -> u16 {
        match self {
            ReconciliationError::MissingPayload => 400,
            ReconciliationError::MalformedPayload(_) => 400,
            ReconciliationError::PaymentNotFound { .. } => 404,
            // Non-200 makes the gateway redeliver
            ReconciliationError::Database(_) => 500,
        }
    }
}

impl From<CallbackError> for ReconciliationError {
    fn from(err: CallbackError) -> Self {
        match err {
            CallbackError::MissingPayload => ReconciliationError::MissingPayload,
            CallbackError::MalformedPayload(reason) => ReconciliationError::MalformedPayload(reason),
        }
    }
}

/// Per-callback stock movement summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockReport {
    pub applied: usize,
    pub discrepancies: usize,
    /// Left PENDING for the resume worker
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAck {
    /// This delivery moved the payment to its final state
    Processed {
        reference: String,
        status: PaymentStatus,
        stock: StockReport,
    },
    /// The payment was already terminal; nothing was rewritten
    Duplicate {
        reference: String,
        status: PaymentStatus,
    },
}

pub struct CallbackReconciliationService {
    payments: Arc<dyn PaymentStore>,
    reconciliation: Arc<dyn ReconciliationStore>,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<NotificationService>,
}

impl CallbackReconciliationService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        reconciliation: Arc<dyn ReconciliationStore>,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<NotificationService>,
    ) -> Self {
        Self {
            payments,
            reconciliation,
            tokens,
            notifier,
        }
    }

    /// Parse a raw callback body and reconcile it
    pub async fn handle_callback(&self, raw_body: &str) -> Result<CallbackAck, ReconciliationError> {
        let callback = parse_callback(raw_body).map_err(|e| {
            warn!(error = %e, "Rejected callback body");
            ReconciliationError::from(e)
        })?;

        self.reconcile(&callback).await
    }

    pub async fn reconcile(
        &self,
        callback: &CallbackResult,
    ) -> Result<CallbackAck, ReconciliationError> {
        let reference = callback.reference.as_str();

        let payment = self
            .payments
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| {
                warn!(reference = %reference, "Callback for unknown payment reference");
                ReconciliationError::PaymentNotFound {
                    reference: reference.to_string(),
                }
            })?;

        if let Some(token) = &callback.token {
            match self.tokens.set(payment.operator, token).await {
                Ok(()) => debug!(operator = %payment.operator, "Gateway session token refreshed"),
                Err(e) => warn!(
                    operator = %payment.operator,
                    error = %e,
                    "Failed to store gateway session token, continuing"
                ),
            }
        }

        if let Some(amount) = callback.amount {
            if amount != payment.amount {
                warn!(
                    reference = %reference,
                    expected = payment.amount,
                    reported = amount,
                    "Callback amount differs from payment amount"
                );
            }
        }

        let outcome = callback.outcome();
        let update = CallbackUpdate {
            outcome,
            fees: callback.fees,
            callback_payload: callback.raw.clone(),
            error_message: match outcome {
                PaymentOutcome::Success => None,
                PaymentOutcome::Failed => Some(
                    callback
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("gateway statut {}", callback.statut)),
                ),
            },
        };

        match self.reconciliation.apply_outcome(reference, &update).await? {
            TransitionResult::NotFound => Err(ReconciliationError::PaymentNotFound {
                reference: reference.to_string(),
            }),
            TransitionResult::AlreadyTerminal { payment } => {
                info!(
                    reference = %reference,
                    status = %payment.status,
                    "Duplicate callback for settled payment ignored"
                );

                if payment.status == PaymentStatus::Success {
                    // Finish stock work a previous delivery could not complete
                    let leftover = self
                        .reconciliation
                        .pending_adjustments_for_payment(payment.id)
                        .await?;
                    if !leftover.is_empty() {
                        self.apply_adjustments(Some(reference), &leftover).await;
                    }
                }

                Ok(CallbackAck::Duplicate {
                    reference: reference.to_string(),
                    status: payment.status,
                })
            }
            TransitionResult::Applied {
                payment,
                adjustments,
            } => {
                info!(
                    reference = %reference,
                    order_id = %payment.order_id,
                    status = %payment.status,
                    fees = ?payment.fees,
                    "Payment settled by callback"
                );

                let stock = match outcome {
                    PaymentOutcome::Success => {
                        self.notifier
                            .payment_settled(&payment, NotificationType::PaymentConfirmed);
                        self.apply_adjustments(Some(reference), &adjustments).await
                    }
                    PaymentOutcome::Failed => {
                        self.notifier
                            .payment_settled(&payment, NotificationType::PaymentFailed);
                        StockReport::default()
                    }
                };

                Ok(CallbackAck::Processed {
                    reference: reference.to_string(),
                    status: payment.status,
                    stock,
                })
            }
        }
    }

    /// Apply each marker in its own store transaction. A failure on one
    /// product leaves it PENDING and does not stop the others.
    async fn apply_adjustments(
        &self,
        reference: Option<&str>,
        adjustments: &[StockAdjustment],
    ) -> StockReport {
        let mut report = StockReport::default();

        for adjustment in adjustments {
            match self
                .reconciliation
                .apply_stock_adjustment(adjustment.payment_id, adjustment.product_id)
                .await
            {
                Ok(AdjustmentResult::Applied {
                    stock_after,
                    sales_after,
                }) => {
                    report.applied += 1;
                    debug!(
                        product_id = %adjustment.product_id,
                        quantity = adjustment.quantity,
                        stock_after,
                        sales_after,
                        "Stock decremented"
                    );
                }
                Ok(AdjustmentResult::Insufficient {
                    available,
                    requested,
                }) => {
                    report.discrepancies += 1;
                    self.notifier.stock_discrepancy(
                        reference,
                        adjustment.payment_id,
                        adjustment.product_id,
                        &format!("{} available, {} requested", available, requested),
                    );
                }
                Ok(AdjustmentResult::ProductMissing) => {
                    report.discrepancies += 1;
                    self.notifier.stock_discrepancy(
                        reference,
                        adjustment.payment_id,
                        adjustment.product_id,
                        "product no longer exists",
                    );
                }
                Ok(AdjustmentResult::AlreadyProcessed(state)) => {
                    report.skipped += 1;
                    debug!(
                        product_id = %adjustment.product_id,
                        state = state.as_str(),
                        "Stock adjustment already processed"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    error!(
                        payment_id = %adjustment.payment_id,
                        product_id = %adjustment.product_id,
                        error = %e,
                        "Stock adjustment failed, left pending"
                    );
                    if let Err(record_err) = self
                        .reconciliation
                        .record_adjustment_failure(
                            adjustment.payment_id,
                            adjustment.product_id,
                            &e.to_string(),
                        )
                        .await
                    {
                        error!(error = %record_err, "Failed to record stock adjustment failure");
                    }
                }
            }
        }

        report
    }

    /// Retry PENDING stock markers left behind by earlier failures.
    /// Markers that reach `max_attempts` raise an alert and are no longer picked up.
    pub async fn resume_pending_adjustments(
        &self,
        max_attempts: i32,
        batch_size: i64,
    ) -> Result<StockReport, DatabaseError> {
        let pending = self
            .reconciliation
            .list_pending_adjustments(max_attempts, batch_size)
            .await?;

        if pending.is_empty() {
            return Ok(StockReport::default());
        }

        info!(count = pending.len(), "Resuming pending stock adjustments");
        let report = self.apply_adjustments(None, &pending).await;

        if report.failed > 0 {
            // Attempts were bumped by apply_adjustments; alert on the exhausted ones
            for adjustment in &pending {
                if adjustment.attempts + 1 >= max_attempts {
                    let still_pending = self
                        .reconciliation
                        .pending_adjustments_for_payment(adjustment.payment_id)
                        .await?
                        .into_iter()
                        .find(|a| {
                            a.product_id == adjustment.product_id && a.attempts >= max_attempts
                        });
                    if let Some(stuck) = still_pending {
                        self.notifier.stock_adjustment_stuck(
                            stuck.payment_id,
                            stuck.product_id,
                            stuck.attempts,
                            stuck.last_error.as_deref().unwrap_or("unknown"),
                        );
                    }
                }
            }
        }

        Ok(report)
    }
}
