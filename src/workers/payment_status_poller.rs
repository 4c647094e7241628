use crate::config::WorkerConfig;
use crate::database::error::DatabaseError;
use crate::database::repository::PaymentStore;
use crate::payments::callback::{parse_callback, CallbackResult, STATUT_SUCCESS};
use crate::payments::error::PaymentError;
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::Payment;
use crate::services::callback_reconciliation::{
    CallbackAck, CallbackReconciliationService, ReconciliationError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone)]
pub struct PaymentStatusPollerConfig {
    pub interval: Duration,
    /// PENDING payments younger than this are left to the callback
    pub grace_period: chrono::Duration,
    /// Gateway queries per payment before the poller gives up on it
    pub max_attempts: i32,
    pub batch_size: i64,
    pub lookback_days: u32,
}

impl Default for PaymentStatusPollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            grace_period: chrono::Duration::seconds(300),
            max_attempts: 10,
            batch_size: 50,
            lookback_days: 1,
        }
    }
}

impl PaymentStatusPollerConfig {
    pub fn new(workers: &WorkerConfig, lookback_days: u32) -> Self {
        Self {
            interval: Duration::from_secs(workers.status_poll_interval_secs),
            grace_period: chrono::Duration::seconds(workers.status_poll_grace_secs),
            max_attempts: workers.status_poll_max_attempts,
            batch_size: workers.status_poll_batch_size,
            lookback_days,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub checked: usize,
    pub reconciled: usize,
    pub still_pending: usize,
    pub exhausted: usize,
}

/// Asks the gateway about payments whose callback never arrived and feeds
/// any final answer through callback reconciliation.
pub struct PaymentStatusPoller {
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    reconciliation: Arc<CallbackReconciliationService>,
    config: PaymentStatusPollerConfig,
}

impl PaymentStatusPoller {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        reconciliation: Arc<CallbackReconciliationService>,
        config: PaymentStatusPollerConfig,
    ) -> Self {
        Self {
            payments,
            gateway,
            reconciliation,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            grace_secs = self.config.grace_period.num_seconds(),
            max_attempts = self.config.max_attempts,
            gateway = self.gateway.name(),
            "payment status poller started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("payment status poller stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "payment status poll cycle failed");
                    }
                }
            }
        }

        info!("payment status poller stopped");
    }

    pub async fn run_cycle(&self) -> Result<PollReport, PollerError> {
        let cutoff = chrono::Utc::now() - self.config.grace_period;
        // Exhausted payments are filtered out by the store and polled ones
        // move to the back, so a full batch never starves newer payments.
        let pending = self
            .payments
            .list_pending_older_than(cutoff, self.config.max_attempts, self.config.batch_size)
            .await?;

        let mut report = PollReport::default();

        for payment in pending {
            let attempt = self.payments.record_status_poll(payment.id).await?;
            report.checked += 1;

            match self.poll_payment(&payment).await {
                Ok(true) => {
                    report.reconciled += 1;
                    continue;
                }
                Ok(false) => report.still_pending += 1,
                Err(e) => {
                    report.still_pending += 1;
                    warn!(
                        reference = %payment.merchant_reference,
                        error = %e,
                        "status poll failed"
                    );
                }
            }

            if attempt >= self.config.max_attempts {
                report.exhausted += 1;
                warn!(
                    reference = %payment.merchant_reference,
                    attempts = attempt,
                    "gateway never reported a final status; giving up polling"
                );
            }
        }

        if report.checked > 0 {
            info!(
                checked = report.checked,
                reconciled = report.reconciled,
                still_pending = report.still_pending,
                exhausted = report.exhausted,
                "payment status poll cycle complete"
            );
        }

        Ok(report)
    }

    /// Returns true when the payment was driven to a final state
    async fn poll_payment(&self, payment: &Payment) -> Result<bool, ReconciliationError> {
        let response = match self
            .gateway
            .query_status(
                &payment.merchant_reference,
                payment.operator,
                self.config.lookback_days,
            )
            .await
        {
            Ok(response) => response,
            Err(PaymentError::TokenUnavailable { operator }) => {
                debug!(
                    operator = %operator.as_str(),
                    "no session token yet; skipping status query"
                );
                return Ok(false);
            }
            Err(e) => {
                warn!(
                    reference = %payment.merchant_reference,
                    error = %e,
                    "status query could not be sent"
                );
                return Ok(false);
            }
        };

        if !response.success {
            return Ok(false);
        }

        let Some(result) = final_result(&response.raw_body) else {
            return Ok(false);
        };

        if result.reference != payment.merchant_reference {
            warn!(
                expected = %payment.merchant_reference,
                received = %result.reference,
                "status response is for another reference"
            );
            return Ok(false);
        }

        match self.reconciliation.reconcile(&result).await? {
            CallbackAck::Processed { status, .. } => {
                info!(
                    reference = %payment.merchant_reference,
                    status = %status.as_str(),
                    "payment reconciled from status query"
                );
            }
            CallbackAck::Duplicate { .. } => {
                debug!(reference = %payment.merchant_reference, "payment already reconciled");
            }
        }
        Ok(true)
    }
}

/// The `<result>` element of a status response, when it reports a completed payment.
/// Anything else is treated as not final yet.
pub fn final_result(raw_body: &str) -> Option<CallbackResult> {
    let start = raw_body.find("<result")?;
    let end = raw_body.rfind("</result>")? + "</result>".len();
    if end <= start {
        return None;
    }

    let result = parse_callback(&raw_body[start..end]).ok()?;
    (result.statut == STATUT_SUCCESS).then_some(result)
}
