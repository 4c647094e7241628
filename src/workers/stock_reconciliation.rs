use crate::config::WorkerConfig;
use crate::database::error::DatabaseError;
use crate::services::callback_reconciliation::{CallbackReconciliationService, StockReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct StockReconciliationConfig {
    pub interval: Duration,
    /// Markers with this many failed attempts are left for an operator
    pub max_attempts: i32,
    pub batch_size: i64,
}

impl Default for StockReconciliationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_attempts: 5,
            batch_size: 50,
        }
    }
}

impl From<&WorkerConfig> for StockReconciliationConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.stock_resume_interval_secs),
            max_attempts: config.stock_resume_max_attempts,
            batch_size: config.stock_resume_batch_size,
        }
    }
}

/// Re-applies stock adjustments that a crash or a failed write left PENDING
/// after their payment already reached SUCCESS.
pub struct StockReconciliationWorker {
    service: Arc<CallbackReconciliationService>,
    config: StockReconciliationConfig,
}

impl StockReconciliationWorker {
    pub fn new(
        service: Arc<CallbackReconciliationService>,
        config: StockReconciliationConfig,
    ) -> Self {
        Self { service, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            max_attempts = self.config.max_attempts,
            batch_size = self.config.batch_size,
            "stock reconciliation worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("stock reconciliation worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "stock reconciliation cycle failed");
                    }
                }
            }
        }

        info!("stock reconciliation worker stopped");
    }

    pub async fn run_cycle(&self) -> Result<StockReport, DatabaseError> {
        let report = self
            .service
            .resume_pending_adjustments(self.config.max_attempts, self.config.batch_size)
            .await?;

        if report != StockReport::default() {
            info!(
                applied = report.applied,
                discrepancies = report.discrepancies,
                failed = report.failed,
                skipped = report.skipped,
                "stock reconciliation cycle complete"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_follows_worker_settings() {
        let worker_config = WorkerConfig {
            stock_resume_interval_secs: 15,
            stock_resume_max_attempts: 3,
            stock_resume_batch_size: 7,
            ..WorkerConfig::default()
        };
        let config = StockReconciliationConfig::from(&worker_config);
        assert_eq!(config.interval, Duration::from_secs(15));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.batch_size, 7);
    }
}
