use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::payment_repository::{PaymentRow, PAYMENT_COLUMNS};
use crate::database::repository::{
    AdjustmentResult, CallbackUpdate, ReconciliationStore, TransitionResult,
};
use crate::payments::types::{AdjustmentState, Payment, PaymentOutcome, StockAdjustment};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

const ADJUSTMENT_COLUMNS: &str = "payment_id, product_id, quantity, state, attempts, last_error";

#[derive(Debug, FromRow)]
struct AdjustmentRow {
    payment_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    state: String,
    attempts: i32,
    last_error: Option<String>,
}

impl TryFrom<AdjustmentRow> for StockAdjustment {
    type Error = DatabaseError;

    fn try_from(row: AdjustmentRow) -> Result<Self, Self::Error> {
        let state = AdjustmentState::from_db_status(&row.state)
            .ok_or_else(|| DatabaseError::invalid_column("stock_adjustments.state", &row.state))?;

        Ok(StockAdjustment {
            payment_id: row.payment_id,
            product_id: row.product_id,
            quantity: row.quantity,
            state,
            attempts: row.attempts,
            last_error: row.last_error,
        })
    }
}

fn to_adjustments(rows: Vec<AdjustmentRow>) -> Result<Vec<StockAdjustment>, DatabaseError> {
    rows.into_iter().map(StockAdjustment::try_from).collect()
}

/// Transactional payment/order/stock updates driven by callbacks
#[derive(Clone)]
pub struct ReconciliationRepository {
    pool: PgPool,
}

impl ReconciliationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReconciliationStore for ReconciliationRepository {
    async fn apply_outcome(
        &self,
        reference: &str,
        update: &CallbackUpdate,
    ) -> Result<TransitionResult, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // Concurrent deliveries for the same reference queue up here
        let locked = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE merchant_reference = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(locked) = locked else {
            return Ok(TransitionResult::NotFound);
        };
        let current: Payment = locked.try_into()?;

        if current.status.is_terminal() {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(TransitionResult::AlreadyTerminal { payment: current });
        }

        let updated: Payment = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments
             SET status = $2,
                 fees = COALESCE($3, fees),
                 gateway_callback_payload = $4,
                 error_message = $5,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(current.id)
        .bind(update.outcome.status().as_str())
        .bind(update.fees)
        .bind(&update.callback_payload)
        .bind(update.error_message.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .try_into()?;

        let adjustments = match update.outcome {
            PaymentOutcome::Success => {
                sqlx::query(
                    "UPDATE orders
                     SET payment_status = 'COMPLETED', status = 'CONFIRMED',
                         payment_reference = $2, updated_at = NOW()
                     WHERE id = $1",
                )
                .bind(current.order_id)
                .bind(&current.merchant_reference)
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

                // One marker per product; repeated lines are summed
                let rows = sqlx::query_as::<_, AdjustmentRow>(&format!(
                    "INSERT INTO stock_adjustments (payment_id, product_id, quantity)
                     SELECT $1, product_id, SUM(quantity)::INTEGER
                     FROM order_items
                     WHERE order_id = $2
                     GROUP BY product_id
                     ON CONFLICT (payment_id, product_id) DO NOTHING
                     RETURNING {}",
                    ADJUSTMENT_COLUMNS
                ))
                .bind(current.id)
                .bind(current.order_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

                to_adjustments(rows)?
            }
            PaymentOutcome::Failed => {
                sqlx::query(
                    "UPDATE orders
                     SET payment_status = 'FAILED', updated_at = NOW()
                     WHERE id = $1 AND payment_status <> 'COMPLETED'",
                )
                .bind(current.order_id)
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

                Vec::new()
            }
        };

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        debug!(
            reference = %reference,
            status = %updated.status,
            adjustments = adjustments.len(),
            "Payment outcome committed"
        );

        Ok(TransitionResult::Applied {
            payment: updated,
            adjustments,
        })
    }

    async fn pending_adjustments_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<StockAdjustment>, DatabaseError> {
        let rows = sqlx::query_as::<_, AdjustmentRow>(&format!(
            "SELECT {} FROM stock_adjustments
             WHERE payment_id = $1 AND state = 'PENDING'
             ORDER BY product_id",
            ADJUSTMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        to_adjustments(rows)
    }

    async fn list_pending_adjustments(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<StockAdjustment>, DatabaseError> {
        let rows = sqlx::query_as::<_, AdjustmentRow>(&format!(
            "SELECT {} FROM stock_adjustments
             WHERE state = 'PENDING' AND attempts < $1
             ORDER BY created_at ASC
             LIMIT $2",
            ADJUSTMENT_COLUMNS
        ))
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        to_adjustments(rows)
    }

    async fn apply_stock_adjustment(
        &self,
        payment_id: Uuid,
        product_id: Uuid,
    ) -> Result<AdjustmentResult, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let marker: StockAdjustment = sqlx::query_as::<_, AdjustmentRow>(&format!(
            "SELECT {} FROM stock_adjustments
             WHERE payment_id = $1 AND product_id = $2
             FOR UPDATE",
            ADJUSTMENT_COLUMNS
        ))
        .bind(payment_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .ok_or_else(|| {
            DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "stock_adjustment".to_string(),
                id: format!("{}/{}", payment_id, product_id),
            })
        })?
        .try_into()?;

        if marker.state != AdjustmentState::Pending {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(AdjustmentResult::AlreadyProcessed(marker.state));
        }

        let decremented = sqlx::query_as::<_, (i32, i32)>(
            "UPDATE products
             SET stock = stock - $2, sales = sales + $2, updated_at = NOW()
             WHERE id = $1 AND stock >= $2
             RETURNING stock, sales",
        )
        .bind(product_id)
        .bind(marker.quantity)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let result = match decremented {
            Some((stock_after, sales_after)) => {
                sqlx::query(
                    "UPDATE stock_adjustments
                     SET state = 'APPLIED', applied_at = NOW(), last_error = NULL
                     WHERE payment_id = $1 AND product_id = $2",
                )
                .bind(payment_id)
                .bind(product_id)
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

                AdjustmentResult::Applied {
                    stock_after,
                    sales_after,
                }
            }
            None => {
                let available = sqlx::query_scalar::<_, i32>(
                    "SELECT stock FROM products WHERE id = $1",
                )
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

                let (result, reason) = match available {
                    Some(available) => (
                        AdjustmentResult::Insufficient {
                            available,
                            requested: marker.quantity,
                        },
                        format!(
                            "insufficient stock: {} available, {} requested",
                            available, marker.quantity
                        ),
                    ),
                    None => (
                        AdjustmentResult::ProductMissing,
                        "product no longer exists".to_string(),
                    ),
                };

                sqlx::query(
                    "UPDATE stock_adjustments
                     SET state = 'DISCREPANCY', last_error = $3
                     WHERE payment_id = $1 AND product_id = $2",
                )
                .bind(payment_id)
                .bind(product_id)
                .bind(reason)
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

                result
            }
        };

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(result)
    }

    async fn record_adjustment_failure(
        &self,
        payment_id: Uuid,
        product_id: Uuid,
        error: &str,
    ) -> Result<i32, DatabaseError> {
        let attempts = sqlx::query_scalar::<_, i32>(
            "UPDATE stock_adjustments
             SET attempts = attempts + 1, last_error = $3
             WHERE payment_id = $1 AND product_id = $2 AND state = 'PENDING'
             RETURNING attempts",
        )
        .bind(payment_id)
        .bind(product_id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(attempts.unwrap_or(0))
    }
}
