//! Store traits shared by the Postgres repositories and the in-memory store

use crate::database::error::DatabaseError;
use crate::payments::types::{
    AdjustmentState, NewPayment, Operator, Order, Payment, PaymentOutcome, PaymentStatus,
    PaymentStatusView, StockAdjustment,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Unique constraint on `payments.merchant_reference`
pub const MERCHANT_REFERENCE_CONSTRAINT: &str = "payments_merchant_reference_key";
/// Partial unique index allowing one INITIATING/PENDING payment per order
pub const ACTIVE_PAYMENT_CONSTRAINT: &str = "payments_one_active_per_order";
/// `error_message` written on attempts expired while still `INITIATING`
pub const STALE_INITIATION_MESSAGE: &str = "initiation interrupted before the gateway answer was recorded";

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new payment in `INITIATING`
    async fn create_payment(&self, new_payment: &NewPayment) -> Result<Payment, DatabaseError>;

    /// Move an `INITIATING` payment to `PENDING` or `ERROR`.
    ///
    /// Returns `None` when the row already left `INITIATING` (a callback won the race).
    async fn record_initiation_result(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        gateway_payload: &str,
        error_message: Option<&str>,
    ) -> Result<Option<Payment>, DatabaseError>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>, DatabaseError>;

    async fn find_active_for_order(&self, order_id: Uuid)
        -> Result<Option<Payment>, DatabaseError>;

    /// Payment joined with its order, restricted to orders owned by `user_id`
    async fn find_status_for_user(
        &self,
        reference: &str,
        user_id: Uuid,
    ) -> Result<Option<PaymentStatusView>, DatabaseError>;

    /// Move `INITIATING` attempts on `order_id` created before `cutoff` to `ERROR`.
    ///
    /// An attempt still `INITIATING` that long after the gateway timeout was
    /// interrupted before its result was recorded. Returns the number of rows expired.
    async fn expire_stale_initiations(
        &self,
        order_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DatabaseError>;

    /// `PENDING` payments created before `cutoff` with fewer than
    /// `max_poll_attempts` status queries. Never-polled rows come first, then
    /// the least recently polled, then the oldest.
    async fn list_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
        max_poll_attempts: i32,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError>;

    /// Count one gateway status query against the payment; returns the new total
    async fn record_status_poll(&self, payment_id: Uuid) -> Result<i32, DatabaseError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Order with its items, only if owned by `user_id`
    async fn find_for_customer(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Set `payment_status = PROCESSING` and the payment reference.
    /// Returns false if the order was completed, or this attempt already
    /// settled by callback, in the meantime.
    async fn mark_payment_processing(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<bool, DatabaseError>;
}

/// Fields written by a callback
#[derive(Debug, Clone)]
pub struct CallbackUpdate {
    pub outcome: PaymentOutcome,
    pub fees: Option<i64>,
    pub callback_payload: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TransitionResult {
    /// Status written; on success `adjustments` holds the new PENDING markers
    Applied {
        payment: Payment,
        adjustments: Vec<StockAdjustment>,
    },
    AlreadyTerminal {
        payment: Payment,
    },
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentResult {
    Applied { stock_after: i32, sales_after: i32 },
    /// Marker moved to DISCREPANCY, stock untouched
    Insufficient { available: i32, requested: i32 },
    /// Marker moved to DISCREPANCY, product row is gone
    ProductMissing,
    AlreadyProcessed(AdjustmentState),
}

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Atomically move a non-terminal payment to its final state and mirror
    /// it on the order. Terminal payments are left untouched.
    async fn apply_outcome(
        &self,
        reference: &str,
        update: &CallbackUpdate,
    ) -> Result<TransitionResult, DatabaseError>;

    async fn pending_adjustments_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<StockAdjustment>, DatabaseError>;

    /// PENDING markers with fewer than `max_attempts` failures, oldest first
    async fn list_pending_adjustments(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<StockAdjustment>, DatabaseError>;

    /// Conditionally decrement stock and increment sales for one marker
    async fn apply_stock_adjustment(
        &self,
        payment_id: Uuid,
        product_id: Uuid,
    ) -> Result<AdjustmentResult, DatabaseError>;

    /// Bump the attempt counter of a PENDING marker; returns the new count
    async fn record_adjustment_failure(
        &self,
        payment_id: Uuid,
        product_id: Uuid,
        error: &str,
    ) -> Result<i32, DatabaseError>;
}

/// Per-operator gateway session token, last write wins
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, operator: Operator) -> Result<Option<String>, DatabaseError>;
    async fn set(&self, operator: Operator, token: &str) -> Result<(), DatabaseError>;
}
