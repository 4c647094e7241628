//! In-memory implementation of every store trait.
//!
//! Used when the service runs with `SKIP_EXTERNALS=true` and by the test suite.
//! A single mutex stands in for the row locks Postgres would take, so the
//! transition and stock semantics match the SQL repositories.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{
    AdjustmentResult, CallbackUpdate, OrderStore, PaymentStore, ReconciliationStore,
    TokenStore, TransitionResult, ACTIVE_PAYMENT_CONSTRAINT, MERCHANT_REFERENCE_CONSTRAINT,
    STALE_INITIATION_MESSAGE,
};
use crate::payments::types::{
    AdjustmentState, NewPayment, Operator, Order, OrderPaymentStatus, OrderStatus, Payment,
    PaymentOutcome, PaymentStatus, PaymentStatusView, Product, StockAdjustment,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    orders: HashMap<Uuid, Order>,
    products: HashMap<Uuid, Product>,
    payments: HashMap<Uuid, Payment>,
    /// Insertion order doubles as `created_at` order
    adjustments: Vec<StockAdjustment>,
    tokens: HashMap<Operator, String>,
    stock_failures: HashSet<Uuid>,
    /// Status query count and last query time per payment
    status_polls: HashMap<Uuid, (i32, DateTime<Utc>)>,
}

impl MemoryState {
    fn payment_by_reference(&self, reference: &str) -> Option<&Payment> {
        self.payments
            .values()
            .find(|p| p.merchant_reference == reference)
    }

    fn adjustment_mut(&mut self, payment_id: Uuid, product_id: Uuid) -> Option<&mut StockAdjustment> {
        self.adjustments
            .iter_mut()
            .find(|a| a.payment_id == payment_id && a.product_id == product_id)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order: Order) {
        self.state.lock().await.orders.insert(order.id, order);
    }

    pub async fn insert_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    pub async fn remove_product(&self, product_id: Uuid) {
        self.state.lock().await.products.remove(&product_id);
    }

    pub async fn order(&self, order_id: Uuid) -> Option<Order> {
        self.state.lock().await.orders.get(&order_id).cloned()
    }

    pub async fn product(&self, product_id: Uuid) -> Option<Product> {
        self.state.lock().await.products.get(&product_id).cloned()
    }

    pub async fn payment_by_reference(&self, reference: &str) -> Option<Payment> {
        self.state
            .lock()
            .await
            .payment_by_reference(reference)
            .cloned()
    }

    pub async fn adjustments_for_payment(&self, payment_id: Uuid) -> Vec<StockAdjustment> {
        self.state
            .lock()
            .await
            .adjustments
            .iter()
            .filter(|a| a.payment_id == payment_id)
            .cloned()
            .collect()
    }

    /// Overwrite `created_at`, for exercising age-based queries
    pub async fn backdate_payment(&self, reference: &str, created_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(payment) = state
            .payments
            .values_mut()
            .find(|p| p.merchant_reference == reference)
        {
            payment.created_at = created_at;
        }
    }

    /// Status queries recorded against the payment so far
    pub async fn status_poll_attempts(&self, reference: &str) -> i32 {
        let state = self.state.lock().await;
        state
            .payment_by_reference(reference)
            .and_then(|p| state.status_polls.get(&p.id))
            .map_or(0, |(attempts, _)| *attempts)
    }

    /// Make the next stock write for `product_id` fail with a connection error
    pub async fn inject_stock_failure(&self, product_id: Uuid) {
        self.state.lock().await.stock_failures.insert(product_id);
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn create_payment(&self, new_payment: &NewPayment) -> Result<Payment, DatabaseError> {
        let mut state = self.state.lock().await;

        if state
            .payment_by_reference(&new_payment.merchant_reference)
            .is_some()
        {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: Some(MERCHANT_REFERENCE_CONSTRAINT.to_string()),
            }));
        }

        if state
            .payments
            .values()
            .any(|p| p.order_id == new_payment.order_id && p.status.is_active())
        {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: Some(ACTIVE_PAYMENT_CONSTRAINT.to_string()),
            }));
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: new_payment.order_id,
            merchant_reference: new_payment.merchant_reference.clone(),
            amount: new_payment.amount,
            customer_phone: new_payment.customer_phone.clone(),
            operator: new_payment.operator,
            status: PaymentStatus::Initiating,
            fees: None,
            gateway_request_payload: None,
            gateway_callback_payload: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.payments.insert(payment.id, payment.clone());

        Ok(payment)
    }

    async fn record_initiation_result(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        gateway_payload: &str,
        error_message: Option<&str>,
    ) -> Result<Option<Payment>, DatabaseError> {
        let mut state = self.state.lock().await;

        match state.payments.get_mut(&payment_id) {
            Some(payment) if payment.status == PaymentStatus::Initiating => {
                payment.status = status;
                payment.gateway_request_payload = Some(gateway_payload.to_string());
                payment.error_message = error_message.map(str::to_string);
                payment.updated_at = Utc::now();
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .await
            .payment_by_reference(reference)
            .cloned())
    }

    async fn find_active_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .await
            .payments
            .values()
            .find(|p| p.order_id == order_id && p.status.is_active())
            .cloned())
    }

    async fn find_status_for_user(
        &self,
        reference: &str,
        user_id: Uuid,
    ) -> Result<Option<PaymentStatusView>, DatabaseError> {
        let state = self.state.lock().await;

        let view = state.payment_by_reference(reference).and_then(|payment| {
            state
                .orders
                .get(&payment.order_id)
                .filter(|order| order.user_id == user_id)
                .map(|order| PaymentStatusView {
                    payment: payment.clone(),
                    order_status: order.status,
                    order_payment_status: order.payment_status,
                    order_total: order.total_amount,
                })
        });

        Ok(view)
    }

    async fn expire_stale_initiations(
        &self,
        order_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut expired = 0;

        for payment in state.payments.values_mut().filter(|p| {
            p.order_id == order_id
                && p.status == PaymentStatus::Initiating
                && p.created_at < cutoff
        }) {
            payment.status = PaymentStatus::Error;
            payment
                .error_message
                .get_or_insert_with(|| STALE_INITIATION_MESSAGE.to_string());
            payment.updated_at = now;
            expired += 1;
        }

        Ok(expired)
    }

    async fn list_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
        max_poll_attempts: i32,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError> {
        let state = self.state.lock().await;
        let polls = |id: &Uuid| state.status_polls.get(id).copied();

        let mut pending: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Pending && p.created_at < cutoff)
            .filter(|p| polls(&p.id).map_or(0, |(n, _)| n) < max_poll_attempts)
            .cloned()
            .collect();
        // `None` sorts first, matching NULLS FIRST
        pending.sort_by_key(|p| (polls(&p.id).map(|(_, at)| at), p.created_at));
        pending.truncate(limit.max(0) as usize);

        Ok(pending)
    }

    async fn record_status_poll(&self, payment_id: Uuid) -> Result<i32, DatabaseError> {
        let mut state = self.state.lock().await;
        if !state.payments.contains_key(&payment_id) {
            return Ok(0);
        }

        let entry = state
            .status_polls
            .entry(payment_id)
            .or_insert((0, Utc::now()));
        entry.0 += 1;
        entry.1 = Utc::now();

        Ok(entry.0)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn find_for_customer(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Order>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .get(&order_id)
            .filter(|order| order.user_id == user_id)
            .cloned())
    }

    async fn mark_payment_processing(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<bool, DatabaseError> {
        let mut state = self.state.lock().await;

        let settled = state
            .payment_by_reference(reference)
            .map(|p| matches!(p.status, PaymentStatus::Success | PaymentStatus::Failed))
            .unwrap_or(false);

        match state.orders.get_mut(&order_id) {
            Some(order) if order.payment_status != OrderPaymentStatus::Completed && !settled => {
                order.payment_status = OrderPaymentStatus::Processing;
                order.payment_reference = Some(reference.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryStore {
    async fn apply_outcome(
        &self,
        reference: &str,
        update: &CallbackUpdate,
    ) -> Result<TransitionResult, DatabaseError> {
        let mut state = self.state.lock().await;

        let Some(current) = state.payment_by_reference(reference).cloned() else {
            return Ok(TransitionResult::NotFound);
        };

        if current.status.is_terminal() {
            return Ok(TransitionResult::AlreadyTerminal { payment: current });
        }

        let mut updated = current.clone();
        updated.status = update.outcome.status();
        updated.fees = update.fees.or(current.fees);
        updated.gateway_callback_payload = Some(update.callback_payload.clone());
        updated.error_message = update.error_message.clone();
        updated.updated_at = Utc::now();

        let mut adjustments = Vec::new();
        match update.outcome {
            PaymentOutcome::Success => {
                let mut quantities: Vec<(Uuid, i32)> = Vec::new();
                if let Some(order) = state.orders.get_mut(&current.order_id) {
                    order.payment_status = OrderPaymentStatus::Completed;
                    order.status = OrderStatus::Confirmed;
                    order.payment_reference = Some(current.merchant_reference.clone());

                    for item in &order.items {
                        match quantities.iter_mut().find(|(id, _)| *id == item.product_id) {
                            Some((_, quantity)) => *quantity += item.quantity,
                            None => quantities.push((item.product_id, item.quantity)),
                        }
                    }
                }

                for (product_id, quantity) in quantities {
                    if state.adjustment_mut(current.id, product_id).is_some() {
                        continue;
                    }
                    let adjustment = StockAdjustment {
                        payment_id: current.id,
                        product_id,
                        quantity,
                        state: AdjustmentState::Pending,
                        attempts: 0,
                        last_error: None,
                    };
                    state.adjustments.push(adjustment.clone());
                    adjustments.push(adjustment);
                }
            }
            PaymentOutcome::Failed => {
                if let Some(order) = state.orders.get_mut(&current.order_id) {
                    if order.payment_status != OrderPaymentStatus::Completed {
                        order.payment_status = OrderPaymentStatus::Failed;
                    }
                }
            }
        }

        state.payments.insert(updated.id, updated.clone());

        Ok(TransitionResult::Applied {
            payment: updated,
            adjustments,
        })
    }

    async fn pending_adjustments_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<StockAdjustment>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .await
            .adjustments
            .iter()
            .filter(|a| a.payment_id == payment_id && a.state == AdjustmentState::Pending)
            .cloned()
            .collect())
    }

    async fn list_pending_adjustments(
        &self,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<StockAdjustment>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .await
            .adjustments
            .iter()
            .filter(|a| a.state == AdjustmentState::Pending && a.attempts < max_attempts)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn apply_stock_adjustment(
        &self,
        payment_id: Uuid,
        product_id: Uuid,
    ) -> Result<AdjustmentResult, DatabaseError> {
        let mut state = self.state.lock().await;

        if state.stock_failures.remove(&product_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::Connection {
                message: "injected stock write failure".to_string(),
            }));
        }

        let marker = state
            .adjustment_mut(payment_id, product_id)
            .map(|a| a.clone())
            .ok_or_else(|| {
                DatabaseError::new(DatabaseErrorKind::NotFound {
                    entity: "stock_adjustment".to_string(),
                    id: format!("{}/{}", payment_id, product_id),
                })
            })?;

        if marker.state != AdjustmentState::Pending {
            return Ok(AdjustmentResult::AlreadyProcessed(marker.state));
        }

        let (result, next_state, last_error) = match state.products.get_mut(&product_id) {
            Some(product) if product.stock >= marker.quantity => {
                product.stock -= marker.quantity;
                product.sales += marker.quantity;
                (
                    AdjustmentResult::Applied {
                        stock_after: product.stock,
                        sales_after: product.sales,
                    },
                    AdjustmentState::Applied,
                    None,
                )
            }
            Some(product) => (
                AdjustmentResult::Insufficient {
                    available: product.stock,
                    requested: marker.quantity,
                },
                AdjustmentState::Discrepancy,
                Some(format!(
                    "insufficient stock: {} available, {} requested",
                    product.stock, marker.quantity
                )),
            ),
            None => (
                AdjustmentResult::ProductMissing,
                AdjustmentState::Discrepancy,
                Some("product no longer exists".to_string()),
            ),
        };

        if let Some(adjustment) = state.adjustment_mut(payment_id, product_id) {
            adjustment.state = next_state;
            adjustment.last_error = last_error;
        }

        Ok(result)
    }

    async fn record_adjustment_failure(
        &self,
        payment_id: Uuid,
        product_id: Uuid,
        error: &str,
    ) -> Result<i32, DatabaseError> {
        let mut state = self.state.lock().await;

        match state.adjustment_mut(payment_id, product_id) {
            Some(adjustment) if adjustment.state == AdjustmentState::Pending => {
                adjustment.attempts += 1;
                adjustment.last_error = Some(error.to_string());
                Ok(adjustment.attempts)
            }
            _ => Ok(0),
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn get(&self, operator: Operator) -> Result<Option<String>, DatabaseError> {
        Ok(self.state.lock().await.tokens.get(&operator).cloned())
    }

    async fn set(&self, operator: Operator, token: &str) -> Result<(), DatabaseError> {
        self.state
            .lock()
            .await
            .tokens
            .insert(operator, token.to_string());
        Ok(())
    }
}
