use crate::database::error::DatabaseError;
use crate::database::repository::OrderStore;
use crate::payments::types::{Order, OrderItem, OrderPaymentStatus, OrderStatus};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    total_amount: i64,
    payment_status: String,
    status: String,
    payment_reference: Option<String>,
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    product_id: Uuid,
    quantity: i32,
    unit_price: i64,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            product_id: row.product_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
        }
    }
}

/// Postgres-backed order lookups used by initiation
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn find_for_customer(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Order>, DatabaseError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total_amount, payment_status, status, payment_reference
             FROM orders
             WHERE id = $1 AND user_id = $2",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT product_id, quantity, unit_price
             FROM order_items
             WHERE order_id = $1
             ORDER BY position ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let payment_status = OrderPaymentStatus::from_db_status(&row.payment_status)
            .ok_or_else(|| DatabaseError::invalid_column("orders.payment_status", &row.payment_status))?;
        let status = OrderStatus::from_db_status(&row.status)
            .ok_or_else(|| DatabaseError::invalid_column("orders.status", &row.status))?;

        Ok(Some(Order {
            id: row.id,
            user_id: row.user_id,
            total_amount: row.total_amount,
            items: items.into_iter().map(OrderItem::from).collect(),
            payment_status,
            status,
            payment_reference: row.payment_reference,
        }))
    }

    async fn mark_payment_processing(
        &self,
        order_id: Uuid,
        reference: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders
             SET payment_status = 'PROCESSING', payment_reference = $2, updated_at = NOW()
             WHERE id = $1
               AND payment_status <> 'COMPLETED'
               AND NOT EXISTS (
                   SELECT 1 FROM payments
                   WHERE merchant_reference = $2 AND status IN ('SUCCESS', 'FAILED')
               )",
        )
        .bind(order_id)
        .bind(reference)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() == 1)
    }
}
