use crate::database::error::DatabaseError;
use crate::database::repository::{PaymentStore, STALE_INITIATION_MESSAGE};
use crate::payments::types::{
    NewPayment, Operator, OrderPaymentStatus, OrderStatus, Payment, PaymentStatus,
    PaymentStatusView,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

pub(crate) const PAYMENT_COLUMNS: &str = "id, order_id, merchant_reference, amount, customer_phone, \
     operator, status, fees, gateway_request_payload, gateway_callback_payload, error_message, \
     created_at, updated_at";

const PAYMENT_COLUMNS_P: &str = "p.id, p.order_id, p.merchant_reference, p.amount, \
     p.customer_phone, p.operator, p.status, p.fees, p.gateway_request_payload, \
     p.gateway_callback_payload, p.error_message, p.created_at, p.updated_at";

/// Raw `payments` row
#[derive(Debug, Clone, FromRow)]
pub(crate) struct PaymentRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub merchant_reference: String,
    pub amount: i64,
    pub customer_phone: String,
    pub operator: String,
    pub status: String,
    pub fees: Option<i64>,
    pub gateway_request_payload: Option<String>,
    pub gateway_callback_payload: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let operator = Operator::from_str(&row.operator)
            .map_err(|_| DatabaseError::invalid_column("payments.operator", &row.operator))?;
        let status = PaymentStatus::from_db_status(&row.status)
            .ok_or_else(|| DatabaseError::invalid_column("payments.status", &row.status))?;

        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            merchant_reference: row.merchant_reference,
            amount: row.amount,
            customer_phone: row.customer_phone,
            operator,
            status,
            fees: row.fees,
            gateway_request_payload: row.gateway_request_payload,
            gateway_callback_payload: row.gateway_callback_payload,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PaymentStatusRow {
    #[sqlx(flatten)]
    payment: PaymentRow,
    order_status: String,
    order_payment_status: String,
    order_total: i64,
}

/// Postgres-backed payment records
#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn to_payments(rows: Vec<PaymentRow>) -> Result<Vec<Payment>, DatabaseError> {
        rows.into_iter().map(Payment::try_from).collect()
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn create_payment(&self, new_payment: &NewPayment) -> Result<Payment, DatabaseError> {
        let sql = format!(
            "INSERT INTO payments
             (id, order_id, merchant_reference, amount, customer_phone, operator, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            PAYMENT_COLUMNS
        );

        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(new_payment.order_id)
            .bind(&new_payment.merchant_reference)
            .bind(new_payment.amount)
            .bind(&new_payment.customer_phone)
            .bind(new_payment.operator.as_str())
            .bind(PaymentStatus::Initiating.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.try_into()
    }

    async fn record_initiation_result(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        gateway_payload: &str,
        error_message: Option<&str>,
    ) -> Result<Option<Payment>, DatabaseError> {
        let sql = format!(
            "UPDATE payments
             SET status = $2, gateway_request_payload = $3, error_message = $4, updated_at = NOW()
             WHERE id = $1 AND status = 'INITIATING'
             RETURNING {}",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment_id)
            .bind(status.as_str())
            .bind(gateway_payload)
            .bind(error_message)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM payments WHERE merchant_reference = $1",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn find_active_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM payments
             WHERE order_id = $1 AND status IN ('INITIATING', 'PENDING')
             LIMIT 1",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn find_status_for_user(
        &self,
        reference: &str,
        user_id: Uuid,
    ) -> Result<Option<PaymentStatusView>, DatabaseError> {
        let sql = format!(
            "SELECT {}, o.status AS order_status, o.payment_status AS order_payment_status,
                    o.total_amount AS order_total
             FROM payments p
             JOIN orders o ON o.id = p.order_id
             WHERE p.merchant_reference = $1 AND o.user_id = $2",
            PAYMENT_COLUMNS_P
        );

        let row = sqlx::query_as::<_, PaymentStatusRow>(&sql)
            .bind(reference)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let order_status = OrderStatus::from_db_status(&row.order_status)
            .ok_or_else(|| DatabaseError::invalid_column("orders.status", &row.order_status))?;
        let order_payment_status = OrderPaymentStatus::from_db_status(&row.order_payment_status)
            .ok_or_else(|| {
                DatabaseError::invalid_column("orders.payment_status", &row.order_payment_status)
            })?;

        Ok(Some(PaymentStatusView {
            payment: row.payment.try_into()?,
            order_status,
            order_payment_status,
            order_total: row.order_total,
        }))
    }

    async fn expire_stale_initiations(
        &self,
        order_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE payments
             SET status = 'ERROR',
                 error_message = COALESCE(error_message, $3),
                 updated_at = NOW()
             WHERE order_id = $1 AND status = 'INITIATING' AND created_at < $2",
        )
        .bind(order_id)
        .bind(cutoff)
        .bind(STALE_INITIATION_MESSAGE)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }

    async fn list_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
        max_poll_attempts: i32,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM payments
             WHERE status = 'PENDING' AND created_at < $1 AND status_poll_attempts < $2
             ORDER BY last_status_poll_at ASC NULLS FIRST, created_at ASC
             LIMIT $3",
            PAYMENT_COLUMNS
        );

        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(cutoff)
            .bind(max_poll_attempts)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Self::to_payments(rows)
    }

    async fn record_status_poll(&self, payment_id: Uuid) -> Result<i32, DatabaseError> {
        let attempts: Option<i32> = sqlx::query_scalar(
            "UPDATE payments
             SET status_poll_attempts = status_poll_attempts + 1, last_status_poll_at = NOW()
             WHERE id = $1
             RETURNING status_poll_attempts",
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(attempts.unwrap_or(0))
    }
}
