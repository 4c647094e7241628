use crate::database::error::DatabaseError;
use crate::database::repository::TokenStore;
use crate::payments::types::Operator;
use async_trait::async_trait;
use sqlx::PgPool;

/// Gateway session tokens persisted per operator
#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for TokenRepository {
    async fn get(&self, operator: Operator) -> Result<Option<String>, DatabaseError> {
        sqlx::query_scalar::<_, String>("SELECT token FROM operator_tokens WHERE operator = $1")
            .bind(operator.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn set(&self, operator: Operator, token: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO operator_tokens (operator, token)
             VALUES ($1, $2)
             ON CONFLICT (operator) DO UPDATE
             SET token = EXCLUDED.token, updated_at = NOW()",
        )
        .bind(operator.as_str())
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}
