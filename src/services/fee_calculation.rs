use crate::error::{AppError, AppErrorKind, AppResult, ValidationError};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::Operator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct FeeRequest {
    pub amount: i64,
    pub operator: String,
}

/// Gateway fee schedule, passed through as received
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeeQuote {
    pub success: bool,
    pub data: Value,
}

pub struct FeeCalculationService {
    gateway: Arc<dyn PaymentGateway>,
}

impl FeeCalculationService {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    pub async fn calculate_fees(&self, amount: i64, operator: &str) -> AppResult<FeeQuote> {
        if amount <= 0 {
            return Err(AppError::new(AppErrorKind::Validation(
                ValidationError::InvalidAmount {
                    amount: amount.to_string(),
                    reason: "Amount must be greater than zero".to_string(),
                },
            )));
        }
        let operator = Operator::from_str(operator)?;

        let result = self.gateway.calculate_fees(amount, operator).await?;

        info!(
            operator = %operator,
            amount,
            success = result.success,
            "Fee schedule requested"
        );

        // JSON bodies are forwarded structured, anything else as a string
        let data = serde_json::from_str::<Value>(&result.raw_body)
            .unwrap_or(Value::String(result.raw_body));

        Ok(FeeQuote {
            success: result.success,
            data,
        })
    }
}
