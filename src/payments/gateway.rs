use crate::payments::error::PaymentResult;
use crate::payments::types::{GatewayResult, Operator};
use async_trait::async_trait;

/// Outbound side of the mobile-money aggregator.
///
/// Transport failures never surface as `Err`: they come back as a rejected
/// [`GatewayResult`] so the caller can persist the outcome. `Err` is reserved
/// for local preconditions (missing merchant code, no session token).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Push a payment prompt to the customer's handset (action 1)
    async fn initiate(
        &self,
        amount: i64,
        merchant_reference: &str,
        customer_phone: &str,
        operator: Operator,
    ) -> PaymentResult<GatewayResult>;

    /// Ask the aggregator for the fee schedule on `amount` (action 5)
    async fn calculate_fees(&self, amount: i64, operator: Operator)
        -> PaymentResult<GatewayResult>;

    /// Look up a previous request by merchant reference (action 3)
    async fn query_status(
        &self,
        merchant_reference: &str,
        operator: Operator,
        lookback_days: u32,
    ) -> PaymentResult<GatewayResult>;

    fn name(&self) -> &'static str;
}
