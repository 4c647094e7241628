use crate::config::GatewayConfig;
use crate::database::repository::TokenStore;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{GatewayResult, Operator};
use crate::payments::utils::{mask_phone, GatewayHttpClient};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const ACTION_INITIATE: &str = "1";
pub const ACTION_STATUS: &str = "3";
pub const ACTION_FEES: &str = "5";

/// Airtel Money / Moov Money aggregator client
pub struct MobileMoneyGateway {
    config: GatewayConfig,
    http: GatewayHttpClient,
    tokens: Arc<dyn TokenStore>,
}

impl MobileMoneyGateway {
    pub fn new(config: GatewayConfig, tokens: Arc<dyn TokenStore>) -> PaymentResult<Self> {
        let http = GatewayHttpClient::new(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self {
            config,
            http,
            tokens,
        })
    }

    fn merchant_code(&self, operator: Operator) -> PaymentResult<String> {
        self.config
            .merchant_code(operator)
            .map(str::to_string)
            .ok_or_else(|| PaymentError::ConfigError {
                message: format!("no merchant code configured for {}", operator),
            })
    }

    async fn session_token(&self, operator: Operator) -> PaymentResult<String> {
        match self.tokens.get(operator).await {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(PaymentError::TokenUnavailable { operator }),
            Err(e) => Err(PaymentError::TokenStoreError {
                message: e.to_string(),
            }),
        }
    }

    /// Fields shared by every action
    fn base_fields(
        &self,
        merchant_code: String,
        action: &str,
        operator: Operator,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("code_marchand", merchant_code),
            ("action", action.to_string()),
            ("service", self.config.service.clone()),
            ("operateur", self.config.channel(operator).to_string()),
        ]
    }
}

#[async_trait]
impl PaymentGateway for MobileMoneyGateway {
    async fn initiate(
        &self,
        amount: i64,
        merchant_reference: &str,
        customer_phone: &str,
        operator: Operator,
    ) -> PaymentResult<GatewayResult> {
        let mut fields = self.base_fields(self.merchant_code(operator)?, ACTION_INITIATE, operator);
        fields.push(("montant", amount.to_string()));
        fields.push(("reference_marchand", merchant_reference.to_string()));
        fields.push(("numero_client", customer_phone.to_string()));

        info!(
            reference = %merchant_reference,
            operator = %operator,
            amount,
            phone = %mask_phone(customer_phone),
            "Sending payment request to gateway"
        );

        let result = self.http.post_form(&self.config.base_url, &fields).await;
        if !result.success {
            warn!(
                reference = %merchant_reference,
                operator = %operator,
                response = %result.raw_body,
                "Gateway rejected payment request"
            );
        }

        Ok(result)
    }

    async fn calculate_fees(
        &self,
        amount: i64,
        operator: Operator,
    ) -> PaymentResult<GatewayResult> {
        let token = self.session_token(operator).await?;
        let mut fields = self.base_fields(self.merchant_code(operator)?, ACTION_FEES, operator);
        fields.push(("montant", amount.to_string()));
        fields.push(("token", token));

        Ok(self.http.post_form(&self.config.base_url, &fields).await)
    }

    async fn query_status(
        &self,
        merchant_reference: &str,
        operator: Operator,
        lookback_days: u32,
    ) -> PaymentResult<GatewayResult> {
        let token = self.session_token(operator).await?;
        let mut fields = self.base_fields(self.merchant_code(operator)?, ACTION_STATUS, operator);
        fields.push(("reference_marchand", merchant_reference.to_string()));
        fields.push(("token", token));
        fields.push(("nombre_jours", lookback_days.to_string()));

        Ok(self.http.post_form(&self.config.base_url, &fields).await)
    }

    fn name(&self) -> &'static str {
        "mobile_money"
    }
}
