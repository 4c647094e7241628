use crate::payments::error::PaymentError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

/// Mobile-money network the customer pays from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Airtel,
    Moov,
}

impl Operator {
    pub const ALL: [Operator; 2] = [Operator::Airtel, Operator::Moov];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Airtel => "AIRTEL",
            Operator::Moov => "MOOV",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operator {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "AIRTEL" | "AIRTEL_MONEY" | "AIRTELMONEY" => Ok(Operator::Airtel),
            "MOOV" | "MOOV_MONEY" | "MOOVMONEY" => Ok(Operator::Moov),
            _ => Err(PaymentError::InvalidOperator {
                value: value.to_string(),
            }),
        }
    }
}

/// Lifecycle of a single payment attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Row written, gateway not yet answered
    Initiating,
    /// Gateway acknowledged, waiting for the callback
    Pending,
    Success,
    Failed,
    /// Gateway rejected the request (or timed out)
    Error,
}

impl PaymentStatus {
    pub fn valid_transitions(&self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Initiating => &[PaymentStatus::Pending, PaymentStatus::Error],
            PaymentStatus::Pending => &[PaymentStatus::Success, PaymentStatus::Failed],
            PaymentStatus::Success | PaymentStatus::Failed | PaymentStatus::Error => &[],
        }
    }

    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Success | PaymentStatus::Failed | PaymentStatus::Error
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiating => "INITIATING",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Error => "ERROR",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "INITIATING" => Some(PaymentStatus::Initiating),
            "PENDING" => Some(PaymentStatus::Pending),
            "SUCCESS" => Some(PaymentStatus::Success),
            "FAILED" => Some(PaymentStatus::Failed),
            "ERROR" => Some(PaymentStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::Pending => "PENDING",
            OrderPaymentStatus::Processing => "PROCESSING",
            OrderPaymentStatus::Completed => "COMPLETED",
            OrderPaymentStatus::Failed => "FAILED",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "PENDING" => Some(OrderPaymentStatus::Pending),
            "PROCESSING" => Some(OrderPaymentStatus::Processing),
            "COMPLETED" => Some(OrderPaymentStatus::Completed),
            "FAILED" => Some(OrderPaymentStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "PENDING" => Some(OrderStatus::Pending),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "PROCESSING" => Some(OrderStatus::Processing),
            "SHIPPED" => Some(OrderStatus::Shipped),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Final result reported by the gateway for a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failed,
}

impl PaymentOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Success => PaymentStatus::Success,
            PaymentOutcome::Failed => PaymentStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub merchant_reference: String,
    pub amount: i64,
    pub customer_phone: String,
    pub operator: Operator,
    pub status: PaymentStatus,
    pub fees: Option<i64>,
    pub gateway_request_payload: Option<String>,
    pub gateway_callback_payload: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: Uuid,
    pub merchant_reference: String,
    pub amount: i64,
    pub customer_phone: String,
    pub operator: Operator,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_amount: i64,
    pub items: Vec<OrderItem>,
    pub payment_status: OrderPaymentStatus,
    pub status: OrderStatus,
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: Uuid,
    pub stock: i32,
    pub sales: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentState {
    Pending,
    Applied,
    Discrepancy,
}

impl AdjustmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentState::Pending => "PENDING",
            AdjustmentState::Applied => "APPLIED",
            AdjustmentState::Discrepancy => "DISCREPANCY",
        }
    }

    pub fn from_db_status(state: &str) -> Option<Self> {
        match state {
            "PENDING" => Some(AdjustmentState::Pending),
            "APPLIED" => Some(AdjustmentState::Applied),
            "DISCREPANCY" => Some(AdjustmentState::Discrepancy),
            _ => None,
        }
    }
}

/// Applied-once marker for the stock/sales movement of one product on one payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockAdjustment {
    pub payment_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub state: AdjustmentState,
    pub attempts: i32,
    pub last_error: Option<String>,
}

/// Payment snapshot joined with its owning order, as returned to the shopper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusView {
    pub payment: Payment,
    pub order_status: OrderStatus,
    pub order_payment_status: OrderPaymentStatus,
    pub order_total: i64,
}

/// Raw answer of a gateway call. `success` is false for rejections, timeouts
/// and transport failures alike.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayResult {
    pub success: bool,
    pub raw_body: String,
}

impl GatewayResult {
    pub fn accepted(raw_body: impl Into<String>) -> Self {
        Self {
            success: true,
            raw_body: raw_body.into(),
        }
    }

    pub fn rejected(raw_body: impl Into<String>) -> Self {
        Self {
            success: false,
            raw_body: raw_body.into(),
        }
    }
}

static GABON_MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0[67]\d{7}$").expect("static regex"));

/// Normalise a Gabonese mobile number to its local 9-digit form (`07xxxxxxx`).
///
/// Accepts the international prefix (`+241`, `00241`, `241`), separators, and
/// the legacy 8-digit form without the leading zero.
pub fn normalize_phone(raw: &str) -> Result<String, PaymentError> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let local = digits
        .strip_prefix("+241")
        .or_else(|| digits.strip_prefix("00241"))
        .or_else(|| {
            if digits.len() > 9 {
                digits.strip_prefix("241")
            } else {
                None
            }
        })
        .unwrap_or(&digits);

    let local = if local.len() == 8 && !local.starts_with('0') {
        format!("0{}", local)
    } else {
        local.to_string()
    };

    if GABON_MOBILE.is_match(&local) {
        Ok(local)
    } else {
        Err(PaymentError::InvalidPhone {
            value: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_parsing_accepts_known_networks() {
        assert_eq!(Operator::from_str("airtel").unwrap(), Operator::Airtel);
        assert_eq!(Operator::from_str(" MOOV ").unwrap(), Operator::Moov);
        assert_eq!(Operator::from_str("moov_money").unwrap(), Operator::Moov);
        assert!(matches!(
            Operator::from_str("orange"),
            Err(PaymentError::InvalidOperator { .. })
        ));
    }

    #[test]
    fn operator_serializes_upper_case() {
        let json = serde_json::to_value(Operator::Airtel).unwrap();
        assert_eq!(json, "AIRTEL");
    }

    #[test]
    fn payment_status_transitions() {
        assert!(PaymentStatus::Initiating.can_transition_to(PaymentStatus::Pending));
        assert!(PaymentStatus::Initiating.can_transition_to(PaymentStatus::Error));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Success));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Initiating.can_transition_to(PaymentStatus::Success));
        assert!(PaymentStatus::Success.valid_transitions().is_empty());
        assert!(PaymentStatus::Error.valid_transitions().is_empty());
    }

    #[test]
    fn terminal_states() {
        assert!(PaymentStatus::Success.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Error.is_terminal());
        assert!(PaymentStatus::Initiating.is_active());
        assert!(PaymentStatus::Pending.is_active());
    }

    #[test]
    fn db_status_round_trips_for_every_variant() {
        for status in [
            PaymentStatus::Initiating,
            PaymentStatus::Pending,
            PaymentStatus::Success,
            PaymentStatus::Failed,
            PaymentStatus::Error,
        ] {
            assert_eq!(PaymentStatus::from_db_status(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::from_db_status("pending"), None);
        assert_eq!(
            OrderStatus::from_db_status("CONFIRMED"),
            Some(OrderStatus::Confirmed)
        );
        assert_eq!(
            OrderPaymentStatus::from_db_status("PROCESSING"),
            Some(OrderPaymentStatus::Processing)
        );
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone("074 12 34 56").unwrap(), "074123456");
        assert_eq!(normalize_phone("+241 74 12 34 56").unwrap(), "074123456");
        assert_eq!(normalize_phone("0024166123456").unwrap(), "066123456");
        assert_eq!(normalize_phone("24162123456").unwrap(), "062123456");
        assert_eq!(normalize_phone("77123456").unwrap(), "077123456");
        assert!(normalize_phone("011234567").is_err());
        assert!(normalize_phone("07412").is_err());
        assert!(normalize_phone("").is_err());
    }
}
