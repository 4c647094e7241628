//! Unified error handling for the payment core
//!
//! Every failure that reaches the HTTP boundary is expressed as an [`AppError`]
//! carrying an HTTP status, a machine-readable [`ErrorCode`], a shopper-facing
//! message and a retryability hint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by the storefront client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "ALREADY_PAID")]
    AlreadyPaid,
    #[serde(rename = "PAYMENT_IN_PROGRESS")]
    PaymentInProgress,
    #[serde(rename = "ORDER_NOT_PAYABLE")]
    OrderNotPayable,
    #[serde(rename = "DUPLICATE_REFERENCE")]
    DuplicateReference,

    // Validation errors (400/401)
    #[serde(rename = "INVALID_OPERATOR")]
    InvalidOperator,
    #[serde(rename = "INVALID_PHONE")]
    InvalidPhone,
    #[serde(rename = "MISSING_PAYLOAD")]
    MissingPayload,
    #[serde(rename = "MALFORMED_PAYLOAD")]
    MalformedPayload,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,
    #[serde(rename = "TOKEN_UNAVAILABLE")]
    TokenUnavailable,

    // External errors (502, 504)
    #[serde(rename = "GATEWAY_ERROR")]
    GatewayError,
    #[serde(rename = "GATEWAY_TIMEOUT")]
    GatewayTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Order does not exist or is not owned by the requester
    OrderNotFound { order_id: String },
    /// No payment with this merchant reference is visible to the requester
    PaymentNotFound { reference: String },
    /// Order was already paid
    AlreadyPaid { order_id: String },
    /// Another attempt for the same order is still waiting for the gateway
    PaymentInProgress { order_id: String, reference: String },
    /// Order can no longer be paid (cancelled)
    OrderNotPayable { order_id: String, status: String },
    /// Could not allocate a unique merchant reference
    DuplicateReference { attempts: u32 },
}

#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    /// Missing merchant code or other static configuration
    Configuration { message: String },
    /// No session token cached for the operator yet
    TokenUnavailable { operator: String },
}

/// Mobile-money gateway errors
#[derive(Debug, Clone)]
pub enum ExternalError {
    Gateway { message: String, is_retryable: bool },
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors, rejected before any persistence
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidOperator { operator: String },
    InvalidPhone { phone: String },
    InvalidAmount { amount: String, reason: String },
    MissingField { field: String },
    InvalidField { field: String, reason: String },
    /// Callback body without a `result` element
    MissingPayload,
    /// Callback body that does not match the expected shape
    MalformedPayload { reason: String },
    /// Requester identity missing or unreadable
    Unauthenticated,
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => 404,
                DomainError::PaymentNotFound { .. } => 404,
                DomainError::AlreadyPaid { .. } => 409,
                DomainError::PaymentInProgress { .. } => 409,
                DomainError::OrderNotPayable { .. } => 409,
                DomainError::DuplicateReference { .. } => 500,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => 500,
                InfrastructureError::Configuration { .. } => 500,
                InfrastructureError::TokenUnavailable { .. } => 503,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { .. } => 502,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::Unauthenticated => 401,
                _ => 400,
            },
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => ErrorCode::OrderNotFound,
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                DomainError::AlreadyPaid { .. } => ErrorCode::AlreadyPaid,
                DomainError::PaymentInProgress { .. } => ErrorCode::PaymentInProgress,
                DomainError::OrderNotPayable { .. } => ErrorCode::OrderNotPayable,
                DomainError::DuplicateReference { .. } => ErrorCode::DuplicateReference,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
                InfrastructureError::TokenUnavailable { .. } => ErrorCode::TokenUnavailable,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { .. } => ErrorCode::GatewayError,
                ExternalError::Timeout { .. } => ErrorCode::GatewayTimeout,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidOperator { .. } => ErrorCode::InvalidOperator,
                ValidationError::InvalidPhone { .. } => ErrorCode::InvalidPhone,
                ValidationError::MissingPayload => ErrorCode::MissingPayload,
                ValidationError::MalformedPayload { .. } => ErrorCode::MalformedPayload,
                ValidationError::Unauthenticated => ErrorCode::Unauthorized,
                _ => ErrorCode::ValidationError,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { order_id } => {
                    format!("Order '{}' not found", order_id)
                }
                DomainError::PaymentNotFound { reference } => {
                    format!("Payment '{}' not found", reference)
                }
                DomainError::AlreadyPaid { order_id } => {
                    format!("Order '{}' has already been paid", order_id)
                }
                DomainError::PaymentInProgress { reference, .. } => format!(
                    "A payment ({}) is already waiting for confirmation on this order",
                    reference
                ),
                DomainError::OrderNotPayable { order_id, status } => {
                    format!("Order '{}' cannot be paid while {}", order_id, status)
                }
                DomainError::DuplicateReference { .. } => {
                    "Could not create the payment. Please try again".to_string()
                }
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::TokenUnavailable { operator } => format!(
                    "{} fee service is not available yet. Please try again later",
                    operator
                ),
                InfrastructureError::Configuration { .. } => {
                    "Mobile-money payments are not configured for this operator".to_string()
                }
                InfrastructureError::Database { .. } => {
                    "Service temporarily unavailable. Please try again later".to_string()
                }
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { is_retryable, .. } => {
                    if *is_retryable {
                        "Mobile-money gateway is temporarily unavailable. Please try again"
                            .to_string()
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => format!(
                    "{} request timed out after {} seconds. Please try again",
                    service, timeout_secs
                ),
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidOperator { operator } => {
                    format!("Operator '{}' is not supported (use AIRTEL or MOOV)", operator)
                }
                ValidationError::InvalidPhone { phone } => {
                    format!("'{}' is not a valid Gabonese mobile number", phone)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::MissingPayload => "Missing result payload".to_string(),
                ValidationError::MalformedPayload { reason } => {
                    format!("Malformed payload: {}", reason)
                }
                ValidationError::Unauthenticated => "Authentication required".to_string(),
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(err) => matches!(err, DomainError::DuplicateReference { .. }),
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
                InfrastructureError::TokenUnavailable { .. } => true,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Gateway { is_retryable, .. } => *is_retryable,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_paid_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::AlreadyPaid {
            order_id: "o-1".to_string(),
        }));

        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), ErrorCode::AlreadyPaid);
        assert!(error.user_message().contains("already been paid"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_order_not_found_is_404() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
            order_id: "o-2".to_string(),
        }));
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::OrderNotFound);
    }

    #[test]
    fn test_token_unavailable_error() {
        let error = AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::TokenUnavailable {
                operator: "MOOV".to_string(),
            },
        ));

        assert_eq!(error.status_code(), 503);
        assert_eq!(error.error_code(), ErrorCode::TokenUnavailable);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_validation_errors() {
        let error = AppError::new(AppErrorKind::Validation(ValidationError::InvalidOperator {
            operator: "orange".to_string(),
        }));
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::InvalidOperator);

        let error = AppError::new(AppErrorKind::Validation(ValidationError::Unauthenticated));
        assert_eq!(error.status_code(), 401);
        assert_eq!(error.error_code(), ErrorCode::Unauthorized);
    }
}
