use crate::payments::types::Operator;
use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Unsupported operator: {value}")]
    InvalidOperator { value: String },

    #[error("Invalid customer phone number: {value}")]
    InvalidPhone { value: String },

    #[error("Gateway configuration error: {message}")]
    ConfigError { message: String },

    #[error("No gateway session token available for {operator}")]
    TokenUnavailable { operator: Operator },

    #[error("Token store error: {message}")]
    TokenStoreError { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::InvalidOperator { .. } => false,
            PaymentError::InvalidPhone { .. } => false,
            PaymentError::ConfigError { .. } => false,
            // A later callback refreshes the token
            PaymentError::TokenUnavailable { .. } => true,
            PaymentError::TokenStoreError { .. } => true,
            PaymentError::NetworkError { .. } => true,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::InvalidOperator { .. } => 400,
            PaymentError::InvalidPhone { .. } => 400,
            PaymentError::ConfigError { .. } => 500,
            PaymentError::TokenUnavailable { .. } => 503,
            PaymentError::TokenStoreError { .. } => 500,
            PaymentError::NetworkError { .. } => 503,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::InvalidOperator { value } => {
                format!("Operator '{}' is not supported (use AIRTEL or MOOV)", value)
            }
            PaymentError::InvalidPhone { .. } => {
                "Customer phone must be a valid Gabonese mobile number".to_string()
            }
            PaymentError::ConfigError { .. } => {
                "Mobile-money payments are not configured for this operator".to_string()
            }
            PaymentError::TokenUnavailable { operator } => format!(
                "{} fee service is not available yet. Please try again later",
                operator
            ),
            PaymentError::TokenStoreError { .. } | PaymentError::NetworkError { .. } => {
                "Payment gateway is temporarily unavailable".to_string()
            }
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{
            AppError, AppErrorKind, ExternalError, InfrastructureError, ValidationError,
        };

        let kind = match err {
            PaymentError::ValidationError { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    reason: message,
                })
            }
            PaymentError::InvalidOperator { value } => {
                AppErrorKind::Validation(ValidationError::InvalidOperator { operator: value })
            }
            PaymentError::InvalidPhone { value } => {
                AppErrorKind::Validation(ValidationError::InvalidPhone { phone: value })
            }
            PaymentError::ConfigError { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Configuration { message })
            }
            PaymentError::TokenUnavailable { operator } => {
                AppErrorKind::Infrastructure(InfrastructureError::TokenUnavailable {
                    operator: operator.to_string(),
                })
            }
            PaymentError::TokenStoreError { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message,
                    is_retryable: true,
                })
            }
            PaymentError::NetworkError { message } => {
                AppErrorKind::External(ExternalError::Gateway {
                    message,
                    is_retryable: true,
                })
            }
        };

        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(
            PaymentError::InvalidOperator {
                value: "orange".to_string()
            }
            .http_status_code(),
            400
        );
        assert_eq!(
            PaymentError::TokenUnavailable {
                operator: Operator::Moov
            }
            .http_status_code(),
            503
        );
        assert_eq!(
            PaymentError::ConfigError {
                message: "missing merchant code".to_string()
            }
            .http_status_code(),
            500
        );
    }

    #[test]
    fn retryable_flags_are_set() {
        assert!(PaymentError::NetworkError {
            message: "timeout".to_string()
        }
        .is_retryable());
        assert!(!PaymentError::ConfigError {
            message: "missing".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn converts_into_app_error_with_matching_status() {
        let err: crate::error::AppError = PaymentError::TokenUnavailable {
            operator: Operator::Airtel,
        }
        .into();
        assert_eq!(err.status_code(), 503);
    }
}
