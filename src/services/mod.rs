//! Services module for business logic and integrations

pub mod callback_reconciliation;
pub mod fee_calculation;
pub mod notification;
pub mod payment_initiation;
pub mod payment_status;

pub use callback_reconciliation::{CallbackAck, CallbackReconciliationService, ReconciliationError};
pub use fee_calculation::FeeCalculationService;
pub use notification::NotificationService;
pub use payment_initiation::PaymentInitiationService;
pub use payment_status::PaymentStatusService;
