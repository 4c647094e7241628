pub mod auth;
pub mod callbacks;
pub mod payments;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::services::{
    CallbackReconciliationService, FeeCalculationService, PaymentInitiationService,
    PaymentStatusService,
};

#[derive(Clone)]
pub struct PaymentsState {
    pub initiation: Arc<PaymentInitiationService>,
    pub callbacks: Arc<CallbackReconciliationService>,
    pub fees: Arc<FeeCalculationService>,
    pub status: Arc<PaymentStatusService>,
}

/// Payment routes with their state applied
pub fn routes(state: PaymentsState) -> Router {
    Router::new()
        .route("/api/payments/initiate", post(payments::initiate_payment))
        .route("/api/payments/callback", post(callbacks::handle_callback))
        .route("/api/payments/fees", post(payments::calculate_fees))
        .route(
            "/api/payments/status/{reference}",
            get(payments::get_payment_status),
        )
        .with_state(state)
}
