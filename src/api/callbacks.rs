use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::api::PaymentsState;
use crate::services::callback_reconciliation::{CallbackAck, ReconciliationError};

fn plain(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body.into(),
    )
        .into_response()
}

/// POST /api/payments/callback
///
/// Public endpoint hit by the gateway. Anything but `200 OK` makes it redeliver.
pub async fn handle_callback(State(state): State<PaymentsState>, body: String) -> Response {
    match state.callbacks.handle_callback(&body).await {
        Ok(CallbackAck::Processed {
            reference, status, ..
        }) => {
            info!(reference = %reference, status = %status, "Callback processed");
            plain(StatusCode::OK, "OK")
        }
        Ok(CallbackAck::Duplicate { reference, .. }) => {
            info!(reference = %reference, "Callback already processed");
            plain(StatusCode::OK, "OK")
        }
        Err(e) => {
            let status = StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            match &e {
                ReconciliationError::Database(db_err) => {
                    error!(error = %db_err, "Callback processing failed");
                    plain(status, "Internal error")
                }
                _ => {
                    warn!(error = %e, status = status.as_u16(), "Callback rejected");
                    plain(status, e.to_string())
                }
            }
        }
    }
}
