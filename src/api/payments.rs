use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

use crate::api::auth::CustomerId;
use crate::api::PaymentsState;
use crate::error::{AppError, AppErrorKind, AppResult, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::reference::is_valid_reference;
use crate::services::fee_calculation::{FeeQuote, FeeRequest};
use crate::services::payment_initiation::{InitiatePaymentRequest, InitiationOutcome};
use crate::services::payment_status::PaymentStatusResponse;

fn tag(err: AppError, headers: &HeaderMap) -> AppError {
    match get_request_id_from_headers(headers) {
        Some(request_id) => err.with_request_id(request_id),
        None => err,
    }
}

fn body_error(rejection: JsonRejection) -> AppError {
    AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
        field: "body".to_string(),
        reason: rejection.body_text(),
    }))
}

/// POST /api/payments/initiate
pub async fn initiate_payment(
    State(state): State<PaymentsState>,
    CustomerId(user_id): CustomerId,
    headers: HeaderMap,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> AppResult<Json<InitiationOutcome>> {
    let Json(request) = payload.map_err(|e| tag(body_error(e), &headers))?;

    info!(
        user_id = %user_id,
        order_id = %request.order_id,
        operator = %request.operator,
        "Payment initiation requested"
    );

    let outcome = state
        .initiation
        .initiate(user_id, request)
        .await
        .map_err(|e| tag(e, &headers))?;

    Ok(Json(outcome))
}

/// POST /api/payments/fees
pub async fn calculate_fees(
    State(state): State<PaymentsState>,
    headers: HeaderMap,
    payload: Result<Json<FeeRequest>, JsonRejection>,
) -> AppResult<Json<FeeQuote>> {
    let Json(request) = payload.map_err(|e| tag(body_error(e), &headers))?;

    let quote = state
        .fees
        .calculate_fees(request.amount, &request.operator)
        .await
        .map_err(|e| tag(e, &headers))?;

    Ok(Json(quote))
}

/// GET /api/payments/status/{reference}
pub async fn get_payment_status(
    State(state): State<PaymentsState>,
    CustomerId(user_id): CustomerId,
    headers: HeaderMap,
    Path(reference): Path<String>,
) -> AppResult<Json<PaymentStatusResponse>> {
    if !is_valid_reference(&reference) {
        return Err(tag(
            AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
                field: "reference".to_string(),
                reason: "must be 1 to 13 alphanumeric characters".to_string(),
            })),
            &headers,
        ));
    }

    let view = state
        .status
        .get_status(&reference, user_id)
        .await
        .map_err(|e| tag(e, &headers))?;

    Ok(Json(PaymentStatusResponse::from(view)))
}
