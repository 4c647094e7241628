//! Payment initiation flows against the in-memory store

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{GatewayMode, Harness, ORDER_TOTAL, PHONE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storefront_payments::database::repository::PaymentStore;
use storefront_payments::error::ErrorCode;
use storefront_payments::payments::types::{
    NewPayment, Operator, Order, OrderPaymentStatus, OrderStatus, PaymentStatus,
};
use storefront_payments::services::payment_initiation::{
    InitiatePaymentRequest, PaymentInitiationService,
};
use uuid::Uuid;

#[tokio::test]
async fn accepted_request_leaves_payment_pending() {
    let h = Harness::new(GatewayMode::Accept).await;

    let outcome = h
        .initiation
        .initiate(h.user_id, h.initiate_request("airtel"))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.payment.status, PaymentStatus::Pending);
    assert_eq!(outcome.payment.amount, ORDER_TOTAL);
    assert_eq!(outcome.payment.operator, Operator::Airtel);
    assert!(outcome.payment.reference.len() <= 13);
    assert!(outcome.gateway_raw_response.contains("request sent"));

    let payment = h
        .store
        .payment_by_reference(&outcome.payment.reference)
        .await
        .unwrap();
    assert_eq!(payment.customer_phone, PHONE);
    assert_eq!(
        payment.gateway_request_payload.as_deref(),
        Some(outcome.gateway_raw_response.as_str())
    );

    let order = h.store.order(h.order_id).await.unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Processing);
    assert_eq!(order.payment_reference, Some(outcome.payment.reference));
}

#[tokio::test]
async fn rejected_request_is_recorded_as_error() {
    let h = Harness::new(GatewayMode::Reject).await;

    let outcome = h
        .initiation
        .initiate(h.user_id, h.initiate_request("moov"))
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.payment.status, PaymentStatus::Error);

    let payment = h
        .store
        .payment_by_reference(&outcome.payment.reference)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Error);
    assert!(payment
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("subscriber unknown"));

    // An ERROR attempt does not block a retry
    h.gateway.set_mode(GatewayMode::Accept);
    let retry = h
        .initiation
        .initiate(h.user_id, h.initiate_request("moov"))
        .await
        .unwrap();
    assert!(retry.success);
    assert_ne!(retry.payment.reference, outcome.payment.reference);
}

#[tokio::test]
async fn missing_session_token_marks_attempt_error() {
    let h = Harness::new(GatewayMode::NoToken).await;

    let err = h
        .initiation
        .initiate(h.user_id, h.initiate_request("airtel"))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 503);
    assert_eq!(h.gateway.initiated_count(), 1);
    let reference = h.gateway.initiated.lock().unwrap()[0].clone();
    let payment = h.store.payment_by_reference(&reference).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Error);
}

#[tokio::test]
async fn other_customers_order_is_not_found() {
    let h = Harness::new(GatewayMode::Accept).await;

    let err = h
        .initiation
        .initiate(Uuid::new_v4(), h.initiate_request("airtel"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::OrderNotFound);
    assert_eq!(err.status_code(), 404);

    let unknown = InitiatePaymentRequest {
        order_id: Uuid::new_v4(),
        ..h.initiate_request("airtel")
    };
    let err = h.initiation.initiate(h.user_id, unknown).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert_eq!(h.gateway.initiated_count(), 0);
}

#[tokio::test]
async fn paid_order_is_rejected() {
    let h = Harness::new(GatewayMode::Accept).await;
    let mut order: Order = h.store.order(h.order_id).await.unwrap();
    order.payment_status = OrderPaymentStatus::Completed;
    h.store.insert_order(order).await;

    let err = h
        .initiation
        .initiate(h.user_id, h.initiate_request("airtel"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::AlreadyPaid);
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn cancelled_order_is_not_payable() {
    let h = Harness::new(GatewayMode::Accept).await;
    let mut order: Order = h.store.order(h.order_id).await.unwrap();
    order.status = OrderStatus::Cancelled;
    h.store.insert_order(order).await;

    let err = h
        .initiation
        .initiate(h.user_id, h.initiate_request("airtel"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::OrderNotPayable);
}

#[tokio::test]
async fn second_attempt_while_pending_is_refused() {
    let h = Harness::new(GatewayMode::Accept).await;
    let reference = h.pending_payment().await;

    let err = h
        .initiation
        .initiate(h.user_id, h.initiate_request("airtel"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::PaymentInProgress);
    assert_eq!(err.status_code(), 409);
    assert_eq!(h.gateway.initiated_count(), 1);

    let active = h.store.find_active_for_order(h.order_id).await.unwrap();
    assert_eq!(active.map(|p| p.merchant_reference), Some(reference));
}

/// An attempt left INITIATING, as after a crash between the insert and the
/// gateway answer being recorded
async fn interrupted_attempt(h: &Harness) -> String {
    let reference = "BPINTERRUPT01".to_string();
    h.store
        .create_payment(&NewPayment {
            order_id: h.order_id,
            merchant_reference: reference.clone(),
            amount: ORDER_TOTAL,
            customer_phone: PHONE.to_string(),
            operator: Operator::Airtel,
        })
        .await
        .unwrap();
    reference
}

#[tokio::test]
async fn interrupted_attempt_is_expired_and_order_can_be_paid_again() {
    let h = Harness::new(GatewayMode::Accept).await;
    let stuck = interrupted_attempt(&h).await;
    h.store
        .backdate_payment(&stuck, Utc::now() - ChronoDuration::days(2))
        .await;

    let outcome = h
        .initiation
        .initiate(h.user_id, h.initiate_request("airtel"))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.payment.status, PaymentStatus::Pending);
    assert_ne!(outcome.payment.reference, stuck);

    let expired = h.store.payment_by_reference(&stuck).await.unwrap();
    assert_eq!(expired.status, PaymentStatus::Error);
    assert!(expired.error_message.is_some());

    let active = h.store.find_active_for_order(h.order_id).await.unwrap();
    assert_eq!(active.map(|p| p.merchant_reference), Some(outcome.payment.reference));
}

#[tokio::test]
async fn recent_initiating_attempt_still_blocks_a_second_one() {
    let h = Harness::new(GatewayMode::Accept).await;
    let in_flight = interrupted_attempt(&h).await;

    let err = h
        .initiation
        .initiate(h.user_id, h.initiate_request("airtel"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::PaymentInProgress);
    assert_eq!(h.gateway.initiated_count(), 0);

    let payment = h.store.payment_by_reference(&in_flight).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Initiating);
}

#[tokio::test]
async fn stale_cutoff_is_configurable() {
    let h = Harness::new(GatewayMode::Accept).await;
    let stuck = interrupted_attempt(&h).await;
    h.store
        .backdate_payment(&stuck, Utc::now() - ChronoDuration::seconds(45))
        .await;

    let initiation = PaymentInitiationService::new(
        Arc::new(h.store.clone()),
        Arc::new(h.store.clone()),
        h.gateway.clone(),
    )
    .with_stale_initiation_after(ChronoDuration::seconds(30));

    let outcome = initiation
        .initiate(h.user_id, h.initiate_request("moov"))
        .await
        .unwrap();
    assert!(outcome.success);
    let expired = h.store.payment_by_reference(&stuck).await.unwrap();
    assert_eq!(expired.status, PaymentStatus::Error);
}

#[tokio::test]
async fn bad_operator_or_phone_is_rejected_before_any_write() {
    let h = Harness::new(GatewayMode::Accept).await;

    let err = h
        .initiation
        .initiate(h.user_id, h.initiate_request("orange"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidOperator);
    assert_eq!(err.status_code(), 400);

    let request = InitiatePaymentRequest {
        customer_phone: "12345".to_string(),
        ..h.initiate_request("airtel")
    };
    let err = h.initiation.initiate(h.user_id, request).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidPhone);

    assert_eq!(h.gateway.initiated_count(), 0);
    assert!(h
        .store
        .find_active_for_order(h.order_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn reference_collision_is_retried_with_a_fresh_reference() {
    let h = Harness::new(GatewayMode::Accept).await;

    // Occupy "BPTAKEN" with a settled attempt on another order
    let other_order = Uuid::new_v4();
    let mut order = h.store.order(h.order_id).await.unwrap();
    order.id = other_order;
    h.store.insert_order(order).await;
    let first = PaymentInitiationService::new(
        Arc::new(h.store.clone()),
        Arc::new(h.store.clone()),
        h.gateway.clone(),
    )
    .with_reference_generator(Arc::new(|| "BPTAKEN".to_string()));
    first
        .initiate(
            h.user_id,
            InitiatePaymentRequest {
                order_id: other_order,
                ..h.initiate_request("airtel")
            },
        )
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let service = PaymentInitiationService::new(
        Arc::new(h.store.clone()),
        Arc::new(h.store.clone()),
        h.gateway.clone(),
    )
    .with_reference_generator(Arc::new(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            "BPTAKEN".to_string()
        } else {
            "BPFRESH".to_string()
        }
    }));

    let outcome = service
        .initiate(h.user_id, h.initiate_request("airtel"))
        .await
        .unwrap();
    assert_eq!(outcome.payment.reference, "BPFRESH");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_reference_retries_fail_cleanly() {
    let h = Harness::new(GatewayMode::Accept).await;

    let other_order = Uuid::new_v4();
    let mut order = h.store.order(h.order_id).await.unwrap();
    order.id = other_order;
    h.store.insert_order(order).await;

    let service = PaymentInitiationService::new(
        Arc::new(h.store.clone()),
        Arc::new(h.store.clone()),
        h.gateway.clone(),
    )
    .with_reference_generator(Arc::new(|| "BPSTUCK".to_string()));

    service
        .initiate(
            h.user_id,
            InitiatePaymentRequest {
                order_id: other_order,
                ..h.initiate_request("airtel")
            },
        )
        .await
        .unwrap();

    let err = service
        .initiate(h.user_id, h.initiate_request("airtel"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::DuplicateReference);
    assert_eq!(h.gateway.initiated_count(), 1);
}
