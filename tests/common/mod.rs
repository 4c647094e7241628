#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use storefront_payments::api::PaymentsState;
use storefront_payments::database::memory::InMemoryStore;
use storefront_payments::payments::error::{PaymentError, PaymentResult};
use storefront_payments::payments::gateway::PaymentGateway;
use storefront_payments::payments::types::{
    GatewayResult, Operator, Order, OrderItem, OrderPaymentStatus, OrderStatus, Product,
};
use storefront_payments::services::payment_initiation::InitiatePaymentRequest;
use storefront_payments::services::{
    CallbackReconciliationService, FeeCalculationService, NotificationService,
    PaymentInitiationService, PaymentStatusService,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Accept,
    Reject,
    NoToken,
}

/// Scripted gateway that records every reference it is asked about
pub struct FakeGateway {
    mode: Mutex<GatewayMode>,
    status_body: Mutex<String>,
    pub initiated: Mutex<Vec<String>>,
    pub status_queries: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new(mode: GatewayMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            status_body: Mutex::new("<response><statut>pending</statut></response>".to_string()),
            initiated: Mutex::new(Vec::new()),
            status_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: GatewayMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_status_body(&self, body: impl Into<String>) {
        *self.status_body.lock().unwrap() = body.into();
    }

    pub fn initiated_count(&self) -> usize {
        self.initiated.lock().unwrap().len()
    }

    fn mode(&self) -> GatewayMode {
        *self.mode.lock().unwrap()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initiate(
        &self,
        _amount: i64,
        merchant_reference: &str,
        _customer_phone: &str,
        operator: Operator,
    ) -> PaymentResult<GatewayResult> {
        self.initiated
            .lock()
            .unwrap()
            .push(merchant_reference.to_string());
        match self.mode() {
            GatewayMode::Accept => Ok(GatewayResult::accepted(
                "<response><code>0</code><message>request sent</message></response>",
            )),
            GatewayMode::Reject => Ok(GatewayResult::rejected(
                "<response><code>-1</code><message>subscriber unknown</message></response>",
            )),
            GatewayMode::NoToken => Err(PaymentError::TokenUnavailable { operator }),
        }
    }

    async fn calculate_fees(&self, amount: i64, operator: Operator) -> PaymentResult<GatewayResult> {
        match self.mode() {
            GatewayMode::NoToken => Err(PaymentError::TokenUnavailable { operator }),
            _ => Ok(GatewayResult::accepted(format!(
                "{{\"amount\":{},\"fees\":{}}}",
                amount,
                amount / 100
            ))),
        }
    }

    async fn query_status(
        &self,
        merchant_reference: &str,
        operator: Operator,
        _lookback_days: u32,
    ) -> PaymentResult<GatewayResult> {
        self.status_queries
            .lock()
            .unwrap()
            .push(merchant_reference.to_string());
        match self.mode() {
            GatewayMode::NoToken => Err(PaymentError::TokenUnavailable { operator }),
            _ => Ok(GatewayResult::accepted(self.status_body.lock().unwrap().clone())),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

pub const ORDER_TOTAL: i64 = 5000;
pub const INITIAL_STOCK: i32 = 10;
pub const QUANTITY: i32 = 2;
pub const PHONE: &str = "074123456";

/// Services wired onto one in-memory store
pub struct Harness {
    pub store: InMemoryStore,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<NotificationService>,
    pub initiation: Arc<PaymentInitiationService>,
    pub callbacks: Arc<CallbackReconciliationService>,
    pub fees: Arc<FeeCalculationService>,
    pub status: Arc<PaymentStatusService>,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
}

impl Harness {
    /// One customer owning order O1 for two units of product P1 (stock 10)
    pub async fn new(mode: GatewayMode) -> Self {
        let store = InMemoryStore::new();
        let gateway = Arc::new(FakeGateway::new(mode));
        let notifier = Arc::new(NotificationService::new());

        let user_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        let product_id = Uuid::new_v4();

        store
            .insert_product(Product {
                id: product_id,
                stock: INITIAL_STOCK,
                sales: 0,
            })
            .await;
        store
            .insert_order(Order {
                id: order_id,
                user_id,
                total_amount: ORDER_TOTAL,
                items: vec![OrderItem {
                    product_id,
                    quantity: QUANTITY,
                    unit_price: ORDER_TOTAL / QUANTITY as i64,
                }],
                payment_status: OrderPaymentStatus::Pending,
                status: OrderStatus::Pending,
                payment_reference: None,
            })
            .await;

        let initiation = Arc::new(PaymentInitiationService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            gateway.clone(),
        ));
        let callbacks = Arc::new(CallbackReconciliationService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            notifier.clone(),
        ));
        let fees = Arc::new(FeeCalculationService::new(gateway.clone()));
        let status = Arc::new(PaymentStatusService::new(Arc::new(store.clone())));

        Self {
            store,
            gateway,
            notifier,
            initiation,
            callbacks,
            fees,
            status,
            user_id,
            order_id,
            product_id,
        }
    }

    pub fn state(&self) -> PaymentsState {
        PaymentsState {
            initiation: self.initiation.clone(),
            callbacks: self.callbacks.clone(),
            fees: self.fees.clone(),
            status: self.status.clone(),
        }
    }

    pub fn initiate_request(
        &self,
        operator: &str,
    ) -> InitiatePaymentRequest {
        InitiatePaymentRequest {
            order_id: self.order_id,
            customer_phone: PHONE.to_string(),
            operator: operator.to_string(),
        }
    }

    /// Initiate an accepted payment for O1 and return its merchant reference
    pub async fn pending_payment(&self) -> String {
        self.pending_payment_for(self.order_id).await
    }

    /// Another order for the same customer, one unit of P1
    pub async fn extra_order(&self) -> Uuid {
        let order_id = Uuid::new_v4();
        self.store
            .insert_order(Order {
                id: order_id,
                user_id: self.user_id,
                total_amount: ORDER_TOTAL / QUANTITY as i64,
                items: vec![OrderItem {
                    product_id: self.product_id,
                    quantity: 1,
                    unit_price: ORDER_TOTAL / QUANTITY as i64,
                }],
                payment_status: OrderPaymentStatus::Pending,
                status: OrderStatus::Pending,
                payment_reference: None,
            })
            .await;
        order_id
    }

    pub async fn pending_payment_for(&self, order_id: Uuid) -> String {
        let request = InitiatePaymentRequest {
            order_id,
            ..self.initiate_request("airtel")
        };
        let outcome = self
            .initiation
            .initiate(self.user_id, request)
            .await
            .expect("initiation should succeed");
        assert!(outcome.success);
        outcome.payment.reference
    }
}

pub fn callback_xml(statut: &str, reference: &str) -> String {
    format!(
        "<result><statut>{}</statut><ref>{}</ref><numero_client>{}</numero_client><amount>{}</amount><fees>50</fees><token>tok-refreshed</token><message>{}</message></result>",
        statut,
        reference,
        PHONE,
        ORDER_TOTAL,
        if statut == "1" { "paid" } else { "insufficient balance" }
    )
}
