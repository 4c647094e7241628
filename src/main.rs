use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use storefront_payments::api::{self, PaymentsState};
use storefront_payments::config::AppConfig;
use storefront_payments::database::memory::InMemoryStore;
use storefront_payments::database::order_repository::OrderRepository;
use storefront_payments::database::payment_repository::PaymentRepository;
use storefront_payments::database::reconciliation_repository::ReconciliationRepository;
use storefront_payments::database::repository::{
    OrderStore, PaymentStore, ReconciliationStore, TokenStore,
};
use storefront_payments::database::token_repository::TokenRepository;
use storefront_payments::database::{init_pool, run_migrations, PoolConfig};
use storefront_payments::health::{self, HealthChecker};
use storefront_payments::logging::init_tracing;
use storefront_payments::middleware::logging::{request_logging_middleware, UuidRequestId};
use storefront_payments::payments::gateway::PaymentGateway;
use storefront_payments::payments::providers::MobileMoneyGateway;
use storefront_payments::services::{
    CallbackReconciliationService, FeeCalculationService, NotificationService,
    PaymentInitiationService, PaymentStatusService,
};
use storefront_payments::workers::payment_status_poller::{
    PaymentStatusPoller, PaymentStatusPollerConfig,
};
use storefront_payments::workers::stock_reconciliation::{
    StockReconciliationConfig, StockReconciliationWorker,
};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

/// Added to the gateway timeout before an `INITIATING` attempt counts as interrupted
const STALE_INITIATION_MARGIN_SECS: i64 = 60;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

/// Store handles shared by services and workers
struct Stores {
    db_pool: Option<sqlx::PgPool>,
    payments: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderStore>,
    reconciliation: Arc<dyn ReconciliationStore>,
    tokens: Arc<dyn TokenStore>,
}

async fn init_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    let Some(database) = config.database.as_ref().filter(|_| !config.skip_externals) else {
        info!("⏭️  Skipping database initialization (SKIP_EXTERNALS=true), using in-memory store");
        let store = InMemoryStore::new();
        return Ok(Stores {
            db_pool: None,
            payments: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            reconciliation: Arc::new(store.clone()),
            tokens: Arc::new(store),
        });
    };

    info!("📊 Initializing database connection pool...");
    let pool = init_pool(&database.url, Some(PoolConfig::from(database)))
        .await
        .map_err(|e| {
            error!("Failed to initialize database pool: {}", e);
            e
        })?;
    info!(
        max_connections = pool.options().get_max_connections(),
        "✅ Database connection pool initialized"
    );

    if database.run_migrations {
        run_migrations(&pool).await?;
    }

    Ok(Stores {
        db_pool: Some(pool.clone()),
        payments: Arc::new(PaymentRepository::new(pool.clone())),
        orders: Arc::new(OrderRepository::new(pool.clone())),
        reconciliation: Arc::new(ReconciliationRepository::new(pool.clone())),
        tokens: Arc::new(TokenRepository::new(pool)),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        gateway = %config.gateway.base_url,
        "🚀 Starting storefront payments service"
    );

    let stores = init_stores(&config).await?;

    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        MobileMoneyGateway::new(config.gateway.clone(), stores.tokens.clone()).map_err(|e| {
            error!(error = %e, "Failed to build mobile money gateway client");
            anyhow::anyhow!(e)
        })?,
    );
    info!(gateway = gateway.name(), "✅ Payment gateway configured");

    let notifier = Arc::new(NotificationService::new());
    let callbacks = Arc::new(CallbackReconciliationService::new(
        stores.payments.clone(),
        stores.reconciliation.clone(),
        stores.tokens.clone(),
        notifier,
    ));
    let state = PaymentsState {
        initiation: Arc::new(
            PaymentInitiationService::new(
                stores.orders.clone(),
                stores.payments.clone(),
                gateway.clone(),
            )
            .with_stale_initiation_after(chrono::Duration::seconds(
                config.gateway.request_timeout_secs as i64 + STALE_INITIATION_MARGIN_SECS,
            )),
        ),
        callbacks: callbacks.clone(),
        fees: Arc::new(FeeCalculationService::new(gateway.clone())),
        status: Arc::new(PaymentStatusService::new(stores.payments.clone())),
    };

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let mut worker_handles: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    if config.workers.stock_resume_enabled {
        let worker = StockReconciliationWorker::new(
            callbacks.clone(),
            StockReconciliationConfig::from(&config.workers),
        );
        worker_handles.push((
            "stock reconciliation",
            tokio::spawn(worker.run(worker_shutdown_rx.clone())),
        ));
    } else {
        info!("⏭️  Stock reconciliation worker disabled");
    }

    if config.workers.status_poll_enabled {
        let poller = PaymentStatusPoller::new(
            stores.payments.clone(),
            gateway.clone(),
            callbacks.clone(),
            PaymentStatusPollerConfig::new(&config.workers, config.gateway.status_lookback_days),
        );
        worker_handles.push((
            "payment status poller",
            tokio::spawn(poller.run(worker_shutdown_rx.clone())),
        ));
    } else {
        info!("⏭️  Payment status poller disabled");
    }

    let app = api::routes(state)
        .merge(health::routes(HealthChecker::new(stores.db_pool.clone())))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    for (name, handle) in worker_handles {
        if tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            warn!(worker = name, "Timed out waiting for worker shutdown");
        }
    }

    info!("👋 Server shutdown complete");

    Ok(())
}
