use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use order_relay::config::AppConfig;
use order_relay::modules::orders::adapters::outbound::postgres::PgOrderStore;
use order_relay::modules::orders::core::events::{
    EVENT_ORDER_CREATED, EVENT_ORDER_STATUS_CHANGED, EVENT_ORDER_UPDATED,
};
use order_relay::modules::orders::use_cases::create_order::handler::CreateOrderHandler;
use order_relay::modules::orders::use_cases::update_order::handler::UpdateOrderHandler;
use order_relay::modules::orders::use_cases::update_order_status::handler::UpdateOrderStatusHandler;
use order_relay::modules::shipments::adapters::outbound::postgres::PgShipmentStore;
use order_relay::modules::shipments::use_cases::request_shipment::handler::RequestShipmentHandler;
use order_relay::relay::handlers::{BusPublishHandler, LoggingHandler};
use order_relay::relay::{
    DeadLetterRedriver, DispatcherConfig, MessageHandler, OutboxDispatcher, RedriverConfig,
};
use order_relay::shared::clients::warehouse::WarehouseClient;
use order_relay::shared::infrastructure::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use order_relay::shared::infrastructure::database;
use order_relay::shared::infrastructure::dead_letter::postgres::PgDeadLetterStore;
use order_relay::shared::infrastructure::event_bus::pulsar::PulsarEventBus;
use order_relay::shared::infrastructure::outbox::postgres::PgOutboxStore;
use order_relay::shared::infrastructure::ratelimit::{AdaptiveRateLimiter, KeyedRateLimiter};
use order_relay::shell::http::build_router;
use order_relay::shell::state::{AdmissionState, AppState};

const GLOBAL_MAX_TOKENS: f64 = 100.0;
const GLOBAL_MAX_RATE: f64 = 100.0;
const GLOBAL_MIN_RATE: f64 = 10.0;
const GLOBAL_LOAD_THRESHOLD: f64 = 0.8;

const IP_MAX_TOKENS: f64 = 60.0;
const IP_REFILL_RATE: f64 = 1.0;
const ENDPOINT_MAX_TOKENS: f64 = 30.0;
const ENDPOINT_REFILL_RATE: f64 = 10.0;
const LIMITER_IDLE_WINDOW: Duration = Duration::from_secs(30 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level);
    info!(env = %config.environment, "starting order-relay");

    let pool = database::connect(&config)
        .await
        .context("failed to connect to database")?;
    database::run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    let orders = Arc::new(PgOrderStore::new(pool.clone()));
    let shipments = Arc::new(PgShipmentStore::new(pool.clone()));
    let outbox = Arc::new(PgOutboxStore::new(pool.clone()));
    let dead_letters = Arc::new(PgDeadLetterStore::new(pool.clone()));

    let warehouse = Arc::new(
        WarehouseClient::new(config.warehouse_url.clone())
            .map_err(|err| anyhow::anyhow!("failed to build warehouse client: {err}"))?,
    );

    // When no bus is configured, events are drained into the log instead.
    let bus_configured = !config.bus.base_url.is_empty();
    let delivery_handler: Arc<dyn MessageHandler> = if bus_configured {
        let producer = Arc::new(
            PulsarEventBus::new(&config.bus)
                .map_err(|err| anyhow::anyhow!("failed to build bus producer: {err}"))?,
        );
        Arc::new(BusPublishHandler::new(producer, config.bus.orders_topic.clone()))
    } else {
        info!("no bus configured, outbox events will be logged only");
        Arc::new(LoggingHandler::new())
    };

    let mut dispatcher = OutboxDispatcher::new(
        outbox.clone(),
        dead_letters.clone(),
        DispatcherConfig::default(),
    );
    let mut redriver = DeadLetterRedriver::new(dead_letters.clone(), RedriverConfig::default());
    for event_type in [
        EVENT_ORDER_CREATED,
        EVENT_ORDER_UPDATED,
        EVENT_ORDER_STATUS_CHANGED,
    ] {
        dispatcher.register_handler(event_type, delivery_handler.clone());
        redriver.register_handler(event_type, delivery_handler.clone());
    }
    let dispatcher = Arc::new(dispatcher);
    let redriver = Arc::new(redriver);

    let admission = Arc::new(AdmissionState {
        global: Arc::new(AdaptiveRateLimiter::new(
            GLOBAL_MAX_TOKENS,
            GLOBAL_MAX_RATE,
            GLOBAL_MIN_RATE,
            GLOBAL_LOAD_THRESHOLD,
        )),
        per_ip: Arc::new(KeyedRateLimiter::new(
            IP_MAX_TOKENS,
            IP_REFILL_RATE,
            LIMITER_IDLE_WINDOW,
        )),
        per_endpoint: Arc::new(KeyedRateLimiter::new(
            ENDPOINT_MAX_TOKENS,
            ENDPOINT_REFILL_RATE,
            LIMITER_IDLE_WINDOW,
        )),
        breaker: Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default())),
        trust_forwarded_for: true,
    });

    let shutdown = CancellationToken::new();
    let supervisor = admission.global.spawn_supervisor(shutdown.child_token());
    let ip_sweeper = admission.per_ip.spawn_sweeper(shutdown.child_token());
    let endpoint_sweeper = admission.per_endpoint.spawn_sweeper(shutdown.child_token());

    dispatcher.start();
    redriver.start();

    let state = AppState {
        orders: orders.clone(),
        dead_letters: dead_letters.clone(),
        health: Arc::new(database::PgHealthProbe::new(pool.clone())),
        create_order: Arc::new(CreateOrderHandler::new(orders.clone())),
        update_order: Arc::new(UpdateOrderHandler::new(orders.clone())),
        update_order_status: Arc::new(UpdateOrderStatusHandler::new(orders.clone())),
        request_shipment: Arc::new(RequestShipmentHandler::new(orders, shipments, warehouse)),
        admission: admission.clone(),
        bus_configured,
    };

    let router = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, "order-relay listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Shutdown order: server is down, then workers, then background
    // supervisors, then the pool.
    info!("shutting down");
    dispatcher.stop().await;
    redriver.stop().await;
    shutdown.cancel();
    for handle in [supervisor, ip_sweeper, endpoint_sweeper] {
        if let Err(err) = handle.await {
            error!(error = %err, "background task ended abnormally");
        }
    }
    pool.close().await;

    info!("order-relay stopped");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let default_filter = format!("order_relay={log_level},tower_http=info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
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
}
