use std::{sync::Arc, time::Duration};

use anyhow::Context;
use storefront_api::{
    build_services,
    config::{init_tracing, load_config},
    db::establish_connection,
    events::{process_events, EventSender},
    services::{checkout::run_pending_order_sweep, HttpPaymentGateway},
    AppState,
};
use tokio::{net::TcpListener, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_json);

    let db = Arc::new(
        establish_connection(&config)
            .await
            .context("failed to connect to database")?,
    );

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(EventSender::new(event_tx));
    tokio::spawn(process_events(event_rx));

    let gateway = Arc::new(HttpPaymentGateway::new(
        config.payment_gateway_url.clone(),
        config.payment_gateway_token.clone(),
    ));
    let services = build_services(db.clone(), event_sender.clone(), gateway);

    tokio::spawn(run_pending_order_sweep(
        services.checkout.clone(),
        config.pending_order_ttl_hours,
        Duration::from_secs(config.sweep_interval_secs),
    ));

    let bind_address = config.bind_address();
    let state = Arc::new(AppState {
        db,
        config,
        event_sender,
        services,
    });

    let app = storefront_api::app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    info!(address = %bind_address, "storefront api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
