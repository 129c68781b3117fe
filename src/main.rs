use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use storefront_api::auth::AuthService;
use storefront_api::handlers::AppServices;
use storefront_api::services::payments::HostedCheckoutClient;
use storefront_api::{app_router, config, db, events, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("loading configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);
    info!(
        environment = %cfg.environment,
        "starting {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let db = Arc::new(
        db::establish_connection(&cfg.database_url, cfg.db_max_connections)
            .await
            .context("connecting to database")?,
    );
    if cfg.auto_migrate {
        db::create_schema(&db).await.context("ensuring schema")?;
    }

    let (tx, rx) = mpsc::channel(1024);
    let event_sender = Arc::new(events::EventSender::new(tx));
    tokio::spawn(events::process_events(rx));

    let gateway = Arc::new(
        HostedCheckoutClient::new(cfg.payment.clone()).context("building payment client")?,
    );
    let auth = Arc::new(AuthService::new(&cfg.jwt_secret, cfg.jwt_expiration));
    let services = AppServices::new(db.clone(), gateway, Some(event_sender.clone()));

    let cors = if cfg.is_development() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    let addr = cfg.server_addr();
    let state = AppState {
        db,
        config: Arc::new(cfg),
        auth,
        event_sender: Some(event_sender),
        services,
    };

    let app = app_router()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(cors)
        .with_state(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("shutdown signal received");
}
