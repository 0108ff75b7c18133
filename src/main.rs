use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use shipper_sync::api::local::router;
use shipper_sync::api::rest::RestClient;
use shipper_sync::config::Config;
use shipper_sync::engine::offer::LogNotifier;
use shipper_sync::error::ShipperError;
use shipper_sync::state::ClientState;
use shipper_sync::store::backend::FileBackend;
use shipper_sync::sync::transport::WsConnector;

#[tokio::main]
async fn main() -> Result<(), ShipperError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let api = Arc::new(RestClient::new(&config.api_base_url, config.http_timeout())?);
    let state = Arc::new(
        ClientState::new(
            config.clone(),
            Arc::new(FileBackend::new(&config.store_dir)),
            Arc::new(WsConnector::new(&config.socket_url)),
            api,
            Arc::new(LogNotifier),
        )
        .await?,
    );

    let mut logged_in = state.start().await;
    if !logged_in {
        if let (Some(phone), Some(password)) = (&config.shipper_phone, &config.shipper_password) {
            match state.login(phone, password).await {
                Ok(session) => {
                    tracing::info!(shipper_id = session.shipper_id(), "auto-login succeeded");
                    logged_in = true;
                }
                Err(err) => tracing::error!(error = %err, "auto-login failed"),
            }
        }
    }

    if let Some(shipper_id) = state.shipper_id().filter(|_| logged_in) {
        if let Err(err) = state.orders.fetch_orders(&shipper_id).await {
            tracing::warn!(error = %err, "initial orders fetch failed; serving cached orders");
        }
    }

    let app = router(state.clone());
    let bind_addr = format!("127.0.0.1:{}", config.status_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| ShipperError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(status_port = config.status_port, "local control api started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ShipperError::Internal(format!("server error: {err}")))?;

    state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
