// ── Server assembly and lifecycle ──

use std::sync::Arc;

use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use syncdesk_api::RecordClient;
use syncdesk_config::Config;
use syncdesk_core::{CacheStore, OperationExecutor, RecordService, SyncHub};

use crate::auth::TokenTable;
use crate::error::ServerError;
use crate::routes;
use crate::state::AppState;

/// Wire the remote client, cache, executor, and hub from `config`.
pub fn build_state(config: &Config) -> Result<AppState, ServerError> {
    let client = RecordClient::new(config.remote_url()?, &config.transport_config())?;
    let cache = Arc::new(CacheStore::new());
    let executor = OperationExecutor::new(client, cache, config.executor_config()?);
    let hub = Arc::new(SyncHub::new(config.hub_config()));
    let service = RecordService::new(executor, hub)
        .with_broadcast_invalidation(config.hub.invalidate_cache_on_broadcast);

    let auth = TokenTable::new(config.token_actors());
    if auth.is_open() {
        warn!("no auth tokens configured; callers are anonymous and broadcast ingress is refused");
    }
    Ok(AppState::new(service, auth))
}

pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, ServerError> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ServerError::CorsOrigin {
                origin: origin.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Run until ctrl-c: bind, spawn background tasks, serve, then drain.
pub async fn serve(config: &Config) -> Result<(), ServerError> {
    let addr = config.bind_addr()?;
    let shutdown = CancellationToken::new();
    let state = build_state(config)?.with_shutdown(shutdown.clone());

    let mut tasks: Vec<JoinHandle<()>> = vec![state.hub().spawn_heartbeat(shutdown.clone())];
    if let Some(every) = config.cache_sweep_interval() {
        let cache = Arc::clone(state.service.executor().cache());
        tasks.push(cache.spawn_sweeper(every, shutdown.clone()));
    }

    let app = routes::router(state, cors_layer(&config.server.cors_origins)?);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, remote = %config.remote.base_url, "syncdesk listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    for task in tasks {
        if let Err(err) = task.await {
            warn!(error = %err, "background task ended abnormally");
        }
    }
    info!("syncdesk stopped");
    Ok(())
}
