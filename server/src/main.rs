//! Identity oracle server
//!
//! Serves identity attestations over HTTP while following the node's chain
//! for recent block hashes and contract formations.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use identity_oracle::app_state::AppState;
use identity_oracle::approver::RemoteApprover;
use identity_oracle::config::Config;
use identity_oracle::contracts::{ContractFormationCache, PgFormationStorage};
use identity_oracle::feed::{ChainFollower, ChainSource, HeaderFeed, RpcFeed};
use identity_oracle::oracle::Oracle;
use identity_oracle::routes;
use identity_oracle::store::PgIdentityStore;
use identity_oracle::tracker::HeaderTracker;

const FOLLOWER_SUPERVISOR_MAX_BACKOFF_SECONDS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    info!(config = ?config, "starting identity oracle");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("failed to run migrations")?;

    let rpc = Arc::new(RpcFeed::new(
        config.node_rpc_url.clone(),
        config.node_rpc_user.clone(),
        config.node_rpc_password.clone(),
    ));
    let tracker = Arc::new(HeaderTracker::new(
        config.header_offset,
        rpc.clone() as Arc<dyn HeaderFeed>,
    ));
    if let Err(err) = tracker.load_snapshot(&config.header_snapshot_file).await {
        warn!(error = %err, "ignoring unreadable header snapshot");
    }

    let contracts = Arc::new(ContractFormationCache::new(
        Box::new(PgFormationStorage::new(db_pool.clone())),
        config.network,
        config.is_test,
    ));

    let mut oracle = Oracle::new(
        Arc::new(PgIdentityStore::new(db_pool.clone())),
        tracker.clone(),
        contracts.clone(),
        config.oracle_key.clone(),
        config.oracle_settings(),
    );
    match &config.approver_url {
        Some(url) => {
            info!(url = %url, "using remote approver");
            oracle = oracle.with_approver(Arc::new(RemoteApprover::new(url.clone())));
        }
        None => warn!("APPROVER_URL not set; every request is approved"),
    }
    if let Some(address) = config.contract_address.clone() {
        oracle = oracle.with_contract_address(address);
    }
    info!(public_key = %oracle.identity().public_key, "oracle key loaded");

    let shutdown = CancellationToken::new();

    // Start and supervise the chain follower.
    let follower_handle = {
        let shutdown = shutdown.clone();
        let rpc = rpc.clone();
        let tracker = tracker.clone();
        let contracts = contracts.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let mut restart_count: u32 = 0;
            loop {
                let follower = ChainFollower::new(
                    rpc.clone() as Arc<dyn ChainSource>,
                    tracker.clone(),
                    contracts.clone(),
                )
                .with_poll_interval(config.feed_poll_interval)
                .with_max_batch(config.feed_max_batch)
                .with_start_height(config.feed_start_height);
                let handle = tokio::spawn(follower.run(shutdown.clone()));

                match handle.await {
                    Ok(Ok(())) => {
                        info!("chain follower exited cleanly; stopping supervisor");
                        break;
                    }
                    Ok(Err(err)) => {
                        error!(error = %err, "chain follower failed; restarting");
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!("chain follower panicked; restarting");
                        } else {
                            error!(error = %join_error, "chain follower task failed; restarting");
                        }
                    }
                }
                if shutdown.is_cancelled() {
                    break;
                }

                restart_count = restart_count.saturating_add(1);
                let backoff_seconds = (2u64.saturating_pow(restart_count.min(5)))
                    .min(FOLLOWER_SUPERVISOR_MAX_BACKOFF_SECONDS);
                warn!(restart_count, backoff_seconds, "chain follower restart backoff");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(Duration::from_secs(backoff_seconds)) => {}
                }
            }
        })
    };

    let state = AppState::new(Arc::new(oracle), tracker.clone(), shutdown.clone());
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_allowed_origins));

    let listener = tokio::net::TcpListener::bind(config.api_host)
        .await
        .with_context(|| format!("failed to bind {}", config.api_host))?;
    info!("Server starting on {}", config.api_host);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("server error")?;

    shutdown.cancel();
    if timeout(config.shutdown_timeout, follower_handle).await.is_err() {
        warn!("chain follower did not stop in time");
    }
    if let Err(err) = tracker.save_snapshot(&config.header_snapshot_file).await {
        error!(error = %err, "failed to save header snapshot");
    }

    info!("identity oracle stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => {}
    }
    info!("shutdown requested");
    shutdown.cancel();
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_origins = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(false)
}
