// Cashback Relay — gasless-cashback transaction relay
//
// Front door: JSON-RPC gateway for signed transactions
// Background: receipt reconciler + reward epoch calculator

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use cashback_relay::chain::{EthRpcClient, PrivateRelayClient};
use cashback_relay::config::Config;
use cashback_relay::gateway::{RelayGateway, RpcCall};
use cashback_relay::metrics::prometheus as metrics;
use cashback_relay::rewards::RebateCalculator;
use cashback_relay::store::LedgerStore;
use cashback_relay::workers::{EpochCalculator, TxReconciler};

#[derive(Clone)]
struct ApiState {
    gateway: Arc<RelayGateway>,
    store: Arc<LedgerStore>,
}

async fn api_rpc(State(state): State<ApiState>, Json(body): Json<Value>) -> Json<Value> {
    let call: RpcCall = match serde_json::from_value(body) {
        Ok(call) => call,
        Err(e) => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": { "code": -32600, "message": format!("Invalid request: {}", e) },
            }));
        }
    };
    Json(state.gateway.handle(call).await)
}

async fn api_health(State(state): State<ApiState>) -> Json<Value> {
    let db_ok = state.store.ping().await.is_ok();
    metrics::set_store_up(db_ok);
    Json(json!({"status": "ok", "database": db_ok}))
}

async fn api_metrics() -> impl IntoResponse {
    let body = metrics::render();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn api_claimable(
    Path(addr): Path<String>,
    State(state): State<ApiState>,
) -> Json<Value> {
    let addr = addr.to_lowercase();
    let user_id = match state.store.user_id_for_address(&addr).await {
        Ok(Some(id)) => id,
        Ok(None) => return Json(json!({"ok": true, "rewards": []})),
        Err(e) => return Json(json!({"ok": false, "error": e.to_string()})),
    };
    match state.store.claimable_rewards(user_id).await {
        Ok(rewards) => Json(json!({"ok": true, "rewards": rewards})),
        Err(e) => Json(json!({"ok": false, "error": e.to_string()})),
    }
}

// Cross-platform signal wait: ctrl_c + SIGTERM on Unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("SIGTERM — shutting down"),
            _ = ctrl_c => tracing::info!("SIGINT — shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        // Windows: only ctrl_c is supported
        tokio::signal::ctrl_c().await.expect("Failed to register Ctrl+C handler");
        tracing::info!("Ctrl+C — shutting down");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cfg = Config::load();
    tracing::info!("Cashback Relay starting");

    // One shutdown broadcast for the HTTP server and every worker loop
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });
    }

    // Gateway store: shared with the HTTP API
    let store = match LedgerStore::connect(&cfg.database_url).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to connect to PostgreSQL: {:#}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = store.init_schema().await {
        tracing::error!("Failed to initialize schema: {:#}", e);
        std::process::exit(1);
    }
    let store = Arc::new(store);

    let chain = Arc::new(EthRpcClient::new(
        cfg.chain_rpc_url.clone(),
        Duration::from_secs(cfg.rpc_timeout_secs),
    ));

    let private_relay = match &cfg.private_relay_url {
        Some(url) => match PrivateRelayClient::new(url.clone(), Duration::from_secs(cfg.rpc_timeout_secs)) {
            Ok(relay) => {
                tracing::info!("Private relay fallback enabled: {}", url);
                Some(relay)
            }
            Err(e) => {
                tracing::error!("Failed to build private relay client: {:#}", e);
                None
            }
        },
        None => {
            tracing::warn!("No private relay configured - submissions fail hard on node errors");
            None
        }
    };

    // Reconciler owns its own connection
    match LedgerStore::connect(&cfg.database_url).await {
        Ok(reconciler_store) => {
            let reconciler = TxReconciler::new(
                reconciler_store,
                chain.clone(),
                Duration::from_secs(cfg.reconcile_interval_secs),
                Duration::from_secs(cfg.reconcile_grace_secs),
                Duration::from_secs(cfg.stale_after_secs),
                cfg.reconcile_batch_limit,
            );
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                reconciler.run(shutdown).await;
            });
        }
        Err(e) => tracing::error!("Failed to start reconciler: {:#}", e),
    }

    // Epoch calculator owns its own connection; write_epoch needs &mut
    match LedgerStore::connect(&cfg.database_url).await {
        Ok(epoch_store) => {
            let calculator = EpochCalculator::new(
                epoch_store,
                RebateCalculator::new(Some(cfg.cashback_percent)),
                cfg.reward_token.clone(),
                cfg.staking_token.clone(),
                Duration::from_secs(cfg.epoch_interval_secs),
            );
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                calculator.run(shutdown).await;
            });
        }
        Err(e) => tracing::error!("Failed to start epoch calculator: {:#}", e),
    }

    let gateway = Arc::new(RelayGateway::new(
        chain.clone(),
        private_relay,
        store.clone(),
    ));

    let api_state = ApiState {
        gateway,
        store: store.clone(),
    };

    let api = axum::Router::new()
        .route("/rpc", post(api_rpc))
        .route("/health", get(api_health))
        .route("/metrics", get(api_metrics))
        .route("/rewards/:addr/claimable", get(api_claimable))
        .with_state(api_state);

    let listener = tokio::net::TcpListener::bind(&cfg.api_listen).await.unwrap();

    let mut server_shutdown = shutdown_rx;
    tracing::info!("Cashback Relay API listening on {}", cfg.api_listen);
    axum::serve(listener, api)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await
        .unwrap();

    tracing::info!("Cashback Relay shut down cleanly");
}
