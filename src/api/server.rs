use axum::{
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{self, AppState};
use crate::chains;
use crate::config::AppConfig;
use crate::error::WalletError;
use crate::keys::PublicKey;
use crate::signer::{LocalKeySigner, SignerBridge, TransactionSigner};
use crate::wallet::WalletManager;

/// Wire one wallet manager per configured ledger from the registry.
pub fn build_state(config: &AppConfig) -> Result<AppState, WalletError> {
    let signer = build_dev_signer(config)?;
    let bridge = SignerBridge::new(signer);

    let mut managers = HashMap::new();
    let mut tokens = HashMap::new();

    for settings in &config.chains {
        let adapter = chains::build_adapter(settings)?;
        let manager = WalletManager::new(
            adapter,
            bridge.clone(),
            PublicKey::new(settings.public_key.clone()),
        )?;
        managers.insert(settings.ledger, Arc::new(manager));
        tokens.insert(settings.ledger, settings.tokens.clone());
    }

    Ok(AppState { managers, tokens })
}

fn build_dev_signer(config: &AppConfig) -> Result<Arc<dyn TransactionSigner>, WalletError> {
    let mut signer = LocalKeySigner::new();

    if let Some(key) = &config.secp256k1_signing_key {
        let key: [u8; 32] = key.as_slice().try_into().map_err(|_| {
            WalletError::InvalidInput("SIGNER_SECP256K1_KEY must be 32 bytes".to_string())
        })?;
        signer = signer.with_secp256k1(key)?;
    }
    if let Some(key) = &config.ed25519_signing_key {
        let key: [u8; 32] = key.as_slice().try_into().map_err(|_| {
            WalletError::InvalidInput("SIGNER_ED25519_KEY must be 32 bytes".to_string())
        })?;
        signer = signer.with_ed25519(key);
    }

    Ok(Arc::new(signer))
}

pub async fn start_server(config: AppConfig) -> anyhow::Result<()> {
    let state = Arc::new(build_state(&config)?);

    // Configure CORS based on environment; any origin in development.
    let cors = match std::env::var("ALLOWED_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            log::info!("CORS configured for origins: {}", origins);
            let origin_list: Vec<_> = origins
                .split(',')
                .map(|s| s.trim().parse().expect("Invalid CORS origin"))
                .collect();
            CorsLayer::new()
                .allow_origin(origin_list)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        _ => {
            log::warn!("CORS: allowing all origins (development mode). Set ALLOWED_ORIGINS for production.");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    let app = Router::new()
        .route("/api/wallet/:ledger/update", post(handlers::update_handler))
        .route(
            "/api/wallet/:ledger/force-update",
            post(handlers::force_update_handler),
        )
        .route("/api/wallet/:ledger/balance", get(handlers::balance_handler))
        .route("/api/wallet/:ledger/pending", get(handlers::pending_handler))
        .route(
            "/api/wallet/:ledger/estimate-fee",
            post(handlers::estimate_fee_handler),
        )
        .route("/api/wallet/:ledger/send", post(handlers::send_handler))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    log::info!("Server listening on http://{}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            log::info!("Received SIGTERM signal");
        },
    }

    log::info!("Shutdown signal received, exiting gracefully...");
}
