//! Configuration from environment variables
//!
//! Controls the HTTP bind address, per-ledger provider endpoint lists,
//! wallet public keys and the dev signing keys.

use std::env;

use crate::chains::Ledger;

#[derive(Clone, Debug)]
pub struct ProviderEndpoint {
    /// Diagnostic name (derived from the URL host when not given).
    pub name: String,
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ChainSettings {
    pub ledger: Ledger,
    /// Ordered failover list; the first entry is the preferred provider.
    pub providers: Vec<ProviderEndpoint>,
    /// EIP-155 chain id; unused by non-account ledgers.
    pub chain_id: u64,
    /// Wallet public key supplied by the custody layer.
    pub public_key: Vec<u8>,
    /// Tokens tracked for this wallet.
    pub tokens: Vec<crate::amount::Token>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_address: String,
    pub chains: Vec<ChainSettings>,
    /// Dev signing keys for the in-process signer (hex, 32 bytes each).
    pub secp256k1_signing_key: Option<Vec<u8>>,
    pub ed25519_signing_key: Option<Vec<u8>>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// - `BIND_ADDRESS`: listen address, default `0.0.0.0:3000`
    /// - `<LEDGER>_PROVIDERS`: comma-separated provider URLs in failover
    ///   order (`CARDANO_PROVIDERS`, `ETHEREUM_PROVIDERS`)
    /// - `<LEDGER>_API_KEY`: optional provider API key
    /// - `<LEDGER>_PUBLIC_KEY`: hex wallet public key; a ledger without
    ///   one is skipped
    /// - `<LEDGER>_TOKENS`: optional JSON array of tracked tokens
    /// - `ETHEREUM_CHAIN_ID`: default 1
    /// - `SIGNER_SECP256K1_KEY`, `SIGNER_ED25519_KEY`: hex dev signing keys
    pub fn from_env() -> Self {
        let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let mut chains = Vec::new();
        for ledger in [Ledger::Cardano, Ledger::Ethereum] {
            match Self::chain_from_env(ledger) {
                Some(settings) => chains.push(settings),
                None => log::warn!(
                    "{}: providers or public key not configured, ledger disabled",
                    ledger
                ),
            }
        }

        Self {
            bind_address,
            chains,
            secp256k1_signing_key: hex_env("SIGNER_SECP256K1_KEY"),
            ed25519_signing_key: hex_env("SIGNER_ED25519_KEY"),
        }
    }

    fn chain_from_env(ledger: Ledger) -> Option<ChainSettings> {
        let prefix = ledger.to_string().to_uppercase();

        let urls = env::var(format!("{}_PROVIDERS", prefix)).ok()?;
        let api_key = env::var(format!("{}_API_KEY", prefix)).ok();
        let public_key = hex_env(&format!("{}_PUBLIC_KEY", prefix))?;

        let providers: Vec<ProviderEndpoint> = urls
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| ProviderEndpoint {
                name: host_of(url),
                url: url.to_string(),
                api_key: api_key.clone(),
            })
            .collect();
        if providers.is_empty() {
            return None;
        }

        let chain_id = env::var(format!("{}_CHAIN_ID", prefix))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let tokens: Vec<crate::amount::Token> = env::var(format!("{}_TOKENS", prefix))
            .ok()
            .and_then(|json| match serde_json::from_str(&json) {
                Ok(tokens) => Some(tokens),
                Err(err) => {
                    log::warn!("{}: ignoring malformed token list: {}", ledger, err);
                    None
                }
            })
            .unwrap_or_default();

        log::info!(
            "{}: {} provider(s) configured, {} token(s) tracked",
            ledger,
            providers.len(),
            tokens.len()
        );

        Some(ChainSettings {
            ledger,
            providers,
            chain_id,
            public_key,
            tokens,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            chains: Vec::new(),
            secp256k1_signing_key: None,
            ed25519_signing_key: None,
        }
    }
}

fn hex_env(name: &str) -> Option<Vec<u8>> {
    let value = env::var(name).ok()?;
    match hex::decode(value.trim()) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            log::warn!("{}: not valid hex, ignoring ({})", name, err);
            None
        }
    }
}

fn host_of(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}
