//! Shared test infrastructure: scripted in-memory providers and wallet
//! manager setup helpers. No network access anywhere.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use multiwallet::chains::cardano::provider::{CardanoProtocolParameters, CardanoRpc};
use multiwallet::chains::cardano::CardanoAdapter;
use multiwallet::chains::ethereum::provider::EvmRpc;
use multiwallet::chains::ethereum::EthereumAdapter;
use multiwallet::network::{NamedProvider, ProviderError};
use multiwallet::wallet::{AssetBalance, UnspentOutput, WalletManager};
use multiwallet::{LocalKeySigner, PublicKey, SignerBridge, Token};

pub fn init_logger() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

pub const ED25519_SEED: [u8; 32] = [7u8; 32];
pub const SECP256K1_KEY: [u8; 32] = [
    0xac, 0x09, 0x74, 0xbe, 0xc3, 0x9a, 0x17, 0xe3, 0x6b, 0xa4, 0xa6, 0xb4, 0xd2, 0x38, 0xff,
    0x94, 0x4b, 0xac, 0xb4, 0x78, 0xcb, 0xed, 0x5e, 0xfc, 0xae, 0x78, 0x4d, 0x7b, 0xf4, 0xf2,
    0xff, 0x80,
];

pub fn ed25519_public_key() -> Vec<u8> {
    ed25519_dalek::SigningKey::from_bytes(&ED25519_SEED)
        .verifying_key()
        .to_bytes()
        .to_vec()
}

pub fn secp256k1_public_key() -> Vec<u8> {
    let secp = secp256k1::Secp256k1::new();
    secp256k1::SecretKey::from_slice(&SECP256K1_KEY)
        .expect("test key")
        .public_key(&secp)
        .serialize()
        .to_vec()
}

pub fn test_policy_id() -> String {
    "ab".repeat(28)
}

pub fn test_token() -> Token {
    Token {
        name: "Test Token".to_string(),
        symbol: "TST".to_string(),
        // policy id + hex asset name, as providers report it
        contract_address: format!("{}{}", test_policy_id(), "746f6b656e"),
        decimals: 0,
        token_id: None,
    }
}

pub fn utxo(tx_hash: &str, amount: u64, assets: Vec<AssetBalance>) -> UnspentOutput {
    UnspentOutput {
        tx_hash: tx_hash.to_string(),
        output_index: 0,
        address: "6100000000000000000000000000000000000000000000000000000000".to_string(),
        amount,
        assets,
    }
}

pub fn asset(asset_id: &str, amount: u64) -> AssetBalance {
    AssetBalance {
        asset_id: asset_id.to_string(),
        amount,
    }
}

// ============================================================================
// Scripted Cardano provider
// ============================================================================

pub struct ScriptedCardano {
    name: String,
    pub utxos: Mutex<Vec<UnspentOutput>>,
    pub hashes: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub submitted: Mutex<Vec<Vec<u8>>>,
    pub submit_hash: String,
}

impl ScriptedCardano {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            utxos: Mutex::new(Vec::new()),
            hashes: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            submit_hash: "cafe0123".to_string(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Timeout);
        }
        Ok(())
    }
}

impl NamedProvider for ScriptedCardano {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl CardanoRpc for ScriptedCardano {
    async fn unspent_outputs(&self, _address: &str) -> Result<Vec<UnspentOutput>, ProviderError> {
        self.gate()?;
        Ok(self.utxos.lock().expect("utxos lock").clone())
    }

    async fn recent_transaction_hashes(
        &self,
        _address: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.gate()?;
        Ok(self.hashes.lock().expect("hashes lock").clone())
    }

    async fn protocol_parameters(&self) -> Result<CardanoProtocolParameters, ProviderError> {
        self.gate()?;
        Ok(CardanoProtocolParameters::default())
    }

    async fn submit(&self, raw: &[u8]) -> Result<String, ProviderError> {
        self.gate()?;
        self.submitted.lock().expect("submitted lock").push(raw.to_vec());
        Ok(self.submit_hash.clone())
    }
}

// ============================================================================
// Scripted Ethereum provider
// ============================================================================

pub struct ScriptedEvm {
    name: String,
    pub balance: Mutex<u128>,
    pub token_balances: Mutex<u128>,
    pub nonce: Mutex<u64>,
    pub gas_price: Mutex<u128>,
    pub confirmed: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub submitted: Mutex<Vec<Vec<u8>>>,
    pub submit_hash: String,
}

impl ScriptedEvm {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            balance: Mutex::new(0),
            token_balances: Mutex::new(0),
            nonce: Mutex::new(0),
            gas_price: Mutex::new(20_000_000_000),
            confirmed: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            submit_hash: "0xfeed0123".to_string(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Timeout);
        }
        Ok(())
    }
}

impl NamedProvider for ScriptedEvm {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl EvmRpc for ScriptedEvm {
    async fn balance(&self, _address: &str) -> Result<u128, ProviderError> {
        self.gate()?;
        Ok(*self.balance.lock().expect("balance lock"))
    }

    async fn token_balance(&self, _address: &str, _contract: &str) -> Result<u128, ProviderError> {
        self.gate()?;
        Ok(*self.token_balances.lock().expect("token lock"))
    }

    async fn transaction_count(&self, _address: &str) -> Result<u64, ProviderError> {
        self.gate()?;
        Ok(*self.nonce.lock().expect("nonce lock"))
    }

    async fn gas_price(&self) -> Result<u128, ProviderError> {
        self.gate()?;
        Ok(*self.gas_price.lock().expect("gas lock"))
    }

    async fn transaction_confirmed(&self, hash: &str) -> Result<bool, ProviderError> {
        self.gate()?;
        let confirmed = self.confirmed.lock().expect("confirmed lock");
        Ok(confirmed.iter().any(|h| h.eq_ignore_ascii_case(hash)))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ProviderError> {
        self.gate()?;
        self.submitted.lock().expect("submitted lock").push(raw.to_vec());
        Ok(self.submit_hash.clone())
    }
}

// ============================================================================
// Manager setup
// ============================================================================

pub fn cardano_manager(provider: Arc<ScriptedCardano>, tokens: Vec<Token>) -> WalletManager {
    let adapter =
        CardanoAdapter::new(vec![provider as Arc<dyn CardanoRpc>], tokens).expect("adapter");
    let signer = SignerBridge::new(Arc::new(
        LocalKeySigner::new().with_ed25519(ED25519_SEED),
    ));
    WalletManager::new(
        Arc::new(adapter),
        signer,
        PublicKey::new(ed25519_public_key()),
    )
    .expect("manager")
}

pub fn ethereum_manager(provider: Arc<ScriptedEvm>, tokens: Vec<Token>) -> WalletManager {
    let adapter =
        EthereumAdapter::new(1, vec![provider as Arc<dyn EvmRpc>], tokens).expect("adapter");
    let signer = SignerBridge::new(Arc::new(
        LocalKeySigner::new()
            .with_secp256k1(SECP256K1_KEY)
            .expect("secp key"),
    ));
    WalletManager::new(
        Arc::new(adapter),
        signer,
        PublicKey::new(secp256k1_public_key()),
    )
    .expect("manager")
}
