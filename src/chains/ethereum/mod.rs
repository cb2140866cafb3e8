//! Ethereum (account-based) ledger support.

pub mod builder;
pub mod provider;

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;

use crate::amount::{Amount, AmountKind, Token};
use crate::chains::{
    validate_common, ChainAdapter, Ledger, PayloadContext, SigningPayload, TransferIntent,
};
use crate::config::ChainSettings;
use crate::error::{BuildError, SendViolation, WalletError};
use crate::fee::{tiers_from_base, Fee, FeeParameters, FeeSchedule};
use crate::keys::PublicKey;
use crate::network::MultiProvider;
use crate::signer::ChainSignature;
use crate::wallet::state::{LedgerView, Wallet, WalletView};

use builder::{address_of, EthereumTransactionBuilder};
use provider::{EvmRpc, JsonRpcEvmProvider};

/// Gas for a plain value transfer.
const COIN_TRANSFER_GAS_LIMIT: u64 = 21_000;
/// Gas allowance for an ERC-20 transfer call.
const TOKEN_TRANSFER_GAS_LIMIT: u64 = 65_000;

pub struct EthereumAdapter {
    chain_id: u64,
    providers: MultiProvider<dyn EvmRpc>,
    tokens: Vec<Token>,
    builder: EthereumTransactionBuilder,
}

impl EthereumAdapter {
    pub fn new(
        chain_id: u64,
        providers: Vec<Arc<dyn EvmRpc>>,
        tokens: Vec<Token>,
    ) -> Result<Self, WalletError> {
        let providers = MultiProvider::new(providers)
            .map_err(|e| WalletError::InvalidInput(e.to_string()))?;
        Ok(Self {
            chain_id,
            providers,
            tokens,
            builder: EthereumTransactionBuilder::new(chain_id),
        })
    }

    pub fn from_settings(settings: &ChainSettings) -> Result<Self, WalletError> {
        let providers = settings
            .providers
            .iter()
            .map(|endpoint| {
                Arc::new(JsonRpcEvmProvider::new(
                    endpoint.name.clone(),
                    endpoint.url.clone(),
                )) as Arc<dyn EvmRpc>
            })
            .collect();
        Self::new(settings.chain_id, providers, settings.tokens.clone())
    }

    fn gas_limit_for(&self, intent: &TransferIntent) -> u64 {
        match intent.amount.kind {
            AmountKind::Token(_) => TOKEN_TRANSFER_GAS_LIMIT,
            _ => COIN_TRANSFER_GAS_LIMIT,
        }
    }
}

#[async_trait]
impl ChainAdapter for EthereumAdapter {
    fn ledger(&self) -> Ledger {
        Ledger::Ethereum
    }

    fn derive_addresses(&self, key: &PublicKey) -> Result<Vec<String>, WalletError> {
        let public = secp256k1::PublicKey::from_slice(key.blockchain_key())
            .map_err(|e| WalletError::InvalidInput(format!("bad secp256k1 public key: {}", e)))?;
        Ok(vec![format!("0x{}", hex::encode(address_of(&public)))])
    }

    async fn fetch_view(
        &self,
        addresses: &[String],
        pending_hashes: &[String],
    ) -> Result<WalletView, WalletError> {
        let address = addresses
            .first()
            .ok_or_else(|| WalletError::InvalidInput("no address to query".to_string()))?;

        let token_futures = self.tokens.iter().map(|token| {
            let contract = token.contract_address.clone();
            async move {
                let held = self
                    .providers
                    .request(|p| {
                        let contract = contract.clone();
                        async move { p.token_balance(address, &contract).await }
                    })
                    .await?;
                Ok::<u128, crate::network::ProviderError>(held)
            }
        });
        let receipt_futures = pending_hashes.iter().map(|hash| {
            self.providers
                .request(move |p| async move { p.transaction_confirmed(hash).await })
        });

        // Balance, nonce, token balances and receipt checks are all
        // idempotent reads; fan out and join.
        let (coin_balance, nonce, token_balances, confirmations) = futures::try_join!(
            self.providers
                .request(move |p| async move { p.balance(address).await }),
            self.providers
                .request(move |p| async move { p.transaction_count(address).await }),
            try_join_all(token_futures),
            try_join_all(receipt_futures),
        )
        .map_err(WalletError::Network)?;

        let mut balances = vec![Amount::coin(coin_balance, Ledger::Ethereum.decimals())];
        for (token, held) in self.tokens.iter().zip(token_balances) {
            balances.push(Amount::token(token.clone(), held));
        }

        let confirmed_hashes = pending_hashes
            .iter()
            .zip(confirmations)
            .filter(|(_, confirmed)| *confirmed)
            .map(|(hash, _)| hash.clone())
            .collect();

        Ok(WalletView {
            balances,
            view: LedgerView::Account { nonce },
            confirmed_hashes,
        })
    }

    async fn fee_schedule(
        &self,
        _wallet: &Wallet,
        intent: &TransferIntent,
    ) -> Result<FeeSchedule, WalletError> {
        let base_gas_price = self
            .providers
            .request(|p| async move { p.gas_price().await })
            .await?;
        let gas_limit = self.gas_limit_for(intent);

        let (low, normal, priority) = tiers_from_base(base_gas_price);
        let quotes = [low, normal, priority]
            .into_iter()
            .map(|gas_price| {
                Fee::with_parameters(
                    Amount::coin(gas_price * gas_limit as u128, Ledger::Ethereum.decimals()),
                    FeeParameters::Evm {
                        gas_limit,
                        gas_price,
                    },
                )
            })
            .collect();

        Ok(FeeSchedule::from_quotes(quotes)?)
    }

    fn validate(&self, wallet: &Wallet, intent: &TransferIntent) -> Vec<SendViolation> {
        validate_common(wallet, intent)
    }

    fn build_for_sign(
        &self,
        wallet: &Wallet,
        intent: &TransferIntent,
    ) -> Result<SigningPayload, BuildError> {
        self.builder.build_for_sign(wallet, intent)
    }

    fn build_for_send(
        &self,
        payload: &SigningPayload,
        signature: &ChainSignature,
    ) -> Result<Vec<u8>, BuildError> {
        match &payload.context {
            PayloadContext::Ethereum(context) => self.builder.build_for_send(context, signature),
            _ => Err(BuildError::BuildFailed(
                "payload was built for a different ledger".to_string(),
            )),
        }
    }

    async fn broadcast(&self, raw: &[u8]) -> Result<String, WalletError> {
        let hash = self
            .providers
            .request(move |p| async move { p.send_raw_transaction(raw).await })
            .await?;
        log::info!("ethereum: transaction broadcast, hash {}", hash);
        Ok(hash)
    }
}
