//! Cardano (UTXO + multi-asset) ledger support.

pub mod builder;
pub mod provider;

use async_trait::async_trait;
use blake2::digest::consts::U28;
use blake2::{Blake2b, Digest};
use futures::future::try_join_all;
use std::sync::{Arc, RwLock};

use crate::amount::{Amount, AmountKind, Token};
use crate::chains::{
    validate_common, ChainAdapter, Ledger, PayloadContext, SigningPayload, TransferIntent,
};
use crate::config::ChainSettings;
use crate::error::{BuildError, SendViolation, WalletError};
use crate::fee::{Fee, FeeParameters, FeeSchedule};
use crate::keys::PublicKey;
use crate::network::MultiProvider;
use crate::signer::ChainSignature;
use crate::wallet::state::{LedgerView, Wallet, WalletView};

use builder::{CardanoTransactionBuilder, WITNESS_OVERHEAD};
use provider::{CardanoProtocolParameters, CardanoRpc, RestCardanoProvider};

type Blake2b224 = Blake2b<U28>;

/// Enterprise address header byte (payment key hash, mainnet).
const ADDRESS_HEADER: u8 = 0x61;

/// Body bytes the fee estimate reserves for the final fee field.
const FEE_FIELD_PADDING: usize = 8;

pub struct CardanoAdapter {
    providers: MultiProvider<dyn CardanoRpc>,
    tokens: Vec<Token>,
    params: RwLock<CardanoProtocolParameters>,
}

impl CardanoAdapter {
    pub fn new(
        providers: Vec<Arc<dyn CardanoRpc>>,
        tokens: Vec<Token>,
    ) -> Result<Self, WalletError> {
        let providers = MultiProvider::new(providers)
            .map_err(|e| WalletError::InvalidInput(e.to_string()))?;
        Ok(Self {
            providers,
            tokens,
            params: RwLock::new(CardanoProtocolParameters::default()),
        })
    }

    pub fn from_settings(settings: &ChainSettings) -> Result<Self, WalletError> {
        let providers = settings
            .providers
            .iter()
            .map(|endpoint| {
                Arc::new(RestCardanoProvider::new(
                    endpoint.name.clone(),
                    endpoint.url.clone(),
                    endpoint.api_key.clone(),
                )) as Arc<dyn CardanoRpc>
            })
            .collect();
        Self::new(providers, settings.tokens.clone())
    }

    fn builder(&self) -> CardanoTransactionBuilder {
        let params = *self.params.read().expect("params lock poisoned");
        CardanoTransactionBuilder::new(params)
    }

    fn token_for_asset(&self, asset_id: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.matches_asset_id(asset_id))
    }
}

#[async_trait]
impl ChainAdapter for CardanoAdapter {
    fn ledger(&self) -> Ledger {
        Ledger::Cardano
    }

    fn derive_addresses(&self, key: &PublicKey) -> Result<Vec<String>, WalletError> {
        let public = key.blockchain_key();
        if public.len() < 32 {
            return Err(WalletError::InvalidInput(
                "cardano public key must be at least 32 bytes".to_string(),
            ));
        }

        let key_hash = Blake2b224::digest(&public[..32]);
        let mut address = vec![ADDRESS_HEADER];
        address.extend_from_slice(key_hash.as_slice());
        Ok(vec![hex::encode(address)])
    }

    async fn fetch_view(
        &self,
        addresses: &[String],
        _pending_hashes: &[String],
    ) -> Result<WalletView, WalletError> {
        // Protocol parameters are best effort: a failed refresh falls back
        // to the cached values.
        match self
            .providers
            .request(|p| async move { p.protocol_parameters().await })
            .await
        {
            Ok(params) => *self.params.write().expect("params lock poisoned") = params,
            Err(err) => log::warn!("cardano: protocol parameter refresh failed: {}", err),
        }

        let utxo_futures = addresses.iter().map(|address| {
            self.providers
                .request(move |p| async move { p.unspent_outputs(address).await })
        });
        let hash_futures = addresses.iter().map(|address| {
            self.providers
                .request(move |p| async move { p.recent_transaction_hashes(address).await })
        });

        // Read-only queries; safe to fan out and join.
        let (utxos_per_address, hashes_per_address) = futures::try_join!(
            try_join_all(utxo_futures),
            try_join_all(hash_futures),
        )
        .map_err(WalletError::Network)?;

        let outputs: Vec<_> = utxos_per_address.into_iter().flatten().collect();
        let confirmed_hashes: Vec<String> =
            hashes_per_address.into_iter().flatten().collect();

        let coin_total: u64 = outputs.iter().map(|u| u.amount).sum();
        let mut balances = vec![Amount::coin(coin_total as u128, Ledger::Cardano.decimals())];

        for token in &self.tokens {
            let held: u64 = outputs
                .iter()
                .flat_map(|u| &u.assets)
                .filter(|asset| token.matches_asset_id(&asset.asset_id))
                .map(|asset| asset.amount)
                .sum();
            balances.push(Amount::token(token.clone(), held as u128));
        }

        // Assets on chain the config does not know about still show up,
        // with the asset id standing in for display fields.
        let mut unknown: Vec<(String, u64)> = Vec::new();
        for output in &outputs {
            for asset in &output.assets {
                if self.token_for_asset(&asset.asset_id).is_some() {
                    continue;
                }
                match unknown.iter_mut().find(|(id, _)| *id == asset.asset_id) {
                    Some((_, held)) => *held += asset.amount,
                    None => unknown.push((asset.asset_id.clone(), asset.amount)),
                }
            }
        }
        for (asset_id, held) in unknown {
            let token = Token {
                name: asset_id.clone(),
                symbol: asset_id.chars().take(8).collect(),
                contract_address: asset_id,
                decimals: 0,
                token_id: None,
            };
            balances.push(Amount::token(token, held as u128));
        }

        Ok(WalletView {
            balances,
            view: LedgerView::Utxo { outputs },
            confirmed_hashes,
        })
    }

    async fn fee_schedule(
        &self,
        wallet: &Wallet,
        intent: &TransferIntent,
    ) -> Result<FeeSchedule, WalletError> {
        let builder = self.builder();

        // Size the transaction with a zero fee first, then price it.
        let mut draft = intent.clone();
        draft.fee = Fee::new(Amount::coin(0, Ledger::Cardano.decimals()));
        let (_, draft_payload) = builder.build_payload(wallet, &draft)?;
        let fee =
            builder.fee_for_size(draft_payload.body.len() + WITNESS_OVERHEAD + FEE_FIELD_PADDING);

        // Rebuild with the real fee so the parameters reflect the exact
        // coin movement of the final transaction.
        let mut priced = intent.clone();
        priced.fee = Fee::new(Amount::coin(fee as u128, Ledger::Cardano.decimals()));
        let (_, payload) = builder.build_payload(wallet, &priced)?;

        Ok(FeeSchedule::Single(Fee::with_parameters(
            Amount::coin(fee as u128, Ledger::Cardano.decimals()),
            FeeParameters::Cardano {
                coins_spent: payload.coins_spent,
                change: payload.change,
            },
        )))
    }

    fn validate(&self, wallet: &Wallet, intent: &TransferIntent) -> Vec<SendViolation> {
        let mut violations = validate_common(wallet, intent);
        let builder = self.builder();

        let amount = intent.amount.value.unwrap_or(0);
        let fee = intent.fee.amount.value.unwrap_or(0);
        let total = wallet.total_unspent_coin() as u128;
        let held = wallet.held_assets();

        if matches!(intent.amount.kind, AmountKind::Coin) {
            if amount > 0 && amount < builder.min_ada_for_bundle(&[]) as u128 {
                violations.push(SendViolation::AmountBelowMinimum);
            }

            if let Some(remainder) = total.checked_sub(amount).and_then(|r| r.checked_sub(fee)) {
                if remainder > 0 {
                    if held.is_empty() {
                        if remainder < builder.min_ada_for_bundle(&[]) as u128 {
                            violations.push(SendViolation::ChangeBelowDust);
                        }
                    } else if remainder < builder.min_ada_for_bundle(&held) as u128 {
                        violations.push(SendViolation::MinimumBalanceBreach);
                    }
                } else if !held.is_empty() {
                    violations.push(SendViolation::MinimumBalanceBreach);
                }
            }
        }

        violations
    }

    fn build_for_sign(
        &self,
        wallet: &Wallet,
        intent: &TransferIntent,
    ) -> Result<SigningPayload, BuildError> {
        self.builder().build_for_sign(wallet, intent)
    }

    fn build_for_send(
        &self,
        payload: &SigningPayload,
        signature: &ChainSignature,
    ) -> Result<Vec<u8>, BuildError> {
        match &payload.context {
            PayloadContext::Cardano(context) => self.builder().build_for_send(context, signature),
            _ => Err(BuildError::BuildFailed(
                "payload was built for a different ledger".to_string(),
            )),
        }
    }

    async fn broadcast(&self, raw: &[u8]) -> Result<String, WalletError> {
        let hash = self
            .providers
            .request(move |p| async move { p.submit(raw).await })
            .await?;
        log::info!("cardano: transaction broadcast, hash {}", hash);
        Ok(hash)
    }
}
