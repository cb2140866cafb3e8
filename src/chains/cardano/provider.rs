//! Cardano provider glue
//!
//! Typed RPC surface the Cardano adapter depends on, plus a REST
//! (Blockfrost-style) implementation. The core never sees HTTP details;
//! it only sees `Result<T, ProviderError>` through the failover layer.

use async_trait::async_trait;
use serde::Deserialize;

use crate::network::{NamedProvider, ProviderError};
use crate::wallet::state::{AssetBalance, UnspentOutput};

/// Protocol parameters the builder needs for fee and min-ADA arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardanoProtocolParameters {
    /// Linear fee coefficient (lovelace per byte).
    pub min_fee_a: u64,
    /// Linear fee constant (lovelace).
    pub min_fee_b: u64,
    /// Lovelace per 8-byte word of UTXO entry size.
    pub coins_per_utxo_word: u64,
}

impl Default for CardanoProtocolParameters {
    fn default() -> Self {
        // Mainnet values; refreshed from the provider on every update.
        Self {
            min_fee_a: 44,
            min_fee_b: 155_381,
            coins_per_utxo_word: 34_482,
        }
    }
}

#[async_trait]
pub trait CardanoRpc: NamedProvider + Send + Sync {
    async fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>, ProviderError>;

    async fn recent_transaction_hashes(&self, address: &str)
        -> Result<Vec<String>, ProviderError>;

    async fn protocol_parameters(&self) -> Result<CardanoProtocolParameters, ProviderError>;

    /// Submit wire bytes; returns the transaction hash.
    async fn submit(&self, raw: &[u8]) -> Result<String, ProviderError>;
}

/// Blockfrost-style REST provider.
pub struct RestCardanoProvider {
    name: String,
    base_url: String,
    project_id: Option<String>,
    client: reqwest::Client,
}

impl RestCardanoProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, project_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            project_id,
            client: reqwest::Client::new(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(project_id) = &self.project_id {
            request = request.header("project_id", project_id);
        }
        request
    }

    /// 404 on address endpoints is ledger truth (the address has never been
    /// seen on chain), everything else non-2xx is a provider fault.
    fn check_status(status: reqwest::StatusCode) -> Result<(), ProviderError> {
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::AccountNotFound);
        }
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }
        Ok(())
    }
}

impl NamedProvider for RestCardanoProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl CardanoRpc for RestCardanoProvider {
    async fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>, ProviderError> {
        let response = self
            .get(&format!("/addresses/{}/utxos", address))
            .send()
            .await?;
        Self::check_status(response.status())?;

        let utxos: Vec<AddressUtxoDto> = response.json().await?;
        utxos
            .into_iter()
            .map(|dto| dto.into_unspent_output(address))
            .collect()
    }

    async fn recent_transaction_hashes(
        &self,
        address: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let response = self
            .get(&format!("/addresses/{}/transactions", address))
            .send()
            .await?;
        Self::check_status(response.status())?;

        let txs: Vec<AddressTransactionDto> = response.json().await?;
        Ok(txs.into_iter().map(|t| t.tx_hash).collect())
    }

    async fn protocol_parameters(&self) -> Result<CardanoProtocolParameters, ProviderError> {
        let response = self.get("/epochs/latest/parameters").send().await?;
        Self::check_status(response.status())?;

        let dto: ProtocolParametersDto = response.json().await?;
        Ok(CardanoProtocolParameters {
            min_fee_a: dto.min_fee_a,
            min_fee_b: dto.min_fee_b,
            coins_per_utxo_word: dto
                .coins_per_utxo_word
                .unwrap_or(CardanoProtocolParameters::default().coins_per_utxo_word),
        })
    }

    async fn submit(&self, raw: &[u8]) -> Result<String, ProviderError> {
        let mut request = self
            .client
            .post(format!("{}/tx/submit", self.base_url))
            .header("Content-Type", "application/cbor")
            .body(raw.to_vec());
        if let Some(project_id) = &self.project_id {
            request = request.header("project_id", project_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rpc(format!(
                "submit failed with status {}: {}",
                status.as_u16(),
                detail
            )));
        }

        // The submit endpoint returns the tx hash as a JSON string.
        let hash: String = response.json().await?;
        Ok(hash.trim_matches('"').to_string())
    }
}

// ============================================================================
// Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
struct AddressUtxoDto {
    tx_hash: String,
    output_index: u32,
    amount: Vec<UtxoAmountDto>,
}

#[derive(Debug, Deserialize)]
struct UtxoAmountDto {
    unit: String,
    quantity: String,
}

#[derive(Debug, Deserialize)]
struct AddressTransactionDto {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
struct ProtocolParametersDto {
    min_fee_a: u64,
    min_fee_b: u64,
    coins_per_utxo_word: Option<u64>,
}

impl AddressUtxoDto {
    fn into_unspent_output(self, address: &str) -> Result<UnspentOutput, ProviderError> {
        let mut native = 0u64;
        let mut assets = Vec::new();

        for entry in self.amount {
            let quantity: u64 = entry.quantity.parse().map_err(|_| {
                ProviderError::Malformed(format!("bad quantity: {}", entry.quantity))
            })?;
            if entry.unit == "lovelace" {
                native = quantity;
            } else {
                assets.push(AssetBalance {
                    asset_id: entry.unit,
                    amount: quantity,
                });
            }
        }

        Ok(UnspentOutput {
            tx_hash: self.tx_hash,
            output_index: self.output_index,
            address: address.to_string(),
            amount: native,
            assets,
        })
    }
}
