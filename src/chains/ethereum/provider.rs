//! Ethereum provider glue
//!
//! Typed JSON-RPC surface the Ethereum adapter depends on. Balance-of
//! queries for tokens go through `eth_call` with ERC-20 calldata; pending
//! transactions are checked by receipt lookup.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::network::{NamedProvider, ProviderError};

/// ERC-20 `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";

#[async_trait]
pub trait EvmRpc: NamedProvider + Send + Sync {
    async fn balance(&self, address: &str) -> Result<u128, ProviderError>;

    async fn token_balance(&self, address: &str, contract: &str) -> Result<u128, ProviderError>;

    async fn transaction_count(&self, address: &str) -> Result<u64, ProviderError>;

    async fn gas_price(&self) -> Result<u128, ProviderError>;

    /// Whether a broadcast transaction has a receipt (is mined).
    async fn transaction_confirmed(&self, hash: &str) -> Result<bool, ProviderError>;

    /// Submit wire bytes; returns the transaction hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ProviderError>;
}

/// JSON-RPC 2.0 provider over HTTP.
pub struct JsonRpcEvmProvider {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl JsonRpcEvmProvider {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let body: JsonRpcResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(ProviderError::Rpc(format!(
                "{} ({})",
                error.message, error.code
            )));
        }
        body.result
            .ok_or_else(|| ProviderError::Malformed("response carries no result".to_string()))
    }

    async fn call_quantity(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<u128, ProviderError> {
        let value = self.call(method, params).await?;
        parse_quantity(&value)
    }
}

fn parse_quantity(value: &serde_json::Value) -> Result<u128, ProviderError> {
    let text = value
        .as_str()
        .ok_or_else(|| ProviderError::Malformed(format!("expected hex quantity, got {}", value)))?;
    let digits = text.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    // Contract return data is a 32-byte word; wider values than u128 are
    // beyond what the wallet can represent.
    let digits = digits.trim_start_matches('0');
    if digits.len() > 32 {
        return Err(ProviderError::Malformed(format!(
            "quantity out of range: {}",
            text
        )));
    }
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|_| ProviderError::Malformed(format!("bad hex quantity: {}", text)))
}

impl NamedProvider for JsonRpcEvmProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl EvmRpc for JsonRpcEvmProvider {
    async fn balance(&self, address: &str) -> Result<u128, ProviderError> {
        self.call_quantity("eth_getBalance", json!([address, "latest"]))
            .await
    }

    async fn token_balance(&self, address: &str, contract: &str) -> Result<u128, ProviderError> {
        let holder = address.trim_start_matches("0x");
        let data = format!("0x{}{:0>64}", BALANCE_OF_SELECTOR, holder);
        self.call_quantity(
            "eth_call",
            json!([{ "to": contract, "data": data }, "latest"]),
        )
        .await
    }

    async fn transaction_count(&self, address: &str) -> Result<u64, ProviderError> {
        let count = self
            .call_quantity("eth_getTransactionCount", json!([address, "latest"]))
            .await?;
        u64::try_from(count)
            .map_err(|_| ProviderError::Malformed("nonce out of range".to_string()))
    }

    async fn gas_price(&self) -> Result<u128, ProviderError> {
        self.call_quantity("eth_gasPrice", json!([])).await
    }

    async fn transaction_confirmed(&self, hash: &str) -> Result<bool, ProviderError> {
        let receipt = self
            .call("eth_getTransactionReceipt", json!([hash]))
            .await?;
        Ok(!receipt.is_null())
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, ProviderError> {
        let value = self
            .call("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw))]))
            .await?;
        value
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::Malformed("expected transaction hash".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert_eq!(parse_quantity(&json!("0x2a")).unwrap(), 42);
        assert_eq!(
            parse_quantity(&json!(
                "0x0000000000000000000000000000000000000000000000000de0b6b3a7640000"
            ))
            .unwrap(),
            1_000_000_000_000_000_000
        );
    }

    #[test]
    fn rejects_non_string_quantities() {
        assert!(parse_quantity(&json!(42)).is_err());
        assert!(parse_quantity(&json!(null)).is_err());
    }
}
