//! Cardano transaction builder
//!
//! Builds the canonical CBOR transaction body, hashes it with blake2b-256
//! for signing, and later combines the retained body with an ed25519
//! witness into wire bytes.
//!
//! Native-asset accounting on Cardano is the hard part: an output carrying
//! a token bundle must hold a minimum amount of lovelace that depends on
//! the serialized size of the bundle, and the same floor applies to the
//! change output for whatever assets stay behind.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::amount::AmountKind;
use crate::chains::{PayloadContext, SigningPayload, TransferIntent};
use crate::error::BuildError;
use crate::signer::ChainSignature;
use crate::wallet::state::{AssetBalance, UnspentOutput, Wallet};

use super::provider::CardanoProtocolParameters;

type Blake2b256 = Blake2b<U32>;

/// Serialized size of one vkey witness plus the surrounding envelope,
/// added to the body size when estimating fees.
pub const WITNESS_OVERHEAD: usize = 106;

/// Hex length of a policy id (28 bytes).
const POLICY_ID_HEX_LEN: usize = 56;

/// Intermediate state retained between `build_for_sign` and
/// `build_for_send`.
#[derive(Debug, Clone)]
pub struct CardanoPayload {
    pub body: Vec<u8>,
    pub fee: u64,
    pub coins_spent: u64,
    pub change: u64,
    pub inputs: Vec<UnspentOutput>,
}

/// How much native value to place in the destination output of a token
/// transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSpend {
    /// Spend exactly the bundle's minimum.
    Exact(u64),
    /// The change left after the minimum could not form a valid change
    /// output, so the entire balance (minus fee) is spent instead.
    EntireBalance,
}

/// The exact policy for choosing the native value spent with a token:
/// `change = total - min_required`; when `0 < change < min_change` the
/// wallet cannot form a valid change output, so everything is spent rather
/// than leaving un-spendable dust.
pub fn token_spend_policy(total_native: u64, min_required: u64, min_change: u64) -> TokenSpend {
    let change = total_native.saturating_sub(min_required);
    if change > 0 && change < min_change {
        TokenSpend::EntireBalance
    } else {
        TokenSpend::Exact(min_required)
    }
}

struct OutputSpec {
    address_bytes: Vec<u8>,
    coin: u64,
    assets: Vec<AssetBalance>,
}

pub struct CardanoTransactionBuilder {
    params: CardanoProtocolParameters,
}

impl CardanoTransactionBuilder {
    pub fn new(params: CardanoProtocolParameters) -> Self {
        Self { params }
    }

    /// Linear fee for a serialized transaction of `size` bytes.
    pub fn fee_for_size(&self, size: usize) -> u64 {
        self.params.min_fee_a * size as u64 + self.params.min_fee_b
    }

    /// Minimum lovelace an output carrying `assets` may legally hold.
    /// Uses the ledger's word-packed bundle size with the 1 ADA floor.
    pub fn min_ada_for_bundle(&self, assets: &[AssetBalance]) -> u64 {
        const ENTRY_SIZE_WITHOUT_VALUE: u64 = 27;
        const MIN_LOVELACE_FLOOR: u64 = 1_000_000;

        let computed =
            (ENTRY_SIZE_WITHOUT_VALUE + bundle_size_words(assets)) * self.params.coins_per_utxo_word;
        computed.max(MIN_LOVELACE_FLOOR)
    }

    pub fn build_for_sign(
        &self,
        wallet: &Wallet,
        intent: &TransferIntent,
    ) -> Result<SigningPayload, BuildError> {
        let (digest, payload) = self.build_payload(wallet, intent)?;
        Ok(SigningPayload {
            digest,
            context: PayloadContext::Cardano(payload),
        })
    }

    /// Typed variant of `build_for_sign` used by fee estimation.
    pub fn build_payload(
        &self,
        wallet: &Wallet,
        intent: &TransferIntent,
    ) -> Result<(Vec<u8>, CardanoPayload), BuildError> {
        let inputs = wallet.unspent_outputs();
        if inputs.is_empty() {
            return Err(BuildError::NoUnspentOutputs);
        }

        let total_native = wallet.total_unspent_coin();
        let fee = small_value(&intent.fee.amount.value, "fee")?;

        let (destination, change) = match &intent.amount.kind {
            AmountKind::Coin => self.plan_coin_transfer(wallet, intent, total_native, fee)?,
            AmountKind::Token(token) => {
                self.plan_token_transfer(wallet, intent, token, total_native, fee)?
            }
            AmountKind::Reserve => {
                return Err(BuildError::BuildFailed(
                    "reserved balances are not spendable".to_string(),
                ))
            }
        };

        let coins_spent = destination.coin;
        let change_value = change.as_ref().map(|c| c.coin).unwrap_or(0);

        let body = encode_body(inputs, &destination, change.as_ref(), fee)?;
        let digest = Blake2b256::digest(&body).as_slice().to_vec();

        Ok((
            digest,
            CardanoPayload {
                body,
                fee,
                coins_spent,
                change: change_value,
                inputs: inputs.to_vec(),
            },
        ))
    }

    /// Attach the ed25519 witness and produce wire bytes. The signature is
    /// verified against the body hash first; garbage is never transmitted.
    pub fn build_for_send(
        &self,
        payload: &CardanoPayload,
        signature: &ChainSignature,
    ) -> Result<Vec<u8>, BuildError> {
        let (sig_bytes, vkey) = match signature {
            ChainSignature::Ed25519 {
                signature,
                verifying_key,
            } => (signature, verifying_key),
            ChainSignature::Recoverable { .. } => {
                return Err(BuildError::BuildFailed(
                    "expected an ed25519 witness signature".to_string(),
                ))
            }
        };

        let digest = Blake2b256::digest(&payload.body);
        let verifying_key = VerifyingKey::from_bytes(vkey)
            .map_err(|e| BuildError::BuildFailed(format!("bad verification key: {}", e)))?;
        verifying_key
            .verify(digest.as_slice(), &Signature::from_bytes(sig_bytes))
            .map_err(|_| {
                BuildError::BuildFailed("witness signature failed verification".to_string())
            })?;

        let mut wire = Vec::with_capacity(payload.body.len() + WITNESS_OVERHEAD);
        cbor_array(&mut wire, 4);
        wire.extend_from_slice(&payload.body);
        // witness set: { 0: [[vkey, signature]] }
        cbor_map(&mut wire, 1);
        cbor_uint(&mut wire, 0);
        cbor_array(&mut wire, 1);
        cbor_array(&mut wire, 2);
        cbor_bytes(&mut wire, vkey);
        cbor_bytes(&mut wire, sig_bytes);
        // is_valid flag and absent auxiliary data
        wire.push(0xf5);
        wire.push(0xf6);

        Ok(wire)
    }

    fn plan_coin_transfer(
        &self,
        wallet: &Wallet,
        intent: &TransferIntent,
        total_native: u64,
        fee: u64,
    ) -> Result<(OutputSpec, Option<OutputSpec>), BuildError> {
        let amount = small_value(&intent.amount.value, "amount")?;
        let remaining_assets = wallet.held_assets();

        let change = total_native
            .checked_sub(amount)
            .and_then(|rest| rest.checked_sub(fee))
            .ok_or_else(|| {
                BuildError::InsufficientFunds(format!(
                    "need {} lovelace (amount + fee), holding {}",
                    amount as u128 + fee as u128,
                    total_native
                ))
            })?;

        let destination = OutputSpec {
            address_bytes: address_bytes(&intent.destination)?,
            coin: amount,
            assets: Vec::new(),
        };

        let change_output = if change > 0 {
            if change < self.min_ada_for_bundle(&remaining_assets) {
                return Err(BuildError::LowBalanceForChange);
            }
            Some(OutputSpec {
                address_bytes: address_bytes(intent.change_address())?,
                coin: change,
                assets: remaining_assets,
            })
        } else if !remaining_assets.is_empty() {
            // held assets cannot ride in a zero-coin change output
            return Err(BuildError::LowBalanceForChange);
        } else {
            None
        };

        Ok((destination, change_output))
    }

    fn plan_token_transfer(
        &self,
        wallet: &Wallet,
        intent: &TransferIntent,
        token: &crate::amount::Token,
        total_native: u64,
        fee: u64,
    ) -> Result<(OutputSpec, Option<OutputSpec>), BuildError> {
        let requested = small_value(&intent.amount.value, "amount")?;

        let held = wallet.held_assets();
        let held_asset = held
            .iter()
            .find(|asset| token.matches_asset_id(&asset.asset_id))
            .ok_or_else(|| BuildError::AssetNotFound(token.contract_address.clone()))?
            .clone();

        if requested > held_asset.amount {
            return Err(BuildError::InsufficientFunds(format!(
                "requested {} of asset {}, holding {}",
                requested, held_asset.asset_id, held_asset.amount
            )));
        }

        let sent_bundle = vec![AssetBalance {
            asset_id: held_asset.asset_id.clone(),
            amount: requested,
        }];
        let other_assets: Vec<AssetBalance> = held
            .iter()
            .filter(|asset| asset.asset_id != held_asset.asset_id)
            .cloned()
            .collect();

        let min_required = self.min_ada_for_bundle(&sent_bundle);
        let min_change = self.min_ada_for_bundle(&other_assets);

        if total_native < min_required {
            return Err(BuildError::InsufficientFunds(format!(
                "bundle requires {} lovelace, holding {}",
                min_required, total_native
            )));
        }

        let leftover = held_asset.amount - requested;
        let mut change_assets = other_assets;
        if leftover > 0 {
            change_assets.push(AssetBalance {
                asset_id: held_asset.asset_id.clone(),
                amount: leftover,
            });
        }

        match token_spend_policy(total_native, min_required, min_change) {
            TokenSpend::EntireBalance => {
                let coin = total_native.checked_sub(fee).ok_or_else(|| {
                    BuildError::InsufficientFunds(format!(
                        "fee {} exceeds balance {}",
                        fee, total_native
                    ))
                })?;
                if coin < min_required {
                    return Err(BuildError::InsufficientFunds(format!(
                        "balance minus fee ({}) is below the bundle minimum {}",
                        coin, min_required
                    )));
                }
                // no change output can exist, so every remaining asset
                // rides along with the transfer
                let mut assets = sent_bundle;
                assets.extend(change_assets);
                Ok((
                    OutputSpec {
                        address_bytes: address_bytes(&intent.destination)?,
                        coin,
                        assets,
                    },
                    None,
                ))
            }
            TokenSpend::Exact(coin) => {
                let change = total_native
                    .checked_sub(coin)
                    .and_then(|rest| rest.checked_sub(fee))
                    .ok_or_else(|| {
                        BuildError::InsufficientFunds(format!(
                            "need {} lovelace (bundle minimum + fee), holding {}",
                            coin as u128 + fee as u128,
                            total_native
                        ))
                    })?;

                let destination = OutputSpec {
                    address_bytes: address_bytes(&intent.destination)?,
                    coin,
                    assets: sent_bundle,
                };

                let change_output = if change > 0 {
                    if change < self.min_ada_for_bundle(&change_assets) {
                        return Err(BuildError::LowBalanceForChange);
                    }
                    Some(OutputSpec {
                        address_bytes: address_bytes(intent.change_address())?,
                        coin: change,
                        assets: change_assets,
                    })
                } else if !change_assets.is_empty() {
                    return Err(BuildError::LowBalanceForChange);
                } else {
                    None
                };

                Ok((destination, change_output))
            }
        }
    }
}

fn small_value(value: &Option<u128>, what: &str) -> Result<u64, BuildError> {
    let value = value.ok_or_else(|| BuildError::BuildFailed(format!("{} not loaded", what)))?;
    u64::try_from(value)
        .map_err(|_| BuildError::BuildFailed(format!("{} does not fit the ledger range", what)))
}

fn address_bytes(address: &str) -> Result<Vec<u8>, BuildError> {
    hex::decode(address)
        .map_err(|_| BuildError::BuildFailed(format!("invalid address: {}", address)))
}

/// Ledger bundle size in 8-byte words, per the word-packing rule.
fn bundle_size_words(assets: &[AssetBalance]) -> u64 {
    if assets.is_empty() {
        return 0;
    }

    let mut policies: Vec<&str> = Vec::new();
    let mut name_bytes = 0u64;
    for asset in assets {
        let (policy, name_hex) = split_asset_id(&asset.asset_id);
        if !policies.contains(&policy) {
            policies.push(policy);
        }
        name_bytes += (name_hex.len() / 2) as u64;
    }

    let packed = assets.len() as u64 * 12 + name_bytes + policies.len() as u64 * 28;
    6 + packed.div_ceil(8)
}

/// Asset ids arrive as policy id optionally concatenated with the hex
/// asset name.
fn split_asset_id(asset_id: &str) -> (&str, &str) {
    if asset_id.len() > POLICY_ID_HEX_LEN {
        asset_id.split_at(POLICY_ID_HEX_LEN)
    } else {
        (asset_id, "")
    }
}

fn encode_body(
    inputs: &[UnspentOutput],
    destination: &OutputSpec,
    change: Option<&OutputSpec>,
    fee: u64,
) -> Result<Vec<u8>, BuildError> {
    let mut body = Vec::new();
    cbor_map(&mut body, 3);

    cbor_uint(&mut body, 0);
    cbor_array(&mut body, inputs.len() as u64);
    for input in inputs {
        let tx_hash = hex::decode(&input.tx_hash)
            .map_err(|_| BuildError::BuildFailed(format!("invalid tx hash: {}", input.tx_hash)))?;
        cbor_array(&mut body, 2);
        cbor_bytes(&mut body, &tx_hash);
        cbor_uint(&mut body, input.output_index as u64);
    }

    let output_count = 1 + change.is_some() as u64;
    cbor_uint(&mut body, 1);
    cbor_array(&mut body, output_count);
    encode_output(&mut body, destination);
    if let Some(change) = change {
        encode_output(&mut body, change);
    }

    cbor_uint(&mut body, 2);
    cbor_uint(&mut body, fee);

    Ok(body)
}

fn encode_output(out: &mut Vec<u8>, output: &OutputSpec) {
    cbor_array(out, 2);
    cbor_bytes(out, &output.address_bytes);

    if output.assets.is_empty() {
        cbor_uint(out, output.coin);
        return;
    }

    // value = [coin, { policy: { asset_name: amount } }], canonically sorted
    let mut grouped: Vec<(Vec<u8>, Vec<(Vec<u8>, u64)>)> = Vec::new();
    for asset in &output.assets {
        let (policy_hex, name_hex) = split_asset_id(&asset.asset_id);
        let policy = hex::decode(policy_hex).unwrap_or_else(|_| policy_hex.as_bytes().to_vec());
        let name = hex::decode(name_hex).unwrap_or_else(|_| name_hex.as_bytes().to_vec());
        match grouped.iter_mut().find(|(p, _)| *p == policy) {
            Some((_, names)) => names.push((name, asset.amount)),
            None => grouped.push((policy, vec![(name, asset.amount)])),
        }
    }
    grouped.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, names) in grouped.iter_mut() {
        names.sort_by(|a, b| a.0.cmp(&b.0));
    }

    cbor_array(out, 2);
    cbor_uint(out, output.coin);
    cbor_map(out, grouped.len() as u64);
    for (policy, names) in &grouped {
        cbor_bytes(out, policy);
        cbor_map(out, names.len() as u64);
        for (name, amount) in names {
            cbor_bytes(out, name);
            cbor_uint(out, *amount);
        }
    }
}

// ============================================================================
// Canonical CBOR primitives (definite lengths, minimal-width heads)
// ============================================================================

fn cbor_head(out: &mut Vec<u8>, major: u8, value: u64) {
    let tag = major << 5;
    if value < 24 {
        out.push(tag | value as u8);
    } else if value <= 0xff {
        out.push(tag | 24);
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(tag | 25);
        out.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= 0xffff_ffff {
        out.push(tag | 26);
        out.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        out.push(tag | 27);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

fn cbor_uint(out: &mut Vec<u8>, value: u64) {
    cbor_head(out, 0, value);
}

fn cbor_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    cbor_head(out, 2, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn cbor_array(out: &mut Vec<u8>, len: u64) {
    cbor_head(out, 4, len);
}

fn cbor_map(out: &mut Vec<u8>, len: u64) {
    cbor_head(out, 5, len);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbor_heads_use_minimal_width() {
        let mut out = Vec::new();
        cbor_uint(&mut out, 0);
        cbor_uint(&mut out, 23);
        cbor_uint(&mut out, 24);
        cbor_uint(&mut out, 500);
        cbor_uint(&mut out, 1_500_000);
        assert_eq!(
            out,
            vec![
                0x00, // 0
                0x17, // 23
                0x18, 24,   // one-byte argument
                0x19, 0x01, 0xf4, // two-byte argument
                0x1a, 0x00, 0x16, 0xe3, 0x60, // four-byte argument
            ]
        );
    }

    #[test]
    fn policy_spends_exact_minimum_when_change_is_viable() {
        // 10 ADA, no prior assets: change 8.5 ADA clears the 1 ADA floor
        assert_eq!(
            token_spend_policy(10_000_000, 1_500_000, 1_000_000),
            TokenSpend::Exact(1_500_000)
        );
    }

    #[test]
    fn policy_spends_everything_when_change_would_be_dust() {
        // change 8.5 ADA is positive but below the 9 ADA change floor
        assert_eq!(
            token_spend_policy(10_000_000, 1_500_000, 9_000_000),
            TokenSpend::EntireBalance
        );
    }

    #[test]
    fn policy_allows_zero_change() {
        assert_eq!(
            token_spend_policy(1_500_000, 1_500_000, 1_000_000),
            TokenSpend::Exact(1_500_000)
        );
    }

    #[test]
    fn min_ada_floor_for_plain_outputs_is_one_ada() {
        let builder = CardanoTransactionBuilder::new(CardanoProtocolParameters::default());
        assert_eq!(builder.min_ada_for_bundle(&[]), 1_000_000);
    }

    #[test]
    fn min_ada_grows_with_bundle_size() {
        let builder = CardanoTransactionBuilder::new(CardanoProtocolParameters::default());
        let one = vec![AssetBalance {
            asset_id: format!("{}{}", "ab".repeat(28), "746f6b656e"),
            amount: 1,
        }];
        let two = vec![
            one[0].clone(),
            AssetBalance {
                asset_id: format!("{}{}", "cd".repeat(28), "6f74686572"),
                amount: 1,
            },
        ];
        let single = builder.min_ada_for_bundle(&one);
        let double = builder.min_ada_for_bundle(&two);
        assert!(single > 1_000_000);
        assert!(double > single);
    }
}
