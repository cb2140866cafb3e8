//! Ethereum transaction builder
//!
//! Produces the canonical RLP pre-signature encoding (EIP-155), hashes it
//! with keccak-256 for signing, and later re-encodes the transaction with
//! the recoverable signature's (v, r, s) into wire bytes.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use sha3::{Digest, Keccak256};

use crate::amount::AmountKind;
use crate::chains::{PayloadContext, SigningPayload, TransferIntent};
use crate::error::BuildError;
use crate::fee::FeeParameters;
use crate::signer::ChainSignature;
use crate::wallet::state::Wallet;

/// ERC-20 `transfer(address,uint256)` selector.
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Intermediate state retained between `build_for_sign` and
/// `build_for_send`.
#[derive(Debug, Clone)]
pub struct EthereumPayload {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: [u8; 20],
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
    pub from: [u8; 20],
}

pub struct EthereumTransactionBuilder {
    chain_id: u64,
}

impl EthereumTransactionBuilder {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn build_for_sign(
        &self,
        wallet: &Wallet,
        intent: &TransferIntent,
    ) -> Result<SigningPayload, BuildError> {
        let nonce = wallet
            .nonce()
            .ok_or_else(|| BuildError::BuildFailed("account state not loaded".to_string()))?;

        let (gas_limit, gas_price) = match &intent.fee.parameters {
            Some(FeeParameters::Evm {
                gas_limit,
                gas_price,
            }) => (*gas_limit, *gas_price),
            _ => {
                return Err(BuildError::BuildFailed(
                    "fee is missing gas parameters".to_string(),
                ))
            }
        };

        let amount = intent
            .amount
            .value
            .ok_or_else(|| BuildError::BuildFailed("amount not loaded".to_string()))?;

        let (to, value, data) = match &intent.amount.kind {
            AmountKind::Coin => (parse_address(&intent.destination)?, amount, Vec::new()),
            AmountKind::Token(token) => {
                let contract = intent
                    .contract_address
                    .as_deref()
                    .unwrap_or(&token.contract_address);
                let recipient = parse_address(&intent.destination)?;
                (
                    parse_address(contract)?,
                    0,
                    erc20_transfer_calldata(&recipient, amount),
                )
            }
            AmountKind::Reserve => {
                return Err(BuildError::BuildFailed(
                    "reserved balances are not spendable".to_string(),
                ))
            }
        };

        let payload = EthereumPayload {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
            chain_id: self.chain_id,
            from: parse_address(&intent.source)?,
        };

        let preimage = encode_for_sign(&payload);
        let digest = Keccak256::digest(&preimage).to_vec();

        Ok(SigningPayload {
            digest,
            context: PayloadContext::Ethereum(payload),
        })
    }

    /// Re-encode with (v, r, s). The signature is first verified by
    /// recovering the signer and comparing it to the sender address.
    pub fn build_for_send(
        &self,
        payload: &EthereumPayload,
        signature: &ChainSignature,
    ) -> Result<Vec<u8>, BuildError> {
        let (r, s, v) = match signature {
            ChainSignature::Recoverable { r, s, v } => (r, s, *v),
            ChainSignature::Ed25519 { .. } => {
                return Err(BuildError::BuildFailed(
                    "expected a recoverable secp256k1 signature".to_string(),
                ))
            }
        };

        verify_sender(payload, r, s, v)?;

        let v_eip155 = payload.chain_id * 2 + 35 + v as u64;
        Ok(encode_for_send(payload, r, s, v_eip155))
    }
}

fn verify_sender(
    payload: &EthereumPayload,
    r: &[u8; 32],
    s: &[u8; 32],
    v: u8,
) -> Result<(), BuildError> {
    let preimage = encode_for_sign(payload);
    let digest: [u8; 32] = Keccak256::digest(&preimage).into();

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(r);
    compact[32..].copy_from_slice(s);

    let rec_id = RecoveryId::from_i32(v as i32)
        .map_err(|e| BuildError::BuildFailed(format!("bad recovery id: {}", e)))?;
    let signature = RecoverableSignature::from_compact(&compact, rec_id)
        .map_err(|e| BuildError::BuildFailed(format!("bad signature: {}", e)))?;

    let secp = Secp256k1::new();
    let recovered = secp
        .recover_ecdsa(&Message::from_digest(digest), &signature)
        .map_err(|_| BuildError::BuildFailed("signature failed recovery".to_string()))?;

    if address_of(&recovered) != payload.from {
        return Err(BuildError::BuildFailed(
            "signature does not match the sender address".to_string(),
        ));
    }
    Ok(())
}

/// keccak-256 of the uncompressed key, last 20 bytes.
pub fn address_of(key: &secp256k1::PublicKey) -> [u8; 20] {
    let uncompressed = key.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

pub fn parse_address(text: &str) -> Result<[u8; 20], BuildError> {
    let digits = text.trim_start_matches("0x");
    let bytes =
        hex::decode(digits).map_err(|_| BuildError::BuildFailed(format!("invalid address: {}", text)))?;
    bytes
        .try_into()
        .map_err(|_| BuildError::BuildFailed(format!("address must be 20 bytes: {}", text)))
}

pub fn erc20_transfer_calldata(recipient: &[u8; 20], amount: u128) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 + 32);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(recipient);
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&amount.to_be_bytes());
    data.extend_from_slice(&word);
    data
}

fn encode_for_sign(payload: &EthereumPayload) -> Vec<u8> {
    let mut items = Vec::new();
    rlp_uint(&mut items, payload.nonce as u128);
    rlp_uint(&mut items, payload.gas_price);
    rlp_uint(&mut items, payload.gas_limit as u128);
    rlp_bytes(&mut items, &payload.to);
    rlp_uint(&mut items, payload.value);
    rlp_bytes(&mut items, &payload.data);
    rlp_uint(&mut items, payload.chain_id as u128);
    rlp_uint(&mut items, 0);
    rlp_uint(&mut items, 0);
    rlp_list(items)
}

fn encode_for_send(payload: &EthereumPayload, r: &[u8; 32], s: &[u8; 32], v: u64) -> Vec<u8> {
    let mut items = Vec::new();
    rlp_uint(&mut items, payload.nonce as u128);
    rlp_uint(&mut items, payload.gas_price);
    rlp_uint(&mut items, payload.gas_limit as u128);
    rlp_bytes(&mut items, &payload.to);
    rlp_uint(&mut items, payload.value);
    rlp_bytes(&mut items, &payload.data);
    rlp_uint(&mut items, v as u128);
    rlp_bytes(&mut items, strip_leading_zeros(r));
    rlp_bytes(&mut items, strip_leading_zeros(s));
    rlp_list(items)
}

fn strip_leading_zeros(word: &[u8; 32]) -> &[u8] {
    let start = word.iter().position(|b| *b != 0).unwrap_or(32);
    &word[start..]
}

// ============================================================================
// RLP primitives (the ledger's canonical pre-signature encoding)
// ============================================================================

fn rlp_uint(out: &mut Vec<u8>, value: u128) {
    if value == 0 {
        out.push(0x80);
        return;
    }
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(15);
    rlp_bytes(out, &bytes[start..]);
}

fn rlp_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    match bytes.len() {
        1 if bytes[0] < 0x80 => out.push(bytes[0]),
        len if len <= 55 => {
            out.push(0x80 + len as u8);
            out.extend_from_slice(bytes);
        }
        len => {
            let len_bytes = be_length(len);
            out.push(0xb7 + len_bytes.len() as u8);
            out.extend_from_slice(&len_bytes);
            out.extend_from_slice(bytes);
        }
    }
}

fn rlp_list(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    match payload.len() {
        len if len <= 55 => out.push(0xc0 + len as u8),
        len => {
            let len_bytes = be_length(len);
            out.push(0xf7 + len_bytes.len() as u8);
            out.extend_from_slice(&len_bytes);
        }
    }
    out.extend_from_slice(&payload);
    out
}

fn be_length(len: usize) -> Vec<u8> {
    let bytes = (len as u64).to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(7);
    bytes[start..].to_vec()
}
