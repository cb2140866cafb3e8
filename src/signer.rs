//! External signer bridge
//!
//! The signer is an opaque capability: given a digest and the public key to
//! sign with, it returns signature bytes. It never sees transaction
//! semantics. The bridge owns the two marshalling duties that sit at this
//! boundary:
//!
//! - secp256k1: raw 64-byte r||s signatures are resolved to (r, s, v) by
//!   recovering against the given public key and digest, and the chosen
//!   recovery id is verified by round-trip recovery before use
//! - ed25519 (Cardano extended variant): the public key is trailing-zero
//!   padded to the expected extended-key length before it reaches the
//!   signing primitive

use async_trait::async_trait;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SignerError;
use crate::keys::PublicKey;

/// Extended-key length expected by the Cardano signing primitive.
pub const CARDANO_EXTENDED_KEY_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Secp256k1,
    Ed25519Cardano,
}

/// Chain-native signature produced by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSignature {
    Recoverable {
        r: [u8; 32],
        s: [u8; 32],
        v: u8,
    },
    Ed25519 {
        signature: [u8; 64],
        verifying_key: [u8; 32],
    },
}

/// The external signing capability. Implementations may be hardware-backed;
/// the blocking ones must run off the async runtime (see `LocalKeySigner`).
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, digest: &[u8], key: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// Bridges raw signer output into chain-native signatures.
#[derive(Clone)]
pub struct SignerBridge {
    inner: Arc<dyn TransactionSigner>,
}

impl SignerBridge {
    pub fn new(inner: Arc<dyn TransactionSigner>) -> Self {
        Self { inner }
    }

    pub async fn sign(
        &self,
        curve: Curve,
        digest: &[u8],
        public_key: &PublicKey,
    ) -> Result<ChainSignature, SignerError> {
        match curve {
            Curve::Secp256k1 => {
                let raw = self
                    .inner
                    .sign(digest, public_key.blockchain_key())
                    .await?;
                marshal_secp256k1(&raw, digest, public_key.blockchain_key())
            }
            Curve::Ed25519Cardano => {
                let padded =
                    pad_extended_key(public_key.blockchain_key(), CARDANO_EXTENDED_KEY_LEN);
                let raw = self.inner.sign(digest, &padded).await?;
                marshal_ed25519(&raw, public_key.blockchain_key())
            }
        }
    }
}

/// Resolve a raw r||s signature to (r, s, v) against the given public key.
///
/// The recovery id is not carried by raw signatures, so it is found by
/// trying both candidates and keeping the one whose recovered key matches;
/// a wrong `v` would otherwise be a silent failure all the way to the node.
pub fn marshal_secp256k1(
    raw: &[u8],
    digest: &[u8],
    public_key: &[u8],
) -> Result<ChainSignature, SignerError> {
    if raw.len() < 64 {
        return Err(SignerError::MalformedSignature(format!(
            "expected at least 64 signature bytes, got {}",
            raw.len()
        )));
    }
    let digest: [u8; 32] = digest
        .try_into()
        .map_err(|_| SignerError::MalformedSignature("digest must be 32 bytes".to_string()))?;
    let message = Message::from_digest(digest);
    let expected = secp256k1::PublicKey::from_slice(public_key)
        .map_err(|e| SignerError::MalformedSignature(format!("bad public key: {}", e)))?;

    let secp = Secp256k1::new();
    for candidate in 0..=1i32 {
        let rec_id = RecoveryId::from_i32(candidate)
            .map_err(|e| SignerError::MalformedSignature(e.to_string()))?;
        let signature = RecoverableSignature::from_compact(&raw[..64], rec_id)
            .map_err(|e| SignerError::MalformedSignature(e.to_string()))?;
        if let Ok(recovered) = secp.recover_ecdsa(&message, &signature) {
            if recovered == expected {
                let mut r = [0u8; 32];
                let mut s = [0u8; 32];
                r.copy_from_slice(&raw[..32]);
                s.copy_from_slice(&raw[32..64]);
                return Ok(ChainSignature::Recoverable {
                    r,
                    s,
                    v: candidate as u8,
                });
            }
        }
    }
    Err(SignerError::RecoveryFailed)
}

fn marshal_ed25519(raw: &[u8], public_key: &[u8]) -> Result<ChainSignature, SignerError> {
    let signature: [u8; 64] = raw.try_into().map_err(|_| {
        SignerError::MalformedSignature(format!(
            "expected 64 ed25519 signature bytes, got {}",
            raw.len()
        ))
    })?;
    if public_key.len() < 32 {
        return Err(SignerError::MalformedSignature(
            "ed25519 public key shorter than 32 bytes".to_string(),
        ));
    }
    let mut verifying_key = [0u8; 32];
    verifying_key.copy_from_slice(&public_key[..32]);
    Ok(ChainSignature::Ed25519 {
        signature,
        verifying_key,
    })
}

/// Trailing-zero pad a public key to the extended-key length the signing
/// primitive expects. Without this the key is structurally valid but
/// cryptographically wrong.
pub fn pad_extended_key(key: &[u8], len: usize) -> Vec<u8> {
    let mut padded = key.to_vec();
    if padded.len() < len {
        padded.resize(len, 0);
    }
    padded
}

// ============================================================================
// Local signing keys (development and tests)
// ============================================================================

enum LocalKey {
    Secp256k1(secp256k1::SecretKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// In-process signer holding raw keys, selected by the public key passed
/// with each request. Real deployments plug in their own
/// `TransactionSigner`; this one exists for the server binary's dev setup
/// and for tests.
///
/// Signing primitives are synchronous, so they run under `spawn_blocking`
/// and never block the async runtime.
pub struct LocalKeySigner {
    keys: HashMap<Vec<u8>, Arc<LocalKey>>,
}

impl LocalKeySigner {
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    pub fn with_secp256k1(mut self, secret: [u8; 32]) -> Result<Self, SignerError> {
        let secp = Secp256k1::new();
        let key = secp256k1::SecretKey::from_slice(&secret)
            .map_err(|e| SignerError::Rejected(format!("bad secp256k1 key: {}", e)))?;
        let public = key.public_key(&secp).serialize().to_vec();
        self.keys.insert(public, Arc::new(LocalKey::Secp256k1(key)));
        Ok(self)
    }

    pub fn with_ed25519(mut self, seed: [u8; 32]) -> Self {
        let key = ed25519_dalek::SigningKey::from_bytes(&seed);
        let public = key.verifying_key().to_bytes().to_vec();
        self.keys.insert(public, Arc::new(LocalKey::Ed25519(key)));
        self
    }

    /// Keys are looked up by the leading public-key bytes so extended
    /// (padded) keys still resolve.
    fn key_for(&self, public: &[u8]) -> Option<Arc<LocalKey>> {
        self.keys
            .iter()
            .find(|(known, _)| public.len() >= known.len() && &public[..known.len()] == known.as_slice())
            .map(|(_, key)| key.clone())
    }
}

impl Default for LocalKeySigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionSigner for LocalKeySigner {
    async fn sign(&self, digest: &[u8], key: &[u8]) -> Result<Vec<u8>, SignerError> {
        let local = self.key_for(key).ok_or(SignerError::UnknownKey)?;
        let digest = digest.to_vec();

        tokio::task::spawn_blocking(move || match local.as_ref() {
            LocalKey::Secp256k1(secret) => {
                let digest: [u8; 32] = digest.as_slice().try_into().map_err(|_| {
                    SignerError::Rejected("secp256k1 digest must be 32 bytes".to_string())
                })?;
                let secp = Secp256k1::new();
                let message = Message::from_digest(digest);
                let signature = secp.sign_ecdsa(&message, secret);
                Ok(signature.serialize_compact().to_vec())
            }
            LocalKey::Ed25519(secret) => {
                use ed25519_dalek::Signer;
                Ok(secret.sign(&digest).to_bytes().to_vec())
            }
        })
        .await
        .map_err(|e| SignerError::Bridge(e.to_string()))?
    }
}
