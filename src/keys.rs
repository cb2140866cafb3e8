//! Public key material handed in by the external custody layer.

use serde::{Deserialize, Serialize};

/// A derivation attached to a seed key. Once attached it is never mutated;
/// `PublicKey::with_derivation` produces a new value instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDerivation {
    pub path: String,
    pub derived_key: Vec<u8>,
}

/// Wallet public key: the custody seed key plus an optional depth-1
/// derivation. The key used on chain is the derived key when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    seed_key: Vec<u8>,
    derivation: Option<KeyDerivation>,
}

impl PublicKey {
    pub fn new(seed_key: Vec<u8>) -> Self {
        Self {
            seed_key,
            derivation: None,
        }
    }

    pub fn with_derivation(&self, path: impl Into<String>, derived_key: Vec<u8>) -> Self {
        Self {
            seed_key: self.seed_key.clone(),
            derivation: Some(KeyDerivation {
                path: path.into(),
                derived_key,
            }),
        }
    }

    pub fn seed_key(&self) -> &[u8] {
        &self.seed_key
    }

    pub fn derivation(&self) -> Option<&KeyDerivation> {
        self.derivation.as_ref()
    }

    /// The key actually used on chain: the derived key if a derivation is
    /// attached, the seed key otherwise.
    pub fn blockchain_key(&self) -> &[u8] {
        match &self.derivation {
            Some(d) => &d.derived_key,
            None => &self.seed_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blockchain_key_prefers_derived() {
        let seed = vec![1u8; 33];
        let derived = vec![2u8; 33];

        let key = PublicKey::new(seed.clone());
        assert_eq!(key.blockchain_key(), seed.as_slice());

        let derived_key = key.with_derivation("m/44'/1815'/0'", derived.clone());
        assert_eq!(derived_key.blockchain_key(), derived.as_slice());
        // the original value is untouched
        assert_eq!(key.blockchain_key(), seed.as_slice());
    }
}
