//! Value and token model
//!
//! - `Amount`: a quantity of a single asset kind, in base (smallest) units
//! - `Token`: a fungible asset identified by its contract/policy id
//!
//! Amounts of different kinds never mix silently: arithmetic is checked and
//! cross-kind operations return `AmountError::KindMismatch`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("cannot combine {left} with {right}")]
    KindMismatch { left: String, right: String },

    #[error("amount has not been loaded yet")]
    NotLoaded,

    #[error("amount arithmetic overflowed")]
    Overflow,

    #[error("amount would become negative")]
    Negative,
}

/// A fungible token. Identity is the contract (or policy) id compared
/// case-insensitively; name and symbol are display-only and different
/// providers report them with different casing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    pub symbol: String,
    pub contract_address: String,
    pub decimals: u8,
    pub token_id: Option<String>,
}

impl Token {
    /// Bundle lookups match on a prefix, not equality: some providers report
    /// only the policy id while others report policy id concatenated with
    /// the hex asset name.
    pub fn matches_asset_id(&self, asset_id: &str) -> bool {
        let contract = self.contract_address.to_ascii_lowercase();
        contract.starts_with(&asset_id.to_ascii_lowercase())
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.contract_address
            .eq_ignore_ascii_case(&other.contract_address)
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.contract_address.to_ascii_lowercase().hash(state);
    }
}

/// The semantic category of an amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountKind {
    Coin,
    Token(Token),
    /// Balance the ledger holds but the owner cannot spend (e.g. an account
    /// reserve). Display and accounting only; withdrawal validation rejects
    /// it explicitly.
    Reserve,
}

impl AmountKind {
    pub fn describe(&self) -> String {
        match self {
            AmountKind::Coin => "coin".to_string(),
            AmountKind::Token(t) => format!("token {}", t.symbol),
            AmountKind::Reserve => "reserve".to_string(),
        }
    }
}

/// A quantity of one asset kind in base units. `value = None` means the
/// balance has not been loaded from the network yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amount {
    pub kind: AmountKind,
    pub decimals: u8,
    pub value: Option<u128>,
}

impl Amount {
    pub fn coin(value: u128, decimals: u8) -> Self {
        Self {
            kind: AmountKind::Coin,
            decimals,
            value: Some(value),
        }
    }

    pub fn token(token: Token, value: u128) -> Self {
        let decimals = token.decimals;
        Self {
            kind: AmountKind::Token(token),
            decimals,
            value: Some(value),
        }
    }

    pub fn reserve(value: u128, decimals: u8) -> Self {
        Self {
            kind: AmountKind::Reserve,
            decimals,
            value: Some(value),
        }
    }

    pub fn not_loaded(kind: AmountKind, decimals: u8) -> Self {
        Self {
            kind,
            decimals,
            value: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_zero(&self) -> bool {
        self.value == Some(0)
    }

    /// The loaded base-unit value, or `AmountError::NotLoaded`.
    pub fn value(&self) -> Result<u128, AmountError> {
        self.value.ok_or(AmountError::NotLoaded)
    }

    pub fn as_token(&self) -> Option<&Token> {
        match &self.kind {
            AmountKind::Token(t) => Some(t),
            _ => None,
        }
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.require_same_kind(other)?;
        let value = self
            .value()?
            .checked_add(other.value()?)
            .ok_or(AmountError::Overflow)?;
        Ok(Amount {
            kind: self.kind.clone(),
            decimals: self.decimals,
            value: Some(value),
        })
    }

    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, AmountError> {
        self.require_same_kind(other)?;
        let value = self
            .value()?
            .checked_sub(other.value()?)
            .ok_or(AmountError::Negative)?;
        Ok(Amount {
            kind: self.kind.clone(),
            decimals: self.decimals,
            value: Some(value),
        })
    }

    fn require_same_kind(&self, other: &Amount) -> Result<(), AmountError> {
        if self.kind != other.kind {
            return Err(AmountError::KindMismatch {
                left: self.kind.describe(),
                right: other.kind.describe(),
            });
        }
        Ok(())
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.value.is_some() && self.value == other.value
    }
}

/// Ordering is only defined between loaded amounts of the same kind;
/// everything else compares as `None`.
impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.kind != other.kind {
            return None;
        }
        match (self.value, other.value) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_token(contract: &str) -> Token {
        Token {
            name: "Test Token".to_string(),
            symbol: "TST".to_string(),
            contract_address: contract.to_string(),
            decimals: 6,
            token_id: None,
        }
    }

    #[test]
    fn cross_kind_arithmetic_fails_loudly() {
        let coin = Amount::coin(100, 6);
        let token = Amount::token(test_token("abcd"), 100);

        let err = coin.checked_add(&token).unwrap_err();
        assert!(matches!(err, AmountError::KindMismatch { .. }));
    }

    #[test]
    fn cross_kind_ordering_is_undefined() {
        let coin = Amount::coin(100, 6);
        let reserve = Amount::reserve(100, 6);
        assert_eq!(coin.partial_cmp(&reserve), None);
    }

    #[test]
    fn unloaded_amounts_do_not_compare() {
        let a = Amount::coin(100, 6);
        let b = Amount::not_loaded(AmountKind::Coin, 6);
        assert_eq!(a.partial_cmp(&b), None);
        assert_ne!(a, b);
    }

    #[test]
    fn same_kind_arithmetic() {
        let a = Amount::coin(150, 6);
        let b = Amount::coin(50, 6);
        assert_eq!(a.checked_sub(&b).unwrap().value, Some(100));
        assert_eq!(a.checked_add(&b).unwrap().value, Some(200));
        assert!(matches!(
            b.checked_sub(&a).unwrap_err(),
            AmountError::Negative
        ));
    }

    #[test]
    fn token_identity_ignores_case_and_display_fields() {
        let mut a = test_token("ABCDEF012345");
        let b = test_token("abcdef012345");
        a.name = "Other Name".to_string();
        a.symbol = "OTH".to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn token_asset_id_prefix_match() {
        // contract = policy id + hex asset name, provider reports policy only
        let token = test_token("aabbccddeeff00112233445566778899aabbccddeeff001122334455746f6b656e");
        assert!(token.matches_asset_id(
            "aabbccddeeff00112233445566778899aabbccddeeff001122334455"
        ));
        assert!(token.matches_asset_id(
            "AABBCCDDEEFF00112233445566778899AABBCCDDEEFF001122334455"
        ));
        assert!(!token.matches_asset_id("ffff"));
    }
}
