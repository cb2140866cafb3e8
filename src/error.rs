use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::amount::AmountError;
use crate::fee::FeeError;
use crate::network::ProviderError;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("no wallet configured for ledger: {0}")]
    WalletNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("signing error: {0}")]
    Signer(#[from] SignerError),

    #[error("fee error: {0}")]
    Fee(#[from] FeeError),

    #[error("amount error: {0}")]
    Amount(#[from] AmountError),

    #[error("network error: {0}")]
    Network(#[from] ProviderError),

    #[error("transfer rejected: {}", format_violations(.0))]
    Validation(Vec<SendViolation>),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Local, deterministic transaction-construction failures. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("no unspent outputs available")]
    NoUnspentOutputs,

    #[error("asset {0} not found among held unspent outputs")]
    AssetNotFound(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("balance too low to form a valid change output")]
    LowBalanceForChange,

    #[error("transaction build failed: {0}")]
    BuildFailed(String),
}

/// Failures at the external-signer boundary. Fatal for the current send
/// attempt; surfaced unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("signer rejected the request: {0}")]
    Rejected(String),

    #[error("no signing key known for the given public key")]
    UnknownKey,

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("could not determine a recovery id matching the public key")]
    RecoveryFailed,

    #[error("signing task failed: {0}")]
    Bridge(String),
}

/// Pre-flight validation findings. All violations that apply to one
/// attempted send are collected and returned together.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendViolation {
    #[error("amount is below the chain minimum")]
    AmountBelowMinimum,

    #[error("amount exceeds the available balance")]
    AmountExceedsBalance,

    #[error("fee exceeds the available coin balance")]
    FeeExceedsBalance,

    #[error("amount plus fee exceeds the available balance")]
    TotalExceedsBalance,

    #[error("change would fall below the dust floor")]
    ChangeBelowDust,

    #[error("remaining balance would break the minimum for accounts holding assets")]
    MinimumBalanceBreach,

    #[error("reserved balance cannot be withdrawn")]
    ReserveNotSpendable,

    #[error("fee has not been loaded")]
    FeeNotLoaded,
}

fn format_violations(violations: &[SendViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for WalletError {
    fn into_response(self) -> Response {
        let status = match &self {
            WalletError::WalletNotFound(_) => StatusCode::NOT_FOUND,
            WalletError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            WalletError::Build(_) => StatusCode::BAD_REQUEST,
            WalletError::Validation(_) => StatusCode::BAD_REQUEST,
            WalletError::Amount(_) => StatusCode::BAD_REQUEST,
            WalletError::Fee(_) => StatusCode::BAD_REQUEST,
            WalletError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            WalletError::Validation(violations) => Json(json!({
                "error": self.to_string(),
                "violations": violations,
            })),
            _ => Json(json!({
                "error": self.to_string(),
            })),
        };

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_violation() {
        let err = WalletError::Validation(vec![
            SendViolation::AmountExceedsBalance,
            SendViolation::ChangeBelowDust,
        ]);
        let text = err.to_string();
        assert!(text.contains("amount exceeds"));
        assert!(text.contains("dust floor"));
    }

    #[test]
    fn build_error_display() {
        let err = BuildError::AssetNotFound("abc123".into());
        assert_eq!(
            err.to_string(),
            "asset abc123 not found among held unspent outputs"
        );
    }
}
