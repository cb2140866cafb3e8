use axum::extract::{Path, State};
use axum::Json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use super::types::{
    EstimateFeeRequest, EstimateFeeResponse, PendingResponse, SendRequest, SendResponse,
};
use crate::amount::{Amount, Token};
use crate::chains::{Ledger, TransferIntent};
use crate::error::WalletError;
use crate::fee::{Fee, FeeTier};
use crate::wallet::{WalletManager, WalletSummary};

pub struct AppState {
    pub managers: HashMap<Ledger, Arc<WalletManager>>,
    pub tokens: HashMap<Ledger, Vec<Token>>,
}

impl AppState {
    fn manager(&self, ledger: &str) -> Result<(Ledger, &Arc<WalletManager>), WalletError> {
        let ledger = Ledger::from_str(ledger)?;
        let manager = self
            .managers
            .get(&ledger)
            .ok_or_else(|| WalletError::WalletNotFound(ledger.to_string()))?;
        Ok((ledger, manager))
    }

    fn resolve_amount(
        &self,
        ledger: Ledger,
        amount: &str,
        token_contract: &Option<String>,
    ) -> Result<Amount, WalletError> {
        let value: u128 = amount
            .parse()
            .map_err(|_| WalletError::InvalidInput(format!("bad amount: {}", amount)))?;

        match token_contract {
            None => Ok(Amount::coin(value, ledger.decimals())),
            Some(contract) => {
                let token = self
                    .tokens
                    .get(&ledger)
                    .and_then(|tokens| {
                        tokens
                            .iter()
                            .find(|t| t.contract_address.eq_ignore_ascii_case(contract))
                    })
                    .ok_or_else(|| {
                        WalletError::InvalidInput(format!("unknown token: {}", contract))
                    })?;
                Ok(Amount::token(token.clone(), value))
            }
        }
    }
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    Path(ledger): Path<String>,
) -> Result<Json<WalletSummary>, WalletError> {
    let (_, manager) = state.manager(&ledger)?;
    Ok(Json(manager.update().await?))
}

pub async fn force_update_handler(
    State(state): State<Arc<AppState>>,
    Path(ledger): Path<String>,
) -> Result<Json<WalletSummary>, WalletError> {
    let (_, manager) = state.manager(&ledger)?;
    manager.set_needs_update().await;
    Ok(Json(manager.update().await?))
}

pub async fn balance_handler(
    State(state): State<Arc<AppState>>,
    Path(ledger): Path<String>,
) -> Result<Json<WalletSummary>, WalletError> {
    let (_, manager) = state.manager(&ledger)?;
    Ok(Json(manager.summary().await))
}

pub async fn pending_handler(
    State(state): State<Arc<AppState>>,
    Path(ledger): Path<String>,
) -> Result<Json<PendingResponse>, WalletError> {
    let (_, manager) = state.manager(&ledger)?;
    let summary = manager.summary().await;
    Ok(Json(PendingResponse {
        pending: summary.pending,
    }))
}

pub async fn estimate_fee_handler(
    State(state): State<Arc<AppState>>,
    Path(ledger): Path<String>,
    Json(request): Json<EstimateFeeRequest>,
) -> Result<Json<EstimateFeeResponse>, WalletError> {
    let (ledger, manager) = state.manager(&ledger)?;
    let amount = state.resolve_amount(ledger, &request.amount, &request.token_contract)?;

    let intent = TransferIntent {
        amount,
        fee: Fee::new(Amount::coin(0, ledger.decimals())),
        source: manager.wallet().await.default_address().to_string(),
        destination: request.destination,
        change_address: None,
        contract_address: request.token_contract,
        params: None,
    };

    let schedule = manager.estimate_fee(&intent).await?;
    Ok(Json(EstimateFeeResponse { schedule }))
}

pub async fn send_handler(
    State(state): State<Arc<AppState>>,
    Path(ledger): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, WalletError> {
    let (ledger, manager) = state.manager(&ledger)?;
    let amount = state.resolve_amount(ledger, &request.amount, &request.token_contract)?;

    let tier = match request.tier.as_deref() {
        None | Some("normal") => FeeTier::Normal,
        Some("low") => FeeTier::Low,
        Some("priority") => FeeTier::Priority,
        Some(other) => {
            return Err(WalletError::InvalidInput(format!("unknown fee tier: {}", other)))
        }
    };

    let source = manager.wallet().await.default_address().to_string();
    let quote_intent = TransferIntent {
        amount: amount.clone(),
        fee: Fee::new(Amount::coin(0, ledger.decimals())),
        source: source.clone(),
        destination: request.destination.clone(),
        change_address: None,
        contract_address: request.token_contract.clone(),
        params: None,
    };
    let schedule = manager.estimate_fee(&quote_intent).await?;
    let fee = schedule.tier(tier).clone();

    let intent = TransferIntent {
        amount,
        fee,
        source,
        destination: request.destination,
        change_address: None,
        contract_address: request.token_contract,
        params: None,
    };

    let transaction = manager.send(intent).await?;
    Ok(Json(SendResponse {
        hash: transaction.hash.clone(),
        transaction,
    }))
}
