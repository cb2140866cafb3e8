use serde::{Deserialize, Serialize};

use crate::fee::FeeSchedule;
use crate::wallet::state::PendingTransaction;

#[derive(Debug, Deserialize)]
pub struct EstimateFeeRequest {
    pub destination: String,
    /// Base-unit amount as a decimal string.
    pub amount: String,
    pub token_contract: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EstimateFeeResponse {
    pub schedule: FeeSchedule,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub destination: String,
    /// Base-unit amount as a decimal string.
    pub amount: String,
    pub token_contract: Option<String>,
    /// "low" | "normal" | "priority"; defaults to normal.
    pub tier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub hash: String,
    pub transaction: PendingTransaction,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub pending: Vec<PendingTransaction>,
}
