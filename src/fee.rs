//! Fee model
//!
//! A fee is either a single fixed amount or a three-tier schedule
//! (low/normal/priority). Tier values derived from one base cost use fixed
//! ratios with ceiling rounding in base units, so tier ordering always
//! holds exactly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeeError {
    #[error("failed to load fee: expected 1 or 3 quotes, got {0}")]
    FailedToLoadFee(usize),
}

/// Exact inputs needed to rebuild the signed transaction deterministically;
/// the fee amount alone is not enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeParameters {
    Evm { gas_limit: u64, gas_price: u128 },
    Cardano { coins_spent: u64, change: u64 },
    Resource { bandwidth: u64, energy: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Amount,
    pub parameters: Option<FeeParameters>,
}

impl Fee {
    pub fn new(amount: Amount) -> Self {
        Self {
            amount,
            parameters: None,
        }
    }

    pub fn with_parameters(amount: Amount, parameters: FeeParameters) -> Self {
        Self {
            amount,
            parameters: Some(parameters),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeSchedule {
    Single(Fee),
    Tiered { low: Fee, normal: Fee, priority: Fee },
}

impl FeeSchedule {
    /// A schedule is built from exactly one or exactly three quotes; any
    /// other count is a programming error on the provider-glue side.
    pub fn from_quotes(mut quotes: Vec<Fee>) -> Result<Self, FeeError> {
        match quotes.len() {
            1 => Ok(FeeSchedule::Single(quotes.remove(0))),
            3 => {
                let priority = quotes.remove(2);
                let normal = quotes.remove(1);
                let low = quotes.remove(0);
                Ok(FeeSchedule::Tiered {
                    low,
                    normal,
                    priority,
                })
            }
            n => Err(FeeError::FailedToLoadFee(n)),
        }
    }

    /// The fee a caller should use when no tier was requested.
    pub fn normal(&self) -> &Fee {
        match self {
            FeeSchedule::Single(fee) => fee,
            FeeSchedule::Tiered { normal, .. } => normal,
        }
    }

    pub fn tier(&self, tier: FeeTier) -> &Fee {
        match self {
            FeeSchedule::Single(fee) => fee,
            FeeSchedule::Tiered {
                low,
                normal,
                priority,
            } => match tier {
                FeeTier::Low => low,
                FeeTier::Normal => normal,
                FeeTier::Priority => priority,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeTier {
    Low,
    Normal,
    Priority,
}

/// Tier values from one base cost: low = base, normal = base x 1.2,
/// priority = base x 1.5, rounded up to the next base unit.
pub fn tiers_from_base(base: u128) -> (u128, u128, u128) {
    (base, mul_div_ceil(base, 12, 10), mul_div_ceil(base, 15, 10))
}

/// Resource-metered fee (bandwidth/energy accounting): bandwidth is free
/// within the account's allowance, and the energy cost is scaled by a
/// network-reported multiplier (percent, 100 = x1), applied
/// multiplicatively.
pub fn resource_metered_cost(
    bandwidth_bytes: u64,
    free_bandwidth: u64,
    bandwidth_price: u64,
    energy_required: u64,
    energy_price: u64,
    dynamic_factor_pct: u64,
) -> u128 {
    let bandwidth_cost = if bandwidth_bytes <= free_bandwidth {
        0u128
    } else {
        bandwidth_bytes as u128 * bandwidth_price as u128
    };
    let energy_cost = mul_div_ceil(
        energy_required as u128 * energy_price as u128,
        dynamic_factor_pct as u128,
        100,
    );
    bandwidth_cost + energy_cost
}

fn mul_div_ceil(value: u128, numerator: u128, denominator: u128) -> u128 {
    (value * numerator + denominator - 1) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;

    fn fee(value: u128) -> Fee {
        Fee::new(Amount::coin(value, 6))
    }

    #[test]
    fn quotes_must_be_one_or_three() {
        assert!(FeeSchedule::from_quotes(vec![fee(1)]).is_ok());
        assert!(FeeSchedule::from_quotes(vec![fee(1), fee(2), fee(3)]).is_ok());

        let err = FeeSchedule::from_quotes(vec![fee(1), fee(2)]).unwrap_err();
        assert_eq!(err, FeeError::FailedToLoadFee(2));
        let err = FeeSchedule::from_quotes(vec![]).unwrap_err();
        assert_eq!(err, FeeError::FailedToLoadFee(0));
    }

    #[test]
    fn tier_ratios_round_up() {
        let (low, normal, priority) = tiers_from_base(10);
        assert_eq!((low, normal, priority), (10, 12, 15));

        // 7 * 1.2 = 8.4 -> 9, 7 * 1.5 = 10.5 -> 11
        let (low, normal, priority) = tiers_from_base(7);
        assert_eq!((low, normal, priority), (7, 9, 11));
    }

    #[test]
    fn tier_ordering_holds() {
        for base in [1u128, 3, 10, 999, 1_000_000_007] {
            let (low, normal, priority) = tiers_from_base(base);
            assert!(low <= normal && normal <= priority);
        }
    }

    #[test]
    fn bandwidth_within_allowance_is_free() {
        let cost = resource_metered_cost(250, 1_500, 1_000, 0, 0, 100);
        assert_eq!(cost, 0);
    }

    #[test]
    fn resource_cost_scales_multiplicatively() {
        // 300 bytes over allowance at 1000 per byte, 20k energy at 420
        // with a 1.5x network factor
        let cost = resource_metered_cost(300, 0, 1_000, 20_000, 420, 150);
        assert_eq!(cost, 300 * 1_000 + (20_000u128 * 420 * 150).div_ceil(100));
    }
}
