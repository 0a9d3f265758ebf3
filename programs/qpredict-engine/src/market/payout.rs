use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Fee breakdown and final payout numbers for one resolution, computed
/// entirely in integer arithmetic (spec.md §4.3 step 4). Fees apply to
/// the loser pool only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PayoutBreakdown {
    pub pool: i64,
    pub winner_slots: u64,
    pub total_slots: u64,
    pub winner_stake: i64,
    pub loser_pool: i64,
    pub burn: i64,
    pub shareholder: i64,
    pub operator: i64,
    pub oracle: i64,
    pub winner_pool: i64,
    pub per_slot: i64,
}

const BURN_BPS: i64 = 200; // 2%
const SHAREHOLDER_BPS: i64 = 1_000; // 10%
const OPERATOR_BPS: i64 = 50; // 0.5%
const BPS_DENOM: i64 = 10_000;

/// `per_slot = floor(winner_pool / winner_slots)`; everything upstream of
/// that division stays in integer (BigInt-equivalent, since QU already
/// fits `i64`) arithmetic — the float rule from spec.md §9 ("BigInt
/// division; never float") is honored by simply never introducing a
/// float in this path.
pub fn compute_payout(
    pool: i64,
    winner_slots: u64,
    total_slots: u64,
    oracle_fee_bps: u32,
) -> EngineResult<PayoutBreakdown> {
    if total_slots == 0 || winner_slots == 0 {
        return Ok(PayoutBreakdown {
            pool,
            winner_slots,
            total_slots,
            winner_stake: 0,
            loser_pool: pool,
            burn: 0,
            shareholder: 0,
            operator: 0,
            oracle: 0,
            winner_pool: 0,
            per_slot: 0,
        });
    }

    let winner_stake = mul_div(pool, winner_slots as i64, total_slots as i64)?;
    let loser_pool = pool
        .checked_sub(winner_stake)
        .ok_or(EngineError::Arithmetic("loser_pool"))?;

    let burn = mul_div(loser_pool, BURN_BPS, BPS_DENOM)?;
    let shareholder = mul_div(loser_pool, SHAREHOLDER_BPS, BPS_DENOM)?;
    let operator = mul_div(loser_pool, OPERATOR_BPS, BPS_DENOM)?;
    let oracle = mul_div(loser_pool, oracle_fee_bps as i64, BPS_DENOM)?;

    let fees = burn
        .checked_add(shareholder)
        .and_then(|v| v.checked_add(operator))
        .and_then(|v| v.checked_add(oracle))
        .ok_or(EngineError::Arithmetic("fee total"))?;

    let winner_pool = winner_stake
        .checked_add(loser_pool)
        .and_then(|v| v.checked_sub(fees))
        .ok_or(EngineError::Arithmetic("winner_pool"))?;

    let per_slot = winner_pool / winner_slots as i64;

    Ok(PayoutBreakdown {
        pool,
        winner_slots,
        total_slots,
        winner_stake,
        loser_pool,
        burn,
        shareholder,
        operator,
        oracle,
        winner_pool,
        per_slot,
    })
}

fn mul_div(value: i64, numerator: i64, denominator: i64) -> EngineResult<i64> {
    let product = (value as i128) * (numerator as i128);
    let result = product / (denominator as i128);
    i64::try_from(result).map_err(|_| EngineError::Arithmetic("mul_div"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_matches_spec_scenario() {
        // 2 bettors, 2 slots each, 10000 QU/slot => 20000 QU each side.
        let payout = compute_payout(40_000, 2, 4, 0).unwrap();
        assert_eq!(payout.winner_stake, 20_000);
        assert_eq!(payout.loser_pool, 20_000);
        assert_eq!(payout.burn, 400);
        assert_eq!(payout.shareholder, 2_000);
        assert_eq!(payout.operator, 100);
        assert_eq!(payout.oracle, 0);
        assert_eq!(payout.winner_pool, 37_500);
        assert_eq!(payout.per_slot, 18_750);
    }
}
