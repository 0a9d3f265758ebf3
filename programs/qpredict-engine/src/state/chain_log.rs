use serde::{Deserialize, Serialize};

/// The ten commitment-chain event types (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MarketCreate,
    BetPlace,
    BetConfirm,
    MarketResolve,
    MarketRecovery,
    Payout,
    Deposit,
    Withdrawal,
    SolvencyProof,
    SolvencyViolation,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MarketCreate => "market_create",
            EventType::BetPlace => "bet_place",
            EventType::BetConfirm => "bet_confirm",
            EventType::MarketResolve => "market_resolve",
            EventType::MarketRecovery => "market_recovery",
            EventType::Payout => "payout",
            EventType::Deposit => "deposit",
            EventType::Withdrawal => "withdrawal",
            EventType::SolvencyProof => "solvency_proof",
            EventType::SolvencyViolation => "solvency_violation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "market_create" => EventType::MarketCreate,
            "bet_place" => EventType::BetPlace,
            "bet_confirm" => EventType::BetConfirm,
            "market_resolve" => EventType::MarketResolve,
            "market_recovery" => EventType::MarketRecovery,
            "payout" => EventType::Payout,
            "deposit" => EventType::Deposit,
            "withdrawal" => EventType::Withdrawal,
            "solvency_proof" => EventType::SolvencyProof,
            "solvency_violation" => EventType::SolvencyViolation,
            _ => return None,
        })
    }
}

/// One append-only row of the commitment hash chain (spec.md §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEntry {
    pub sequence_num: i64,
    pub event_type: EventType,
    pub entity_id: String,
    pub payload_json: String,
    pub payload_hash: String,
    pub prev_hash: String,
    pub chain_hash: String,
}

/// 64 ASCII '0' characters — the genesis `prev_hash`.
pub fn genesis_hash() -> String {
    "0".repeat(64)
}
