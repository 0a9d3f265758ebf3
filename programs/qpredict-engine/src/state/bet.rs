use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `pending_deposit` is the ghost-bet prevention state: a bet in this
/// status must never be counted into a market's pool or slot map
/// (spec.md §3, invariant 5 in §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    PendingDeposit,
    Pending,
    Confirmed,
    Won,
    Lost,
    Refunded,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::PendingDeposit => "pending_deposit",
            BetStatus::Pending => "pending",
            BetStatus::Confirmed => "confirmed",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending_deposit" => BetStatus::PendingDeposit,
            "pending" => BetStatus::Pending,
            "confirmed" => BetStatus::Confirmed,
            "won" => BetStatus::Won,
            "lost" => BetStatus::Lost,
            "refunded" => BetStatus::Refunded,
            _ => return None,
        })
    }

    /// Statuses that contribute to `total_pool` / `slot_map` (spec.md §3).
    pub fn counts_toward_pool(&self) -> bool {
        matches!(
            self,
            BetStatus::Pending | BetStatus::Confirmed | BetStatus::Won | BetStatus::Lost
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub market_id: String,
    pub user_payout_address: String,
    pub option: u8,
    pub slots: u32,
    pub amount_qu: i64,
    pub on_chain_tx: Option<String>,
    pub status: BetStatus,
    pub payout_qu: Option<i64>,
    pub commitment_hash: String,
    pub commitment_nonce: String,
    pub user_signature: Option<String>,
    pub created_at: DateTime<Utc>,
}
