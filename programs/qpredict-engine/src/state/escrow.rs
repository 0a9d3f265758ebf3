use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    AwaitingDeposit,
    DepositDetected,
    JoiningSc,
    ActiveInSc,
    WonAwaitingSweep,
    Sweeping,
    Swept,
    Completed,
    Lost,
    Expired,
    Refunding,
    Refunded,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::AwaitingDeposit => "awaiting_deposit",
            EscrowStatus::DepositDetected => "deposit_detected",
            EscrowStatus::JoiningSc => "joining_sc",
            EscrowStatus::ActiveInSc => "active_in_sc",
            EscrowStatus::WonAwaitingSweep => "won_awaiting_sweep",
            EscrowStatus::Sweeping => "sweeping",
            EscrowStatus::Swept => "swept",
            EscrowStatus::Completed => "completed",
            EscrowStatus::Lost => "lost",
            EscrowStatus::Expired => "expired",
            EscrowStatus::Refunding => "refunding",
            EscrowStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "awaiting_deposit" => EscrowStatus::AwaitingDeposit,
            "deposit_detected" => EscrowStatus::DepositDetected,
            "joining_sc" => EscrowStatus::JoiningSc,
            "active_in_sc" => EscrowStatus::ActiveInSc,
            "won_awaiting_sweep" => EscrowStatus::WonAwaitingSweep,
            "sweeping" => EscrowStatus::Sweeping,
            "swept" => EscrowStatus::Swept,
            "completed" => EscrowStatus::Completed,
            "lost" => EscrowStatus::Lost,
            "expired" => EscrowStatus::Expired,
            "refunding" => EscrowStatus::Refunding,
            "refunded" => EscrowStatus::Refunded,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EscrowStatus::Swept
                | EscrowStatus::Completed
                | EscrowStatus::Lost
                | EscrowStatus::Expired
                | EscrowStatus::Refunded
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escrow {
    pub id: String,
    pub bet_id: String,
    pub market_id: String,
    /// 60-character globally-unique on-chain identity.
    pub escrow_address: String,
    pub user_payout_address: String,
    pub option: u8,
    pub slots: u32,
    pub expected_amount_qu: i64,
    pub status: EscrowStatus,
    pub deposit_detected_at: Option<DateTime<Utc>>,
    pub deposit_amount_qu: Option<i64>,
    pub join_tx_id: Option<String>,
    pub join_target_tick: Option<u32>,
    pub payout_detected_at: Option<DateTime<Utc>>,
    pub payout_amount_qu: Option<i64>,
    pub sweep_tx_id: Option<String>,
    pub sweep_target_tick: Option<u32>,
    pub join_retry_count: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
