use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Bet,
    Payout,
    MarketCreate,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Bet => "bet",
            TransactionType::Payout => "payout",
            TransactionType::MarketCreate => "market_create",
            TransactionType::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "deposit" => TransactionType::Deposit,
            "withdrawal" => TransactionType::Withdrawal,
            "bet" => TransactionType::Bet,
            "payout" => TransactionType::Payout,
            "market_create" => TransactionType::MarketCreate,
            "refund" => TransactionType::Refund,
            _ => return None,
        })
    }
}

/// Append-only ledger row. Never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: i64,
    pub address: String,
    pub kind: TransactionType,
    pub amount_qu: i64,
    pub tx_hash: Option<String>,
    pub market_id: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
