use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Market status. Terminal states are `resolved` and `cancelled`; every
/// other state can still be acted on by the cron orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Draft,
    PendingTx,
    Active,
    Closed,
    Resolving,
    Resolved,
    Cancelled,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Draft => "draft",
            MarketStatus::PendingTx => "pending_tx",
            MarketStatus::Active => "active",
            MarketStatus::Closed => "closed",
            MarketStatus::Resolving => "resolving",
            MarketStatus::Resolved => "resolved",
            MarketStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "draft" => MarketStatus::Draft,
            "pending_tx" => MarketStatus::PendingTx,
            "active" => MarketStatus::Active,
            "closed" => MarketStatus::Closed,
            "resolving" => MarketStatus::Resolving,
            "resolved" => MarketStatus::Resolved,
            "cancelled" => MarketStatus::Cancelled,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Price,
    Sports,
    Ai,
    Custom,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Price => "price",
            MarketType::Sports => "sports",
            MarketType::Ai => "ai",
            MarketType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "price" => MarketType::Price,
            "sports" => MarketType::Sports,
            "ai" => MarketType::Ai,
            "custom" => MarketType::Custom,
            _ => return None,
        })
    }

    /// Maximum resolution window: 30 days for price markets, 90 for the
    /// rest (spec.md §3 invariants).
    pub fn max_window(&self) -> chrono::Duration {
        match self {
            MarketType::Price => chrono::Duration::days(30),
            _ => chrono::Duration::days(90),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    Above,
    Below,
    Range,
    Bracket,
}

impl ResolutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionType::Above => "above",
            ResolutionType::Below => "below",
            ResolutionType::Range => "range",
            ResolutionType::Bracket => "bracket",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "above" => ResolutionType::Above,
            "below" => ResolutionType::Below,
            "range" => ResolutionType::Range,
            "bracket" => ResolutionType::Bracket,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionSpec {
    #[serde(rename = "type")]
    pub kind: ResolutionType,
    pub target: f64,
    pub target_high: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub user: Option<String>,
    pub ai_parsed: bool,
    pub trending_agent: bool,
}

impl Default for Provenance {
    fn default() -> Self {
        Provenance {
            user: None,
            ai_parsed: false,
            trending_agent: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    /// 0 until on-chain bet-id discovery succeeds (spec.md §4.3).
    pub on_chain_bet_id: u32,
    pub pair_or_topic: String,
    pub question: String,
    pub resolution: ResolutionSpec,
    pub market_type: MarketType,
    /// 2-8 option labels, each <= 31 bytes.
    pub options: Vec<String>,
    pub close_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub min_bet_qu: i64,
    pub max_slots_per_option: u32,
    pub total_pool: i64,
    pub slot_map: Vec<u32>,
    pub status: MarketStatus,
    pub resolution_price: Option<f64>,
    pub winning_option: Option<u8>,
    pub creator_address: String,
    pub creation_tx: Option<String>,
    pub commitment_hash: String,
    pub oracle_addresses: Vec<String>,
    pub oracle_fee_bps: u32,
    pub auto_refund_at: Option<DateTime<Utc>>,
    pub category: String,
    pub ai_attempt_count: u32,
    pub ai_resolution_proof: Option<serde_json::Value>,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

impl Market {
    /// Structural validation from spec.md §3: `close <= end`, window
    /// bounds by market type, option count/length, min bet, max slots.
    pub fn validate_params(
        options: &[String],
        close_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        market_type: MarketType,
        min_bet_qu: i64,
        max_slots_per_option: u32,
    ) -> Result<(), String> {
        if options.len() < 2 || options.len() > 8 {
            return Err("market must have between 2 and 8 options".into());
        }
        if options.iter().any(|o| o.as_bytes().len() > 31) {
            return Err("option labels must be at most 31 bytes".into());
        }
        if close_date > end_date {
            return Err("close_date must be <= end_date".into());
        }
        let window = end_date - close_date;
        if window < chrono::Duration::minutes(1) || window > market_type.max_window() {
            return Err("resolution window out of bounds for market type".into());
        }
        if min_bet_qu < 10_000 {
            return Err("min_bet_qu must be >= 10000".into());
        }
        if max_slots_per_option == 0 || max_slots_per_option > 2_048 {
            return Err("max_slots_per_option must be in 1..=2048".into());
        }
        Ok(())
    }
}
