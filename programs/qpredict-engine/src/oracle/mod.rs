//! Oracle adapters (spec.md §6). The core only ever talks to the
//! `OracleAdapter` trait; the four concrete adapters below are the
//! tagged-variant dispatcher called for in spec.md §9's design notes,
//! replacing the source's dynamic `require(...)`-based module loading.

pub mod ai_council;
pub mod creator;
pub mod crypto_price;
pub mod sports;

use crate::config::Config;
use crate::errors::EngineResult;
use crate::state::market::Market;
use crate::state::oracle::OracleAttestation;
use async_trait::async_trait;
use serde_json::Value;

/// What an adapter hands back to the market state machine on a
/// successful resolution.
#[derive(Debug, Clone)]
pub struct OracleResult {
    pub winning_option: u8,
    pub price: Option<f64>,
    pub attestations: Vec<OracleAttestation>,
    pub proof: Value,
}

#[async_trait]
pub trait OracleAdapter: Send + Sync {
    async fn can_resolve(&self, market: &Market) -> bool;
    async fn fetch_result(&self, market: &Market) -> EngineResult<Option<OracleResult>>;
}

/// Picks the adapter matching a market's `market_type`. A leaf module
/// with no knowledge of escrow/market internals, breaking the cycle the
/// source's dynamic `require` used to paper over (spec.md §9).
pub struct OracleDispatcher {
    crypto_price: crypto_price::CryptoPriceAdapter,
    sports: sports::SportsAdapter,
    ai_council: ai_council::AiCouncilAdapter,
    creator: creator::CreatorAdapter,
}

impl OracleDispatcher {
    pub fn new(config: &Config) -> Self {
        OracleDispatcher {
            crypto_price: crypto_price::CryptoPriceAdapter::new(
                config.price_oracle_urls.clone(),
                config.min_oracle_sources,
                config.attestation_secret_key.clone(),
            ),
            sports: sports::SportsAdapter::new(
                config.sports_oracle_url.clone(),
                config.attestation_secret_key.clone(),
            ),
            ai_council: ai_council::AiCouncilAdapter::new(
                config.ai_council_url.clone(),
                config.ai_council_api_key.clone(),
                config.news_api_url.clone(),
                config.attestation_secret_key.clone(),
                config.ai_max_attempts,
            ),
            creator: creator::CreatorAdapter::new(),
        }
    }

    pub fn for_market(&self, market: &Market) -> &dyn OracleAdapter {
        use crate::state::market::MarketType;
        match market.market_type {
            MarketType::Price => &self.crypto_price,
            MarketType::Sports => &self.sports,
            MarketType::Ai => &self.ai_council,
            MarketType::Custom => &self.creator,
        }
    }
}
