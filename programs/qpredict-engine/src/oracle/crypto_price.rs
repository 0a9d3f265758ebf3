use super::{OracleAdapter, OracleResult};
use crate::errors::{EngineError, EngineResult};
use crate::proof::{hmac_sha256_hex, sha256_hex};
use crate::state::market::{Market, MarketStatus};
use crate::state::oracle::OracleAttestation;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Fetches prices from every configured exchange endpoint and resolves
/// by the median (spec.md §6). Requires at least `min_sources`
/// successful responses; returns `None` (deferred resolution) otherwise.
pub struct CryptoPriceAdapter {
    http: reqwest::Client,
    sources: Vec<String>,
    min_sources: usize,
    attestation_secret: String,
}

#[derive(Deserialize)]
struct PriceResponse {
    price: f64,
}

impl CryptoPriceAdapter {
    pub fn new(sources: Vec<String>, min_sources: usize, attestation_secret: String) -> Self {
        CryptoPriceAdapter {
            http: reqwest::Client::new(),
            sources,
            min_sources: min_sources.max(1),
            attestation_secret,
        }
    }

    async fn fetch_one(&self, base_url: &str, pair: &str) -> Option<f64> {
        let url = format!("{base_url}?pair={pair}");
        match self.http.get(&url).send().await {
            Ok(resp) => match resp.json::<PriceResponse>().await {
                Ok(parsed) => Some(parsed.price),
                Err(e) => {
                    debug!(url = %url, error = %e, "price oracle response decode failed");
                    None
                }
            },
            Err(e) => {
                debug!(url = %url, error = %e, "price oracle fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl OracleAdapter for CryptoPriceAdapter {
    async fn can_resolve(&self, market: &Market) -> bool {
        market.status == MarketStatus::Active || market.status == MarketStatus::Closed
    }

    async fn fetch_result(&self, market: &Market) -> EngineResult<Option<OracleResult>> {
        let mut prices = Vec::new();
        for url in &self.sources {
            if let Some(price) = self.fetch_one(url, &market.pair_or_topic).await {
                prices.push((url.clone(), price));
            }
        }

        if prices.len() < self.min_sources {
            debug!(
                have = prices.len(),
                need = self.min_sources,
                "not enough price sources yet"
            );
            return Ok(None);
        }

        let mut sorted: Vec<f64> = prices.iter().map(|(_, p)| *p).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = sorted[sorted.len() / 2];

        let winning_option = crate::market::winner::determine_winner_with_options(
            &market.resolution,
            Some(median),
            None,
            market.options.len(),
        )
        .ok_or_else(|| {
            EngineError::InvalidMarketParams(
                "resolution spec missing target_high for range/bracket".into(),
            )
        })?;

        let mut attestations = Vec::with_capacity(prices.len());
        for (source, price) in &prices {
            let source_ts = crate::time::now();
            let hash_input = format!(
                "{source}|{}|{price:.8}|{}|{}|{}",
                market.pair_or_topic,
                0,
                0,
                crate::time::format_utc(source_ts)
            );
            let attestation_hash = sha256_hex(hash_input.as_bytes());
            attestations.push(OracleAttestation {
                market_id: market.id.clone(),
                source: source.clone(),
                pair: market.pair_or_topic.clone(),
                price: *price,
                tick: None,
                epoch: None,
                source_ts,
                attestation_hash: attestation_hash.clone(),
                server_signature: hmac_sha256_hex(&self.attestation_secret, &attestation_hash),
            });
        }

        Ok(Some(OracleResult {
            winning_option,
            price: Some(median),
            attestations,
            proof: json!({
                "source": "crypto_price",
                "prices": prices.iter().map(|(s, p)| json!({"source": s, "price": p})).collect::<Vec<_>>(),
                "median": median,
            }),
        }))
    }
}
