use super::{OracleAdapter, OracleResult};
use crate::errors::EngineResult;
use crate::proof::{hmac_sha256_hex, sha256_hex};
use crate::state::market::{Market, MarketStatus};
use crate::state::oracle::OracleAttestation;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Matches a sports feed's reported winning team name against the
/// market's option labels by case-insensitive substring (spec.md §6).
/// Refuses to resolve when the feed hasn't settled the event yet, or
/// when the winner name doesn't decisively match exactly one option.
pub struct SportsAdapter {
    http: reqwest::Client,
    feed_url: Option<String>,
    attestation_secret: String,
}

#[derive(Deserialize)]
struct SportsFeedResponse {
    settled: bool,
    winner_name: Option<String>,
    event_id: Option<String>,
}

impl SportsAdapter {
    pub fn new(feed_url: Option<String>, attestation_secret: String) -> Self {
        SportsAdapter {
            http: reqwest::Client::new(),
            feed_url,
            attestation_secret,
        }
    }

    fn match_option(options: &[String], winner_name: &str) -> Option<u8> {
        let needle = winner_name.to_lowercase();
        let mut matches = options
            .iter()
            .enumerate()
            .filter(|(_, label)| {
                let hay = label.to_lowercase();
                hay.contains(&needle) || needle.contains(&hay)
            })
            .map(|(i, _)| i as u8);
        let first = matches.next()?;
        if matches.next().is_some() {
            None
        } else {
            Some(first)
        }
    }
}

#[async_trait]
impl OracleAdapter for SportsAdapter {
    async fn can_resolve(&self, market: &Market) -> bool {
        self.feed_url.is_some()
            && (market.status == MarketStatus::Active || market.status == MarketStatus::Closed)
    }

    async fn fetch_result(&self, market: &Market) -> EngineResult<Option<OracleResult>> {
        let Some(feed_url) = &self.feed_url else {
            return Ok(None);
        };

        let url = format!("{feed_url}?topic={}", market.pair_or_topic);
        let feed: SportsFeedResponse = match self.http.get(&url).send().await {
            Ok(resp) => match resp.json().await {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(error = %e, "sports feed decode failed");
                    return Ok(None);
                }
            },
            Err(e) => {
                debug!(error = %e, "sports feed fetch failed");
                return Ok(None);
            }
        };

        if !feed.settled {
            return Ok(None);
        }
        let Some(winner_name) = feed.winner_name else {
            return Ok(None);
        };
        let Some(winning_option) = Self::match_option(&market.options, &winner_name) else {
            debug!(winner_name = %winner_name, "sports feed winner did not match exactly one option");
            return Ok(None);
        };

        let source_ts = crate::time::now();
        let hash_input = format!(
            "{feed_url}|{}|{:.8}|{}|{}|{}",
            market.pair_or_topic,
            winning_option as f64,
            0,
            0,
            crate::time::format_utc(source_ts)
        );
        let attestation_hash = sha256_hex(hash_input.as_bytes());
        let attestation = OracleAttestation {
            market_id: market.id.clone(),
            source: feed_url.clone(),
            pair: market.pair_or_topic.clone(),
            price: winning_option as f64,
            tick: None,
            epoch: None,
            source_ts,
            attestation_hash: attestation_hash.clone(),
            server_signature: hmac_sha256_hex(&self.attestation_secret, &attestation_hash),
        };

        Ok(Some(OracleResult {
            winning_option,
            price: None,
            attestations: vec![attestation],
            proof: json!({
                "source": "sports",
                "feed_url": feed_url,
                "winner_name": winner_name,
                "event_id": feed.event_id,
            }),
        }))
    }
}
