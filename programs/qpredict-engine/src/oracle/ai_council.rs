use super::{OracleAdapter, OracleResult};
use crate::errors::EngineResult;
use crate::proof::{hmac_sha256_hex, sha256_hex};
use crate::state::market::{Market, MarketStatus};
use crate::state::oracle::OracleAttestation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

const PERSONAS: [&str; 3] = ["skeptic", "analyst", "contrarian"];
const MAJORITY_THRESHOLD: usize = 2;
const MIN_AVG_CONFIDENCE: f64 = 0.7;

/// Resolves free-form "AI" markets by polling an LLM endpoint under
/// three distinct personas and requiring a 2-of-3 majority with average
/// confidence above threshold (spec.md §6). News context is fetched
/// once and shared across personas so each vote is grounded in the
/// same facts. Gives up after `max_attempts` inconclusive rounds,
/// leaving the market to the auto-refund fallback.
pub struct AiCouncilAdapter {
    http: reqwest::Client,
    council_url: Option<String>,
    api_key: Option<String>,
    news_api_url: Option<String>,
    attestation_secret: String,
    max_attempts: u32,
}

#[derive(Serialize)]
struct CouncilRequest<'a> {
    persona: &'a str,
    question: &'a str,
    options: &'a [String],
    context: &'a str,
}

#[derive(Deserialize)]
struct CouncilResponse {
    option_index: u8,
    confidence: f64,
    rationale: Option<String>,
}

#[derive(Deserialize)]
struct NewsResponse {
    summary: String,
}

impl AiCouncilAdapter {
    pub fn new(
        council_url: Option<String>,
        api_key: Option<String>,
        news_api_url: Option<String>,
        attestation_secret: String,
        max_attempts: u32,
    ) -> Self {
        AiCouncilAdapter {
            http: reqwest::Client::new(),
            council_url,
            api_key,
            news_api_url,
            attestation_secret,
            max_attempts: max_attempts.max(1),
        }
    }

    async fn fetch_news_context(&self, topic: &str) -> String {
        let Some(news_url) = &self.news_api_url else {
            return String::new();
        };
        let url = format!("{news_url}?q={topic}");
        match self.http.get(&url).send().await {
            Ok(resp) => match resp.json::<NewsResponse>().await {
                Ok(parsed) => parsed.summary,
                Err(e) => {
                    debug!(error = %e, "news context decode failed");
                    String::new()
                }
            },
            Err(e) => {
                debug!(error = %e, "news context fetch failed");
                String::new()
            }
        }
    }

    async fn poll_persona(
        &self,
        council_url: &str,
        persona: &str,
        market: &Market,
        context: &str,
    ) -> Option<CouncilResponse> {
        let req = self.http.post(council_url).json(&CouncilRequest {
            persona,
            question: &market.question,
            options: &market.options,
            context,
        });
        let req = match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        };
        match req.send().await {
            Ok(resp) => match resp.json::<CouncilResponse>().await {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    debug!(persona, error = %e, "ai council response decode failed");
                    None
                }
            },
            Err(e) => {
                debug!(persona, error = %e, "ai council request failed");
                None
            }
        }
    }
}

#[async_trait]
impl OracleAdapter for AiCouncilAdapter {
    async fn can_resolve(&self, market: &Market) -> bool {
        self.council_url.is_some()
            && market.ai_attempt_count < self.max_attempts
            && (market.status == MarketStatus::Active || market.status == MarketStatus::Closed)
    }

    async fn fetch_result(&self, market: &Market) -> EngineResult<Option<OracleResult>> {
        let Some(council_url) = &self.council_url else {
            return Ok(None);
        };

        let context = self.fetch_news_context(&market.pair_or_topic).await;

        let mut votes = Vec::with_capacity(PERSONAS.len());
        for persona in PERSONAS {
            if let Some(vote) = self.poll_persona(council_url, persona, market, &context).await {
                votes.push((persona, vote));
            }
        }

        if votes.len() < PERSONAS.len() {
            debug!(responded = votes.len(), "ai council incomplete response set");
            return Ok(None);
        }

        let mut tally: std::collections::HashMap<u8, usize> = std::collections::HashMap::new();
        for (_, vote) in &votes {
            *tally.entry(vote.option_index).or_insert(0) += 1;
        }
        let Some((&winning_option, &count)) = tally.iter().max_by_key(|(_, c)| **c) else {
            return Ok(None);
        };
        if count < MAJORITY_THRESHOLD {
            debug!(count, "ai council failed to reach majority");
            return Ok(None);
        }

        let avg_confidence: f64 = votes
            .iter()
            .filter(|(_, v)| v.option_index == winning_option)
            .map(|(_, v)| v.confidence)
            .sum::<f64>()
            / count as f64;
        if avg_confidence < MIN_AVG_CONFIDENCE {
            debug!(avg_confidence, "ai council majority below confidence floor");
            return Ok(None);
        }

        let source_ts = crate::time::now();
        let mut attestations = Vec::with_capacity(votes.len());
        for (persona, vote) in &votes {
            let hash_input = format!(
                "ai_council:{persona}|{}|{:.8}|{}|{}|{}",
                market.pair_or_topic,
                vote.option_index as f64,
                0,
                0,
                crate::time::format_utc(source_ts)
            );
            let attestation_hash = sha256_hex(hash_input.as_bytes());
            attestations.push(OracleAttestation {
                market_id: market.id.clone(),
                source: format!("ai_council:{persona}"),
                pair: market.pair_or_topic.clone(),
                price: vote.option_index as f64,
                tick: None,
                epoch: None,
                source_ts,
                attestation_hash: attestation_hash.clone(),
                server_signature: hmac_sha256_hex(&self.attestation_secret, &attestation_hash),
            });
        }

        Ok(Some(OracleResult {
            winning_option,
            price: None,
            attestations,
            proof: json!({
                "source": "ai_council",
                "context": context,
                "votes": votes.iter().map(|(p, v)| json!({
                    "persona": p,
                    "option_index": v.option_index,
                    "confidence": v.confidence,
                    "rationale": v.rationale,
                })).collect::<Vec<_>>(),
                "avg_confidence": avg_confidence,
            }),
        }))
    }
}
