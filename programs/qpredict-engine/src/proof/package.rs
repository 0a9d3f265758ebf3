use super::{canonical_json, sha256_hex, verify_hmac_sha256};
use crate::market::payout::PayoutBreakdown;
use crate::state::{market::ResolutionSpec, Bet, ChainEntry, Market, OracleAttestation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionProofPackage {
    pub market_id: String,
    pub pair_or_topic: String,
    pub question: String,
    pub resolution: ResolutionSpec,
    pub close_date: chrono::DateTime<chrono::Utc>,
    pub end_date: chrono::DateTime<chrono::Utc>,
    pub min_bet_qu: i64,
    pub max_slots_per_option: u32,
    pub creator_address: String,
    pub option_count: usize,
    pub commitment_hash: String,
    pub winning_option: u8,
    pub resolution_price: Option<f64>,
    pub attestations: Vec<OracleAttestation>,
    pub payout: PayoutBreakdown,
    pub chain_entries: Vec<ChainEntry>,
    pub on_chain_txs: Vec<String>,
    pub proof_hash: String,
}

/// Aggregates everything needed to independently re-verify a market's
/// resolution: parameters + commitment, final winner, every oracle
/// attestation, the fee-broken-down payout summary, the chain subset for
/// the market and its bets, and on-chain tx ids (spec.md §4.7).
pub fn build_resolution_package(
    market: &Market,
    attestations: Vec<OracleAttestation>,
    payout: PayoutBreakdown,
    chain_entries: Vec<ChainEntry>,
    on_chain_txs: Vec<String>,
) -> ResolutionProofPackage {
    let winning_option = market.winning_option.unwrap_or(0);
    let mut package = ResolutionProofPackage {
        market_id: market.id.clone(),
        pair_or_topic: market.pair_or_topic.clone(),
        question: market.question.clone(),
        resolution: market.resolution.clone(),
        close_date: market.close_date,
        end_date: market.end_date,
        min_bet_qu: market.min_bet_qu,
        max_slots_per_option: market.max_slots_per_option,
        creator_address: market.creator_address.clone(),
        option_count: market.options.len(),
        commitment_hash: market.commitment_hash.clone(),
        winning_option,
        resolution_price: market.resolution_price,
        attestations,
        payout,
        chain_entries,
        on_chain_txs,
        proof_hash: String::new(),
    };
    package.proof_hash = hash_package(&package);
    package
}

/// `proof_hash` is the canonical hash of the package with the
/// `proof_hash` field itself removed — never hash a field that contains
/// its own hash.
fn hash_package(package: &ResolutionProofPackage) -> String {
    let mut value = serde_json::to_value(package).expect("package serializes");
    if let Value::Object(ref mut map) = value {
        map.remove("proof_hash");
    }
    sha256_hex(canonical_json(&value).as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageVerification {
    pub valid: bool,
    pub reasons: Vec<String>,
}

/// Independently recomputes the proof hash, the market commitment, each
/// attestation signature, the median price across attestations (if
/// multi-oracle), replays the winner rule, and re-verifies the chain
/// subset (spec.md §4.7).
pub fn verify_resolution_package(
    package: &ResolutionProofPackage,
    attestation_secret: &str,
) -> PackageVerification {
    let mut reasons = Vec::new();

    if hash_package(package) != package.proof_hash {
        reasons.push("proof_hash mismatch".to_string());
    }

    let recomputed_commitment = super::market_commitment(
        &package.pair_or_topic,
        &package.question,
        &package.resolution,
        package.close_date,
        package.end_date,
        package.min_bet_qu,
        package.max_slots_per_option,
        &package.creator_address,
    );
    if recomputed_commitment != package.commitment_hash {
        reasons.push("market commitment_hash does not match recomputed commitment".to_string());
    }

    for attestation in &package.attestations {
        if !verify_hmac_sha256(
            attestation_secret,
            &attestation.attestation_hash,
            &attestation.server_signature,
        ) {
            reasons.push(format!(
                "attestation signature invalid for source {}",
                attestation.source
            ));
        }
        let expected_hash = sha256_hex(
            format!(
                "{}|{}|{:.8}|{}|{}|{}",
                attestation.source,
                attestation.pair,
                attestation.price,
                attestation.tick.unwrap_or(0),
                attestation.epoch.unwrap_or(0),
                crate::time::format_utc(attestation.source_ts),
            )
            .as_bytes(),
        );
        if expected_hash != attestation.attestation_hash {
            reasons.push(format!(
                "attestation hash mismatch for source {}",
                attestation.source
            ));
        }
    }

    if package.attestations.len() > 1 {
        let mut prices: Vec<f64> = package.attestations.iter().map(|a| a.price).collect();
        prices.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = prices[prices.len() / 2];
        if let Some(resolution_price) = package.resolution_price {
            if (median - resolution_price).abs() > f64::EPSILON * median.abs().max(1.0) {
                reasons.push("median price does not match resolution_price".to_string());
            }
        }
    }

    let replayed_winner = crate::market::winner::determine_winner_with_options(
        &package.resolution,
        package.resolution_price,
        None,
        package.option_count,
    );
    if replayed_winner != Some(package.winning_option) {
        reasons.push("winner rule replay disagrees with recorded winning_option".to_string());
    }

    let chain_check = super::verify_chain_sequence(&package.chain_entries);
    if !chain_check.valid {
        reasons.push(format!(
            "chain subset invalid at sequence {:?}",
            chain_check.broken_at
        ));
    }

    PackageVerification {
        valid: reasons.is_empty(),
        reasons,
    }
}

pub fn payout_summary_json(payout: &PayoutBreakdown) -> Value {
    json!({
        "winner_stake": payout.winner_stake,
        "loser_pool": payout.loser_pool,
        "burn": payout.burn,
        "shareholder": payout.shareholder,
        "operator": payout.operator,
        "oracle": payout.oracle,
        "winner_pool": payout.winner_pool,
        "per_slot": payout.per_slot,
    })
}

pub fn bet_in_package(bet: &Bet) -> Value {
    json!({
        "id": bet.id,
        "option": bet.option,
        "slots": bet.slots,
        "status": bet.status.as_str(),
        "payout_qu": bet.payout_qu,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::payout::compute_payout;
    use crate::state::market::{MarketStatus, MarketType, Provenance, ResolutionType};
    use chrono::{Duration, Utc};

    fn sample_market() -> Market {
        let now = Utc::now();
        let close_date = now - Duration::hours(1);
        let end_date = now - Duration::minutes(1);
        let resolution = ResolutionSpec {
            kind: ResolutionType::Above,
            target: 100_000.0,
            target_high: None,
        };
        let commitment_hash = crate::proof::market_commitment(
            "BTC/USD",
            "Will BTC close above 100k?",
            &resolution,
            close_date,
            end_date,
            10_000,
            10,
            "CREATORADDR",
        );
        Market {
            id: "mkt-pkg".to_string(),
            on_chain_bet_id: 0,
            pair_or_topic: "BTC/USD".to_string(),
            question: "Will BTC close above 100k?".to_string(),
            resolution,
            market_type: MarketType::Price,
            options: vec!["yes".to_string(), "no".to_string()],
            close_date,
            end_date,
            min_bet_qu: 10_000,
            max_slots_per_option: 10,
            total_pool: 40_000,
            slot_map: vec![2, 2],
            status: MarketStatus::Resolved,
            resolution_price: Some(105_000.0),
            winning_option: Some(0),
            creator_address: "CREATORADDR".to_string(),
            creation_tx: None,
            commitment_hash,
            oracle_addresses: vec![],
            oracle_fee_bps: 0,
            auto_refund_at: None,
            category: "crypto".to_string(),
            ai_attempt_count: 0,
            ai_resolution_proof: None,
            provenance: Provenance::default(),
            created_at: now,
        }
    }

    fn sample_attestation(market: &Market, secret: &str) -> OracleAttestation {
        let source_ts = crate::time::now();
        let hash_input = format!(
            "test-source|{}|{:.8}|{}|{}|{}",
            market.pair_or_topic,
            105_000.0,
            0,
            0,
            crate::time::format_utc(source_ts)
        );
        let attestation_hash = sha256_hex(hash_input.as_bytes());
        OracleAttestation {
            market_id: market.id.clone(),
            source: "test-source".to_string(),
            pair: market.pair_or_topic.clone(),
            price: 105_000.0,
            tick: None,
            epoch: None,
            source_ts,
            attestation_hash: attestation_hash.clone(),
            server_signature: crate::proof::hmac_sha256_hex(secret, &attestation_hash),
        }
    }

    #[test]
    fn build_then_verify_round_trip_succeeds() {
        let secret = "test-attestation-secret";
        let market = sample_market();
        let attestation = sample_attestation(&market, secret);
        let payout = compute_payout(40_000, 2, 4, 0).unwrap();

        let package = build_resolution_package(&market, vec![attestation], payout, vec![], vec![]);
        let verification = verify_resolution_package(&package, secret);

        assert!(verification.valid, "unexpected failure reasons: {:?}", verification.reasons);
    }

    #[test]
    fn verify_detects_tampered_commitment() {
        let secret = "test-attestation-secret";
        let market = sample_market();
        let attestation = sample_attestation(&market, secret);
        let payout = compute_payout(40_000, 2, 4, 0).unwrap();

        let mut package = build_resolution_package(&market, vec![attestation], payout, vec![], vec![]);
        package.question = "a different question entirely".to_string();

        let verification = verify_resolution_package(&package, secret);

        assert!(!verification.valid);
        assert!(verification
            .reasons
            .iter()
            .any(|r| r.contains("commitment_hash does not match")));
    }

    #[test]
    fn verify_detects_winner_replay_mismatch_for_bracket_market() {
        let secret = "test-attestation-secret";
        let mut market = sample_market();
        market.resolution = ResolutionSpec {
            kind: ResolutionType::Bracket,
            target: 0.0,
            target_high: Some(100.0),
        };
        market.options = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        market.resolution_price = Some(60.0); // falls in bracket index 2 of 4
        market.winning_option = Some(0); // wrong on purpose
        market.commitment_hash = crate::proof::market_commitment(
            &market.pair_or_topic,
            &market.question,
            &market.resolution,
            market.close_date,
            market.end_date,
            market.min_bet_qu,
            market.max_slots_per_option,
            &market.creator_address,
        );

        let payout = compute_payout(40_000, 2, 4, 0).unwrap();
        let package = build_resolution_package(&market, vec![], payout, vec![], vec![]);
        let verification = verify_resolution_package(&package, secret);

        assert!(!verification.valid);
        assert!(verification
            .reasons
            .iter()
            .any(|r| r.contains("winner rule replay")));
    }
}
