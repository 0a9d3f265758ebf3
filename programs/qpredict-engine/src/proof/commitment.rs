use super::{canonical_json, sha256_hex};
use crate::state::market::ResolutionSpec;
use chrono::{DateTime, Utc};
use serde_json::json;

/// `SHA256("{market_id}|{user}|{option}|{slots}|{nonce}")` (spec.md §4.7).
pub fn bet_commitment(market_id: &str, user: &str, option: u8, slots: u32, nonce_hex: &str) -> String {
    let payload = format!("{market_id}|{user}|{option}|{slots}|{nonce_hex}");
    sha256_hex(payload.as_bytes())
}

/// `SHA256(canonical_json({pair, question, resolution_type, target,
/// target_high, close, end, min_bet, max_slots, creator}))` (spec.md §4.7).
#[allow(clippy::too_many_arguments)]
pub fn market_commitment(
    pair: &str,
    question: &str,
    resolution: &ResolutionSpec,
    close: DateTime<Utc>,
    end: DateTime<Utc>,
    min_bet: i64,
    max_slots: u32,
    creator: &str,
) -> String {
    let value = json!({
        "pair": pair,
        "question": question,
        "resolution_type": resolution.kind.as_str(),
        "target": resolution.target,
        "target_high": resolution.target_high,
        "close": crate::time::format_utc(close),
        "end": crate::time::format_utc(end),
        "min_bet": min_bet,
        "max_slots": max_slots,
        "creator": creator,
    });
    sha256_hex(canonical_json(&value).as_bytes())
}

pub fn random_nonce_hex() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
