use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single HMAC-signed price/outcome observation (spec.md §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleAttestation {
    pub market_id: String,
    pub source: String,
    pub pair: String,
    pub price: f64,
    pub tick: Option<u32>,
    pub epoch: Option<u32>,
    pub source_ts: DateTime<Utc>,
    pub attestation_hash: String,
    pub server_signature: String,
}
