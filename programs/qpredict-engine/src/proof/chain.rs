use super::{canonical_json, sha256_hex};
use crate::errors::EngineResult;
use crate::state::chain_log::{genesis_hash, ChainEntry, EventType};
use rusqlite::{params, Connection};
use serde_json::Value;

/// Appends one row to the commitment chain inside the caller's
/// transaction/connection. Single writer, so no extra locking is needed
/// beyond the one the persistence layer already provides for the whole
/// connection (spec.md §4.7 step list).
pub fn append_entry(
    conn: &Connection,
    event_type: EventType,
    entity_id: &str,
    payload: &Value,
) -> EngineResult<ChainEntry> {
    let (latest_seq, latest_hash): (i64, Option<String>) = conn
        .query_row(
            "SELECT sequence_num, chain_hash FROM commitment_chain ORDER BY sequence_num DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok((0, None)),
            other => Err(other),
        })?;

    let seq = latest_seq + 1;
    let prev_hash = latest_hash.unwrap_or_else(genesis_hash);
    let payload_json = canonical_json(payload);
    let payload_hash = sha256_hex(payload_json.as_bytes());
    let chain_hash = sha256_hex(
        format!(
            "{seq}|{}|{entity_id}|{payload_hash}|{prev_hash}",
            event_type.as_str()
        )
        .as_bytes(),
    );

    conn.execute(
        "INSERT INTO commitment_chain
            (sequence_num, event_type, entity_id, payload_json, payload_hash, prev_hash, chain_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            seq,
            event_type.as_str(),
            entity_id,
            payload_json,
            payload_hash,
            prev_hash,
            chain_hash
        ],
    )?;

    Ok(ChainEntry {
        sequence_num: seq,
        event_type,
        entity_id: entity_id.to_string(),
        payload_json,
        payload_hash,
        prev_hash,
        chain_hash,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub valid: bool,
    pub broken_at: Option<i64>,
}

/// Verifies a (possibly non-contiguous) slice of chain rows. Every row
/// must recompute its own `payload_hash`/`chain_hash`; consecutive rows
/// (`seq_{i+1} == seq_i + 1`) additionally must satisfy
/// `prev_hash_{i+1} == chain_hash_i`. Non-consecutive slices (entity
/// filters) are not required to chain across the gap (spec.md §4.7).
pub fn verify_chain_sequence(entries: &[ChainEntry]) -> ChainVerification {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| e.sequence_num);

    for entry in &sorted {
        let expected_payload_hash = sha256_hex(entry.payload_json.as_bytes());
        if expected_payload_hash != entry.payload_hash {
            return ChainVerification {
                valid: false,
                broken_at: Some(entry.sequence_num),
            };
        }
        let expected_chain_hash = sha256_hex(
            format!(
                "{}|{}|{}|{}|{}",
                entry.sequence_num,
                entry.event_type.as_str(),
                entry.entity_id,
                entry.payload_hash,
                entry.prev_hash
            )
            .as_bytes(),
        );
        if expected_chain_hash != entry.chain_hash {
            return ChainVerification {
                valid: false,
                broken_at: Some(entry.sequence_num),
            };
        }
    }

    for pair in sorted.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.sequence_num == prev.sequence_num + 1 && next.prev_hash != prev.chain_hash {
            return ChainVerification {
                valid: false,
                broken_at: Some(next.sequence_num),
            };
        }
    }

    ChainVerification {
        valid: true,
        broken_at: None,
    }
}
