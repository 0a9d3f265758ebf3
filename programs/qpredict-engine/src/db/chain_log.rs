//! Database-facing queries over the commitment chain table. The
//! append/verify logic itself lives in `crate::proof::chain`; this module
//! only knows how to fetch rows back out for audit and proof-package
//! assembly (spec.md §4.7).

use crate::errors::EngineResult;
use crate::state::chain_log::{ChainEntry, EventType};
use rusqlite::{params, Connection, Row};

fn row_to_entry(row: &Row) -> rusqlite::Result<ChainEntry> {
    let event_type: String = row.get("event_type")?;
    Ok(ChainEntry {
        sequence_num: row.get("sequence_num")?,
        event_type: EventType::parse(&event_type).unwrap_or(EventType::MarketCreate),
        entity_id: row.get("entity_id")?,
        payload_json: row.get("payload_json")?,
        payload_hash: row.get("payload_hash")?,
        prev_hash: row.get("prev_hash")?,
        chain_hash: row.get("chain_hash")?,
    })
}

pub fn entries_for_entity(conn: &Connection, entity_id: &str) -> EngineResult<Vec<ChainEntry>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM commitment_chain WHERE entity_id = ?1 ORDER BY sequence_num ASC",
    )?;
    let rows = stmt
        .query_map(params![entity_id], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn entries_in_range(conn: &Connection, from_seq: i64, to_seq: i64) -> EngineResult<Vec<ChainEntry>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM commitment_chain WHERE sequence_num BETWEEN ?1 AND ?2 ORDER BY sequence_num ASC",
    )?;
    let rows = stmt
        .query_map(params![from_seq, to_seq], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn latest_sequence(conn: &Connection) -> EngineResult<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(sequence_num), 0) FROM commitment_chain",
        [],
        |r| r.get(0),
    )
    .map_err(crate::errors::EngineError::from)
}

pub fn all_entries(conn: &Connection) -> EngineResult<Vec<ChainEntry>> {
    let mut stmt = conn.prepare("SELECT * FROM commitment_chain ORDER BY sequence_num ASC")?;
    let rows = stmt
        .query_map([], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
