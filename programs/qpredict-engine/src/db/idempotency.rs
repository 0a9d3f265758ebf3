//! Idempotency-key storage for externally-triggered operations (bet
//! placement, market creation) so a retried client request replays the
//! original response instead of creating a duplicate entity. Swept after
//! 24 hours (spec.md §4.1).

use crate::errors::EngineResult;
use crate::time::format_utc;
use rusqlite::{params, Connection, OptionalExtension};

pub fn get(conn: &Connection, key: &str) -> EngineResult<Option<String>> {
    conn.query_row(
        "SELECT response_json FROM idempotency_keys WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(crate::errors::EngineError::from)
}

pub fn put(conn: &Connection, key: &str, response_json: &str) -> EngineResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO idempotency_keys (key, response_json, created_at) VALUES (?1, ?2, ?3)",
        params![key, response_json, format_utc(crate::time::now())],
    )?;
    Ok(())
}

pub fn sweep_expired(conn: &Connection, older_than: chrono::DateTime<chrono::Utc>) -> EngineResult<usize> {
    let removed = conn.execute(
        "DELETE FROM idempotency_keys WHERE created_at < ?1",
        params![format_utc(older_than)],
    )?;
    Ok(removed)
}
