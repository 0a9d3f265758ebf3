//! Single-use `(address, endpoint)` nonces, guarding against replayed RPC
//! calls across restarts. Rows older than 24 hours are swept so the table
//! doesn't grow unbounded (spec.md §4.1).

use crate::errors::EngineResult;
use crate::time::format_utc;
use rusqlite::{params, Connection};

/// Inserts the nonce iff it hasn't been used before; returns `false` if
/// it already exists (the call is a replay).
pub fn claim(conn: &Connection, address: &str, endpoint: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO nonces (address, endpoint, created_at) VALUES (?1, ?2, ?3)",
        params![address, endpoint, format_utc(crate::time::now())],
    )?;
    Ok(changed == 1)
}

pub fn sweep_expired(conn: &Connection, older_than: chrono::DateTime<chrono::Utc>) -> EngineResult<usize> {
    let removed = conn.execute(
        "DELETE FROM nonces WHERE created_at < ?1",
        params![format_utc(older_than)],
    )?;
    Ok(removed)
}
