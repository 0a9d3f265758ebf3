//! Single-instance cron lock (spec.md §4.4): exactly one orchestrator
//! process may hold the lock named `"cron"` at a time. A lock older than
//! its TTL is considered abandoned (a previous process crashed without
//! releasing it) and can be stolen.

use crate::errors::{EngineError, EngineResult};
use crate::time::format_utc;
use rusqlite::{params, Connection, OptionalExtension};

const LOCK_NAME: &str = "cron";

/// Attempts to acquire the lock for `holder_id`, valid until `expires_at`.
/// Succeeds if no lock row exists, or the existing one has already
/// expired. Returns `false` if another holder's lock is still live.
pub fn acquire(conn: &Connection, holder_id: &str, expires_at: chrono::DateTime<chrono::Utc>) -> EngineResult<bool> {
    let now = format_utc(crate::time::now());
    let changed = conn.execute(
        "INSERT INTO cron_locks (name, holder_id, expires_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET holder_id = excluded.holder_id, expires_at = excluded.expires_at
         WHERE cron_locks.expires_at < ?4",
        params![LOCK_NAME, holder_id, format_utc(expires_at), now],
    )?;
    Ok(changed == 1)
}

/// Releases the lock iff `holder_id` still holds it, so a process that
/// lost the lock to expiry (and another holder already reacquired it)
/// can't release someone else's lock out from under them.
pub fn release(conn: &Connection, holder_id: &str) -> EngineResult<()> {
    conn.execute(
        "DELETE FROM cron_locks WHERE name = ?1 AND holder_id = ?2",
        params![LOCK_NAME, holder_id],
    )?;
    Ok(())
}

pub fn current_holder(conn: &Connection) -> EngineResult<Option<String>> {
    conn.query_row(
        "SELECT holder_id FROM cron_locks WHERE name = ?1",
        params![LOCK_NAME],
        |row| row.get(0),
    )
    .optional()
    .map_err(EngineError::from)
}
