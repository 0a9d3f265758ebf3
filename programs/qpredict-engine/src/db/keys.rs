use crate::errors::{EngineError, EngineResult};
use crate::state::escrow_key::{EscrowKey, KeyStatus};
use crate::vault::random_hex;
use rusqlite::{params, Connection, OptionalExtension, Row};

fn row_to_key(row: &Row) -> rusqlite::Result<EscrowKey> {
    let status: String = row.get("status")?;
    Ok(EscrowKey {
        escrow_id: row.get("escrow_id")?,
        ciphertext_hex: row.get("ciphertext_hex")?,
        iv_hex: row.get("iv_hex")?,
        tag_hex: row.get("tag_hex")?,
        status: KeyStatus::parse(&status).unwrap_or(KeyStatus::Active),
    })
}

pub fn insert_key(conn: &Connection, key: &EscrowKey) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO escrow_keys (escrow_id, ciphertext_hex, iv_hex, tag_hex, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            key.escrow_id,
            key.ciphertext_hex,
            key.iv_hex,
            key.tag_hex,
            key.status.as_str()
        ],
    )?;
    Ok(())
}

pub fn get_key(conn: &Connection, escrow_id: &str) -> EngineResult<Option<EscrowKey>> {
    conn.query_row(
        "SELECT * FROM escrow_keys WHERE escrow_id = ?1",
        params![escrow_id],
        row_to_key,
    )
    .optional()
    .map_err(EngineError::from)
}

pub fn mark_swept(conn: &Connection, escrow_id: &str) -> EngineResult<()> {
    conn.execute(
        "UPDATE escrow_keys SET status = 'swept' WHERE escrow_id = ?1",
        params![escrow_id],
    )?;
    Ok(())
}

/// Archives a key by overwriting `{ciphertext, iv, tag}` in place with
/// fresh random bytes of equal length, in the same write that flips
/// `status` to `archived` (spec.md §4.8). There is no separate "archived
/// but bytes intact" state the original material can be recovered from —
/// the overwrite and the status flip are one statement.
pub fn archive_key(conn: &Connection, escrow_id: &str) -> EngineResult<()> {
    let existing = get_key(conn, escrow_id)?.ok_or_else(|| {
        EngineError::NotFound(format!("escrow key for {escrow_id}"))
    })?;
    let ciphertext_len = existing.ciphertext_hex.len() / 2;
    let iv_len = existing.iv_hex.len() / 2;
    let tag_len = existing.tag_hex.len() / 2;

    conn.execute(
        "UPDATE escrow_keys SET ciphertext_hex = ?1, iv_hex = ?2, tag_hex = ?3, status = 'archived'
         WHERE escrow_id = ?4",
        params![
            random_hex(ciphertext_len),
            random_hex(iv_len),
            random_hex(tag_len),
            escrow_id
        ],
    )?;
    Ok(())
}
