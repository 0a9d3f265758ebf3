use crate::errors::EngineResult;
use crate::state::ledger::{LedgerTransaction, TransactionType};
use crate::time::{format_utc, parse_utc};
use rusqlite::{params, Connection, Row};

fn row_to_tx(row: &Row) -> rusqlite::Result<LedgerTransaction> {
    let kind: String = row.get("kind")?;
    let created_at: String = row.get("created_at")?;
    Ok(LedgerTransaction {
        id: row.get("id")?,
        address: row.get("address")?,
        kind: TransactionType::parse(&kind).unwrap_or(TransactionType::Deposit),
        amount_qu: row.get("amount_qu")?,
        tx_hash: row.get("tx_hash")?,
        market_id: row.get("market_id")?,
        status: row.get("status")?,
        created_at: parse_utc(&created_at).unwrap_or_else(crate::time::now),
    })
}

/// Appends one row. The ledger is never updated or deleted — corrections
/// are made with a new, opposite-signed entry (spec.md §3).
pub fn append(
    conn: &Connection,
    address: &str,
    kind: TransactionType,
    amount_qu: i64,
    tx_hash: Option<&str>,
    market_id: Option<&str>,
    status: &str,
) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO ledger_transactions (address, kind, amount_qu, tx_hash, market_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            address,
            kind.as_str(),
            amount_qu,
            tx_hash,
            market_id,
            status,
            format_utc(crate::time::now())
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_for_address(conn: &Connection, address: &str) -> EngineResult<Vec<LedgerTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM ledger_transactions WHERE address = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![address], row_to_tx)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_for_market(conn: &Connection, market_id: &str) -> EngineResult<Vec<LedgerTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM ledger_transactions WHERE market_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![market_id], row_to_tx)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
