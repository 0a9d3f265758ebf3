use crate::errors::{EngineError, EngineResult};
use crate::state::solvency::SolvencyProof;
use crate::time::format_utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

fn row_to_proof(row: &Row) -> rusqlite::Result<SolvencyProof> {
    let leaves_json: String = row.get("leaves_json")?;
    Ok(SolvencyProof {
        merkle_root: row.get("merkle_root")?,
        total_user_balance: row.get("total_user_balance")?,
        on_chain_balance: row.get("on_chain_balance")?,
        is_solvent: row.get::<_, i64>("is_solvent")? != 0,
        account_count: row.get::<_, i64>("account_count")? as u64,
        tick: row.get::<_, i64>("tick")? as u32,
        epoch: row.get::<_, i64>("epoch")? as u32,
        leaves: serde_json::from_str(&leaves_json).unwrap_or_default(),
    })
}

pub fn insert_proof(conn: &Connection, proof: &SolvencyProof) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO solvency_proofs
            (merkle_root, total_user_balance, on_chain_balance, is_solvent, account_count, tick, epoch, leaves_json, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            proof.merkle_root,
            proof.total_user_balance,
            proof.on_chain_balance,
            proof.is_solvent as i64,
            proof.account_count as i64,
            proof.tick,
            proof.epoch,
            serde_json::to_string(&proof.leaves)?,
            format_utc(crate::time::now()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn latest_proof(conn: &Connection) -> EngineResult<Option<SolvencyProof>> {
    conn.query_row(
        "SELECT * FROM solvency_proofs ORDER BY id DESC LIMIT 1",
        [],
        row_to_proof,
    )
    .optional()
    .map_err(EngineError::from)
}
