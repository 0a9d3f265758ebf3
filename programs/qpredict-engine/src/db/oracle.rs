use crate::errors::EngineResult;
use crate::state::oracle::OracleAttestation;
use crate::time::{format_utc, parse_utc};
use rusqlite::{params, Connection, Row};

fn row_to_attestation(row: &Row) -> rusqlite::Result<OracleAttestation> {
    let source_ts: String = row.get("source_ts")?;
    Ok(OracleAttestation {
        market_id: row.get("market_id")?,
        source: row.get("source")?,
        pair: row.get("pair")?,
        price: row.get("price")?,
        tick: row.get::<_, Option<i64>>("tick")?.map(|v| v as u32),
        epoch: row.get::<_, Option<i64>>("epoch")?.map(|v| v as u32),
        source_ts: parse_utc(&source_ts).unwrap_or_else(crate::time::now),
        attestation_hash: row.get("attestation_hash")?,
        server_signature: row.get("server_signature")?,
    })
}

pub fn insert_attestation(conn: &Connection, attestation: &OracleAttestation) -> EngineResult<i64> {
    conn.execute(
        "INSERT INTO oracle_attestations
            (market_id, source, pair, price, tick, epoch, source_ts, attestation_hash, server_signature)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            attestation.market_id,
            attestation.source,
            attestation.pair,
            attestation.price,
            attestation.tick,
            attestation.epoch,
            format_utc(attestation.source_ts),
            attestation.attestation_hash,
            attestation.server_signature,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_for_market(conn: &Connection, market_id: &str) -> EngineResult<Vec<OracleAttestation>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM oracle_attestations WHERE market_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![market_id], row_to_attestation)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
