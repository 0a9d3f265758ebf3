use crate::errors::{EngineError, EngineResult};
use crate::state::market::{Market, MarketStatus, MarketType, Provenance, ResolutionSpec};
use crate::time::{format_utc, parse_utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn row_to_market(row: &Row) -> rusqlite::Result<Market> {
    let resolution_json: String = row.get("resolution_json")?;
    let options_json: String = row.get("options_json")?;
    let slot_map_json: String = row.get("slot_map_json")?;
    let oracle_addresses_json: String = row.get("oracle_addresses_json")?;
    let provenance_json: String = row.get("provenance_json")?;
    let ai_proof_json: Option<String> = row.get("ai_resolution_proof_json")?;
    let status: String = row.get("status")?;
    let market_type: String = row.get("market_type")?;
    let close_date: String = row.get("close_date")?;
    let end_date: String = row.get("end_date")?;
    let auto_refund_at: Option<String> = row.get("auto_refund_at")?;
    let created_at: String = row.get("created_at")?;
    let winning_option: Option<i64> = row.get("winning_option")?;

    Ok(Market {
        id: row.get("id")?,
        on_chain_bet_id: row.get::<_, i64>("on_chain_bet_id")? as u32,
        pair_or_topic: row.get("pair_or_topic")?,
        question: row.get("question")?,
        resolution: serde_json::from_str::<ResolutionSpec>(&resolution_json)
            .unwrap_or(ResolutionSpec {
                kind: crate::state::market::ResolutionType::Above,
                target: 0.0,
                target_high: None,
            }),
        market_type: MarketType::parse(&market_type).unwrap_or(MarketType::Custom),
        options: serde_json::from_str(&options_json).unwrap_or_default(),
        close_date: parse_utc(&close_date).unwrap_or_else(crate::time::now),
        end_date: parse_utc(&end_date).unwrap_or_else(crate::time::now),
        min_bet_qu: row.get("min_bet_qu")?,
        max_slots_per_option: row.get::<_, i64>("max_slots_per_option")? as u32,
        total_pool: row.get("total_pool")?,
        slot_map: serde_json::from_str(&slot_map_json).unwrap_or_default(),
        status: MarketStatus::parse(&status).unwrap_or(MarketStatus::Draft),
        resolution_price: row.get("resolution_price")?,
        winning_option: winning_option.map(|v| v as u8),
        creator_address: row.get("creator_address")?,
        creation_tx: row.get("creation_tx")?,
        commitment_hash: row.get("commitment_hash")?,
        oracle_addresses: serde_json::from_str(&oracle_addresses_json).unwrap_or_default(),
        oracle_fee_bps: row.get::<_, i64>("oracle_fee_bps")? as u32,
        auto_refund_at: auto_refund_at.and_then(|s| parse_utc(&s)),
        category: row.get("category")?,
        ai_attempt_count: row.get::<_, i64>("ai_attempt_count")? as u32,
        ai_resolution_proof: ai_proof_json.and_then(|s| serde_json::from_str(&s).ok()),
        provenance: serde_json::from_str::<Provenance>(&provenance_json).unwrap_or(Provenance {
            user: None,
            ai_parsed: false,
            trending_agent: false,
        }),
        created_at: parse_utc(&created_at).unwrap_or_else(crate::time::now),
    })
}

pub fn insert_market(conn: &Connection, market: &Market) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO markets (
            id, on_chain_bet_id, pair_or_topic, question, resolution_json, market_type,
            options_json, close_date, end_date, min_bet_qu, max_slots_per_option,
            total_pool, slot_map_json, status, resolution_price, winning_option,
            creator_address, creation_tx, commitment_hash, oracle_addresses_json,
            oracle_fee_bps, auto_refund_at, category, ai_attempt_count,
            ai_resolution_proof_json, provenance_json, created_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26,?27)",
        params![
            market.id,
            market.on_chain_bet_id,
            market.pair_or_topic,
            market.question,
            serde_json::to_string(&market.resolution)?,
            market.market_type.as_str(),
            serde_json::to_string(&market.options)?,
            format_utc(market.close_date),
            format_utc(market.end_date),
            market.min_bet_qu,
            market.max_slots_per_option,
            market.total_pool,
            serde_json::to_string(&market.slot_map)?,
            market.status.as_str(),
            market.resolution_price,
            market.winning_option.map(|v| v as i64),
            market.creator_address,
            market.creation_tx,
            market.commitment_hash,
            serde_json::to_string(&market.oracle_addresses)?,
            market.oracle_fee_bps,
            market.auto_refund_at.map(format_utc),
            market.category,
            market.ai_attempt_count,
            market.ai_resolution_proof.as_ref().map(|v| v.to_string()),
            serde_json::to_string(&market.provenance)?,
            format_utc(market.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_market(conn: &Connection, id: &str) -> EngineResult<Option<Market>> {
    conn.query_row("SELECT * FROM markets WHERE id = ?1", params![id], row_to_market)
        .optional()
        .map_err(EngineError::from)
}

pub fn list_markets_by_status(conn: &Connection, status: MarketStatus) -> EngineResult<Vec<Market>> {
    let mut stmt = conn.prepare("SELECT * FROM markets WHERE status = ?1")?;
    let rows = stmt
        .query_map(params![status.as_str()], row_to_market)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_markets_any_status(conn: &Connection, statuses: &[MarketStatus]) -> EngineResult<Vec<Market>> {
    let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT * FROM markets WHERE status IN ({placeholders})");
    let mut stmt = conn.prepare(&sql)?;
    let owned: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    let refs: Vec<&dyn rusqlite::ToSql> = owned.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    let rows = stmt
        .query_map(refs.as_slice(), row_to_market)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_status(conn: &Connection, id: &str, status: MarketStatus) -> EngineResult<()> {
    conn.execute(
        "UPDATE markets SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(())
}

pub fn set_on_chain_bet_id(conn: &Connection, id: &str, bet_id: u32) -> EngineResult<()> {
    conn.execute(
        "UPDATE markets SET on_chain_bet_id = ?1 WHERE id = ?2",
        params![bet_id, id],
    )?;
    Ok(())
}

pub fn set_creation_tx(conn: &Connection, id: &str, creation_tx: &str) -> EngineResult<()> {
    conn.execute(
        "UPDATE markets SET creation_tx = ?1 WHERE id = ?2",
        params![creation_tx, id],
    )?;
    Ok(())
}

/// Markets still awaiting bet-id discovery: undiscovered (`on_chain_bet_id
/// = 0`) and in a status where discovery still matters (spec.md §4.3
/// phase 0c, §4.9 stuck-market escalation).
pub fn list_markets_with_zero_bet_id(conn: &Connection, statuses: &[MarketStatus]) -> EngineResult<Vec<Market>> {
    let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT * FROM markets WHERE on_chain_bet_id = 0 AND status IN ({placeholders})");
    let mut stmt = conn.prepare(&sql)?;
    let owned: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    let refs: Vec<&dyn rusqlite::ToSql> = owned.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    let rows = stmt
        .query_map(refs.as_slice(), row_to_market)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Markets with a live `auto_refund_at` fallback (`custom`/`ai` markets,
/// spec.md §6) that has come due while the market is still stuck in an
/// eligible status — the creator/AI-council resolution path never fired.
pub fn list_markets_with_expired_auto_refund(
    conn: &Connection,
    now: chrono::DateTime<chrono::Utc>,
    statuses: &[MarketStatus],
) -> EngineResult<Vec<Market>> {
    let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT * FROM markets WHERE auto_refund_at IS NOT NULL AND auto_refund_at <= ?1 AND status IN ({placeholders})"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut refs: Vec<&dyn rusqlite::ToSql> = vec![];
    let now_str = format_utc(now);
    refs.push(&now_str);
    let owned: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    refs.extend(owned.iter().map(|s| s as &dyn rusqlite::ToSql));
    let rows = stmt
        .query_map(refs.as_slice(), row_to_market)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn bump_ai_attempt_count(conn: &Connection, id: &str) -> EngineResult<u32> {
    conn.execute(
        "UPDATE markets SET ai_attempt_count = ai_attempt_count + 1 WHERE id = ?1",
        params![id],
    )?;
    let count: i64 = conn.query_row(
        "SELECT ai_attempt_count FROM markets WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    Ok(count as u32)
}

/// Atomically sets `(pool, slot_map)` as an absolute value (not a delta)
/// — used by the slot/commitment repair pass (spec.md §4.9) and by
/// resolution, which shadow-overrides the cached aggregates with the
/// recomputed truth.
pub fn set_pool_and_slots(conn: &Connection, id: &str, pool: i64, slot_map: &[u32]) -> EngineResult<()> {
    conn.execute(
        "UPDATE markets SET total_pool = ?1, slot_map_json = ?2 WHERE id = ?3",
        params![pool, serde_json::to_string(slot_map)?, id],
    )?;
    Ok(())
}

pub fn set_commitment_hash(conn: &Connection, id: &str, hash: &str) -> EngineResult<()> {
    conn.execute(
        "UPDATE markets SET commitment_hash = ?1 WHERE id = ?2",
        params![hash, id],
    )?;
    Ok(())
}

/// `{active, closed} -> resolving` atomically; returns whether this
/// caller won the claim (spec.md §4.1).
pub fn try_claim_market_for_resolution(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE markets SET status = 'resolving'
         WHERE id = ?1 AND status IN ('active', 'closed')",
        params![id],
    )?;
    Ok(changed == 1)
}

pub fn set_resolution(
    conn: &Connection,
    id: &str,
    winning_option: u8,
    resolution_price: Option<f64>,
) -> EngineResult<()> {
    conn.execute(
        "UPDATE markets SET status = 'resolved', winning_option = ?1, resolution_price = ?2 WHERE id = ?3",
        params![winning_option as i64, resolution_price, id],
    )?;
    Ok(())
}

pub fn set_cancelled(conn: &Connection, id: &str) -> EngineResult<()> {
    conn.execute(
        "UPDATE markets SET status = 'cancelled' WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

pub fn set_ai_resolution_proof(conn: &Connection, id: &str, proof: &serde_json::Value) -> EngineResult<()> {
    conn.execute(
        "UPDATE markets SET ai_resolution_proof_json = ?1 WHERE id = ?2",
        params![proof.to_string(), id],
    )?;
    Ok(())
}
