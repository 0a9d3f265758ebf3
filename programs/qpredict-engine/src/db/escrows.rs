use crate::errors::{EngineError, EngineResult};
use crate::state::escrow::{Escrow, EscrowStatus};
use crate::time::{format_utc, parse_utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn row_to_escrow(row: &Row) -> rusqlite::Result<Escrow> {
    let status: String = row.get("status")?;
    let deposit_detected_at: Option<String> = row.get("deposit_detected_at")?;
    let payout_detected_at: Option<String> = row.get("payout_detected_at")?;
    let expires_at: String = row.get("expires_at")?;
    let created_at: String = row.get("created_at")?;
    Ok(Escrow {
        id: row.get("id")?,
        bet_id: row.get("bet_id")?,
        market_id: row.get("market_id")?,
        escrow_address: row.get("escrow_address")?,
        user_payout_address: row.get("user_payout_address")?,
        option: row.get::<_, i64>("option")? as u8,
        slots: row.get::<_, i64>("slots")? as u32,
        expected_amount_qu: row.get("expected_amount_qu")?,
        status: EscrowStatus::parse(&status).unwrap_or(EscrowStatus::AwaitingDeposit),
        deposit_detected_at: deposit_detected_at.and_then(|s| parse_utc(&s)),
        deposit_amount_qu: row.get("deposit_amount_qu")?,
        join_tx_id: row.get("join_tx_id")?,
        join_target_tick: row.get::<_, Option<i64>>("join_target_tick")?.map(|v| v as u32),
        payout_detected_at: payout_detected_at.and_then(|s| parse_utc(&s)),
        payout_amount_qu: row.get("payout_amount_qu")?,
        sweep_tx_id: row.get("sweep_tx_id")?,
        sweep_target_tick: row.get::<_, Option<i64>>("sweep_target_tick")?.map(|v| v as u32),
        join_retry_count: row.get::<_, i64>("join_retry_count")? as u32,
        expires_at: parse_utc(&expires_at).unwrap_or_else(crate::time::now),
        created_at: parse_utc(&created_at).unwrap_or_else(crate::time::now),
    })
}

pub fn insert_escrow(conn: &Connection, escrow: &Escrow) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO escrows (
            id, bet_id, market_id, escrow_address, user_payout_address, option, slots,
            expected_amount_qu, status, deposit_detected_at, deposit_amount_qu,
            join_tx_id, join_target_tick, payout_detected_at, payout_amount_qu,
            sweep_tx_id, sweep_target_tick, join_retry_count, expires_at, created_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
        params![
            escrow.id,
            escrow.bet_id,
            escrow.market_id,
            escrow.escrow_address,
            escrow.user_payout_address,
            escrow.option,
            escrow.slots,
            escrow.expected_amount_qu,
            escrow.status.as_str(),
            escrow.deposit_detected_at.map(format_utc),
            escrow.deposit_amount_qu,
            escrow.join_tx_id,
            escrow.join_target_tick,
            escrow.payout_detected_at.map(format_utc),
            escrow.payout_amount_qu,
            escrow.sweep_tx_id,
            escrow.sweep_target_tick,
            escrow.join_retry_count,
            format_utc(escrow.expires_at),
            format_utc(escrow.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_escrow(conn: &Connection, id: &str) -> EngineResult<Option<Escrow>> {
    conn.query_row("SELECT * FROM escrows WHERE id = ?1", params![id], row_to_escrow)
        .optional()
        .map_err(EngineError::from)
}

pub fn get_escrow_by_bet(conn: &Connection, bet_id: &str) -> EngineResult<Option<Escrow>> {
    conn.query_row(
        "SELECT * FROM escrows WHERE bet_id = ?1",
        params![bet_id],
        row_to_escrow,
    )
    .optional()
    .map_err(EngineError::from)
}

pub fn list_escrows_by_status(conn: &Connection, status: EscrowStatus) -> EngineResult<Vec<Escrow>> {
    let mut stmt = conn.prepare("SELECT * FROM escrows WHERE status = ?1")?;
    let rows = stmt
        .query_map(params![status.as_str()], row_to_escrow)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_escrows_for_market(conn: &Connection, market_id: &str) -> EngineResult<Vec<Escrow>> {
    let mut stmt = conn.prepare("SELECT * FROM escrows WHERE market_id = ?1")?;
    let rows = stmt
        .query_map(params![market_id], row_to_escrow)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `awaiting_deposit -> deposit_detected`, recording the observed amount.
pub fn mark_deposit_detected(
    conn: &Connection,
    id: &str,
    amount_qu: i64,
    detected_at: chrono::DateTime<chrono::Utc>,
) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE escrows SET status = 'deposit_detected', deposit_amount_qu = ?1, deposit_detected_at = ?2
         WHERE id = ?3 AND status = 'awaiting_deposit'",
        params![amount_qu, format_utc(detected_at), id],
    )?;
    Ok(changed == 1)
}

pub fn mark_joining(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE escrows SET status = 'joining_sc' WHERE id = ?1 AND status = 'deposit_detected'",
        params![id],
    )?;
    Ok(changed == 1)
}

pub fn set_join_tx(conn: &Connection, id: &str, join_tx_id: &str, target_tick: u32) -> EngineResult<()> {
    conn.execute(
        "UPDATE escrows SET join_tx_id = ?1, join_target_tick = ?2 WHERE id = ?3",
        params![join_tx_id, target_tick, id],
    )?;
    Ok(())
}

/// `joining_sc -> active_in_sc` once the join transaction is confirmed
/// on-chain at or past its target tick.
pub fn confirm_join_bet(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE escrows SET status = 'active_in_sc'
         WHERE id = ?1 AND status = 'joining_sc' AND join_tx_id IS NOT NULL",
        params![id],
    )?;
    Ok(changed == 1)
}

/// `joining_sc -> deposit_detected` when the join tx never lands (tick
/// window missed); bumps `join_retry_count` so the cron orchestrator can
/// give up after spec.md's retry ceiling.
pub fn revert_join_bet(conn: &Connection, id: &str) -> EngineResult<u32> {
    conn.execute(
        "UPDATE escrows SET status = 'deposit_detected', join_tx_id = NULL, join_target_tick = NULL,
            join_retry_count = join_retry_count + 1
         WHERE id = ?1 AND status = 'joining_sc'",
        params![id],
    )?;
    let count: i64 = conn.query_row(
        "SELECT join_retry_count FROM escrows WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    Ok(count as u32)
}

pub fn mark_lost(conn: &Connection, id: &str) -> EngineResult<()> {
    conn.execute(
        "UPDATE escrows SET status = 'lost' WHERE id = ?1 AND status = 'active_in_sc'",
        params![id],
    )?;
    Ok(())
}

/// `{active_in_sc, awaiting_deposit, deposit_detected, joining_sc} ->
/// won_awaiting_sweep`, recording the detected payout. The three
/// non-winning source states are the late-refund path (funds sat in
/// escrow, never joined the SC pool) and the retries-exhausted path
/// (spec.md §4.2) — both route through the same sweep machinery as a
/// genuine win, just without ever reaching `active_in_sc`.
pub fn mark_won_awaiting_sweep(
    conn: &Connection,
    id: &str,
    amount_qu: i64,
    detected_at: chrono::DateTime<chrono::Utc>,
) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE escrows SET status = 'won_awaiting_sweep', payout_amount_qu = ?1, payout_detected_at = ?2
         WHERE id = ?3 AND status IN ('active_in_sc', 'awaiting_deposit', 'deposit_detected', 'joining_sc')",
        params![amount_qu, format_utc(detected_at), id],
    )?;
    Ok(changed == 1)
}

/// Atomic claim: `won_awaiting_sweep -> sweeping` iff the row is
/// currently `won_awaiting_sweep`. This is the anti-double-sweep mutex —
/// two concurrent cron instances racing on the same escrow will only
/// ever see one `changed == 1` (spec.md §4.1).
pub fn claim_escrow_for_sweep(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE escrows SET status = 'sweeping' WHERE id = ?1 AND status = 'won_awaiting_sweep'",
        params![id],
    )?;
    Ok(changed == 1)
}

pub fn set_sweep_tx(conn: &Connection, id: &str, sweep_tx_id: &str, target_tick: u32) -> EngineResult<()> {
    conn.execute(
        "UPDATE escrows SET sweep_tx_id = ?1, sweep_target_tick = ?2 WHERE id = ?3",
        params![sweep_tx_id, target_tick, id],
    )?;
    Ok(())
}

/// `sweeping -> swept` iff `sweep_tx_id` was actually recorded. This SQL
/// guard is load-bearing: it is what prevents a bare status flip from
/// marking an escrow swept without a transaction id behind it.
pub fn confirm_sweep_complete(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE escrows SET status = 'swept'
         WHERE id = ?1 AND status = 'sweeping' AND sweep_tx_id IS NOT NULL AND sweep_tx_id <> ''",
        params![id],
    )?;
    Ok(changed == 1)
}

/// `sweeping -> won_awaiting_sweep` when the sweep transaction never
/// confirms, so the next cron pass retries it.
pub fn revert_sweep_claim(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE escrows SET status = 'won_awaiting_sweep', sweep_tx_id = NULL, sweep_target_tick = NULL
         WHERE id = ?1 AND status = 'sweeping'",
        params![id],
    )?;
    Ok(changed == 1)
}

pub fn mark_expired(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE escrows SET status = 'expired'
         WHERE id = ?1 AND status = 'awaiting_deposit'",
        params![id],
    )?;
    Ok(changed == 1)
}

/// Accepts every non-terminal source state `refund_escrow_now` can be
/// called against: a market can be cancelled while its escrows sit
/// anywhere from `awaiting_deposit` through `sweeping`, and a `joining_sc`
/// escrow is routed here directly from resolution.
pub fn mark_refunding(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE escrows SET status = 'refunding'
         WHERE id = ?1 AND status IN (
            'awaiting_deposit', 'deposit_detected', 'joining_sc',
            'active_in_sc', 'won_awaiting_sweep', 'sweeping'
         )",
        params![id],
    )?;
    Ok(changed == 1)
}

pub fn mark_refunded(conn: &Connection, id: &str) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE escrows SET status = 'refunded' WHERE id = ?1 AND status = 'refunding'",
        params![id],
    )?;
    Ok(changed == 1)
}

pub fn list_expired_awaiting_deposit(
    conn: &Connection,
    now: chrono::DateTime<chrono::Utc>,
) -> EngineResult<Vec<Escrow>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM escrows WHERE status = 'awaiting_deposit' AND expires_at < ?1",
    )?;
    let rows = stmt
        .query_map(params![format_utc(now)], row_to_escrow)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
