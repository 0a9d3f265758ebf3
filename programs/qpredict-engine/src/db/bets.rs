use crate::errors::{EngineError, EngineResult};
use crate::state::bet::{Bet, BetStatus};
use crate::time::{format_utc, parse_utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn row_to_bet(row: &Row) -> rusqlite::Result<Bet> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    Ok(Bet {
        id: row.get("id")?,
        market_id: row.get("market_id")?,
        user_payout_address: row.get("user_payout_address")?,
        option: row.get::<_, i64>("option")? as u8,
        slots: row.get::<_, i64>("slots")? as u32,
        amount_qu: row.get("amount_qu")?,
        on_chain_tx: row.get("on_chain_tx")?,
        status: BetStatus::parse(&status).unwrap_or(BetStatus::PendingDeposit),
        payout_qu: row.get("payout_qu")?,
        commitment_hash: row.get("commitment_hash")?,
        commitment_nonce: row.get("commitment_nonce")?,
        user_signature: row.get("user_signature")?,
        created_at: parse_utc(&created_at).unwrap_or_else(crate::time::now),
    })
}

pub fn insert_bet(conn: &Connection, bet: &Bet) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO bets (
            id, market_id, user_payout_address, option, slots, amount_qu,
            on_chain_tx, status, payout_qu, commitment_hash, commitment_nonce,
            user_signature, created_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
        params![
            bet.id,
            bet.market_id,
            bet.user_payout_address,
            bet.option,
            bet.slots,
            bet.amount_qu,
            bet.on_chain_tx,
            bet.status.as_str(),
            bet.payout_qu,
            bet.commitment_hash,
            bet.commitment_nonce,
            bet.user_signature,
            format_utc(bet.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_bet(conn: &Connection, id: &str) -> EngineResult<Option<Bet>> {
    conn.query_row("SELECT * FROM bets WHERE id = ?1", params![id], row_to_bet)
        .optional()
        .map_err(EngineError::from)
}

pub fn list_bets_for_market(conn: &Connection, market_id: &str) -> EngineResult<Vec<Bet>> {
    let mut stmt = conn.prepare("SELECT * FROM bets WHERE market_id = ?1")?;
    let rows = stmt
        .query_map(params![market_id], row_to_bet)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_bets_by_status(conn: &Connection, status: BetStatus) -> EngineResult<Vec<Bet>> {
    let mut stmt = conn.prepare("SELECT * FROM bets WHERE status = ?1")?;
    let rows = stmt
        .query_map(params![status.as_str()], row_to_bet)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `pending_deposit -> pending`, gated on a fresh re-check of slot
/// availability so a deposit that lands after the option filled up does
/// not silently join the pool (spec.md §4.1/§4.2 deposit-confirmation
/// step). Recomputes `current_slots + bet.slots <= max_slots` for the
/// bet's option inside the same transaction as the status flip and the
/// pool/slot-map bump, so the check and the mutation can never race.
/// Returns `false` on slot exhaustion, or if the bet isn't in
/// `pending_deposit` anymore — either way the caller refunds instead.
pub fn confirm_bet_deposit(
    conn: &mut Connection,
    bet_id: &str,
    on_chain_tx: &str,
) -> EngineResult<bool> {
    let tx = conn.transaction()?;

    let row: Option<(String, i64, i64, i64, String)> = tx
        .query_row(
            "SELECT market_id, option, slots, amount_qu, status FROM bets WHERE id = ?1",
            params![bet_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?;
    let Some((market_id, option, slots, amount_qu, status)) = row else {
        return Ok(false);
    };
    if status != "pending_deposit" {
        return Ok(false);
    }

    let (max_slots, slot_map_json): (i64, String) = tx.query_row(
        "SELECT max_slots_per_option, slot_map_json FROM markets WHERE id = ?1",
        params![market_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let mut slot_map: Vec<i64> = serde_json::from_str(&slot_map_json).unwrap_or_default();
    let idx = option as usize;
    if idx >= slot_map.len() {
        slot_map.resize(idx + 1, 0);
    }
    let current = slot_map[idx];
    if current + slots > max_slots {
        return Ok(false);
    }
    slot_map[idx] = current + slots;

    let changed = tx.execute(
        "UPDATE bets SET status = 'pending', on_chain_tx = ?1
         WHERE id = ?2 AND status = 'pending_deposit'",
        params![on_chain_tx, bet_id],
    )?;
    if changed != 1 {
        return Ok(false);
    }
    tx.execute(
        "UPDATE markets SET total_pool = total_pool + ?1, slot_map_json = ?2 WHERE id = ?3",
        params![amount_qu, serde_json::to_string(&slot_map)?, market_id],
    )?;

    tx.commit()?;
    Ok(true)
}

pub fn set_status(conn: &Connection, id: &str, status: BetStatus) -> EngineResult<()> {
    conn.execute(
        "UPDATE bets SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(())
}

pub fn set_payout(conn: &Connection, id: &str, status: BetStatus, payout_qu: i64) -> EngineResult<()> {
    conn.execute(
        "UPDATE bets SET status = ?1, payout_qu = ?2 WHERE id = ?3",
        params![status.as_str(), payout_qu, id],
    )?;
    Ok(())
}
