//! Recovery subsystem (spec.md §4.9): stuck-market recovery and
//! slot/commitment repair. Orphan escrow recovery lives next to the
//! state machine it repairs (`crate::escrow::recover_orphans`); this
//! module owns the two pieces that look across markets instead of
//! across one escrow's own transitions.

use crate::chain::ChainClient;
use crate::config::Config;
use crate::db;
use crate::errors::EngineResult;
use crate::proof::market_commitment;
use crate::state::market::MarketStatus;
use rusqlite::Connection;
use tracing::warn;

const STUCK_PENDING_TX_MINUTES: i64 = 30;
const STUCK_RESOLVING_HOURS: i64 = 1;
const STUCK_UNDISCOVERED_HOURS: i64 = 1;

/// Phase 0d. Three independent sweeps, each over a distinct market
/// status, matching the thresholds in spec.md §4.9 exactly:
/// - `pending_tx` idle past 30 min never got an on-chain bet — cancel it.
/// - `resolving` whose `end_date` is over an hour old lost its claimant
///   mid-resolve (crash) — revert to `closed` so the driver retries.
/// - `active` with bet-id still 0 past an hour gets one more discovery
///   attempt before being given up on.
pub async fn recover_stuck_markets(conn: &mut Connection, chain: &ChainClient, config: &Config) -> EngineResult<()> {
    let now = crate::time::now();

    for market in db::markets::list_markets_by_status(conn, MarketStatus::PendingTx)? {
        if now - market.created_at >= chrono::Duration::minutes(STUCK_PENDING_TX_MINUTES) {
            if let Err(e) = crate::market::cancel_market(conn, chain, config, &market.id).await {
                warn!(market_id = %market.id, error = %e, "stuck pending_tx cancellation failed");
            }
        }
    }

    for market in db::markets::list_markets_by_status(conn, MarketStatus::Resolving)? {
        if now - market.end_date >= chrono::Duration::hours(STUCK_RESOLVING_HOURS) {
            db::markets::update_status(conn, &market.id, MarketStatus::Closed)?;
        }
    }

    for market in db::markets::list_markets_with_zero_bet_id(conn, &[MarketStatus::Active])? {
        if now - market.created_at < chrono::Duration::hours(STUCK_UNDISCOVERED_HOURS) {
            continue;
        }
        match chain.discover_bet_id(&market.id).await {
            Ok(Some(bet_id)) => {
                db::markets::set_on_chain_bet_id(conn, &market.id, bet_id)?;
            }
            Ok(None) => {
                if let Err(e) = crate::market::cancel_market(conn, chain, config, &market.id).await {
                    warn!(market_id = %market.id, error = %e, "undiscovered-market cancellation failed");
                }
            }
            Err(e) => warn!(market_id = %market.id, error = %e, "stuck-market discovery retry failed"),
        }
    }

    // `custom`/`ai` markets fall back to `auto_refund_at` (end_date + 48h)
    // when nobody ever submits a result (spec.md §6): the creator never
    // calls in, or the AI council exhausts its attempt budget and
    // `can_resolve()` stays false forever. Cancel once the fallback is due.
    let auto_refund_statuses = [MarketStatus::Active, MarketStatus::Closed];
    for market in db::markets::list_markets_with_expired_auto_refund(conn, now, &auto_refund_statuses)? {
        if let Err(e) = crate::market::cancel_market(conn, chain, config, &market.id).await {
            warn!(market_id = %market.id, error = %e, "auto-refund cancellation failed");
        }
    }

    Ok(())
}

/// Phase 0: recomputes `(pool, slot_map)` from funded bet rows and the
/// commitment hash from stored parameters, correcting either in place
/// if they disagree with what's cached. Migration support for rows
/// written before a format changed — normal writes always compute
/// correctly, so a healthy database leaves every row untouched here
/// (spec.md §4.9).
pub fn repair_markets(conn: &Connection) -> EngineResult<()> {
    let statuses = [
        MarketStatus::Draft,
        MarketStatus::PendingTx,
        MarketStatus::Active,
        MarketStatus::Closed,
        MarketStatus::Resolving,
    ];
    for market in db::markets::list_markets_any_status(conn, &statuses)? {
        let bets = db::bets::list_bets_for_market(conn, &market.id)?;
        let mut pool = 0i64;
        let mut slot_map = vec![0u32; market.options.len()];
        for bet in &bets {
            if bet.status.counts_toward_pool() {
                pool += bet.amount_qu;
                if let Some(slot) = slot_map.get_mut(bet.option as usize) {
                    *slot += bet.slots;
                }
            }
        }
        if pool != market.total_pool || slot_map != market.slot_map {
            db::markets::set_pool_and_slots(conn, &market.id, pool, &slot_map)?;
        }

        let recomputed_hash = market_commitment(
            &market.pair_or_topic,
            &market.question,
            &market.resolution,
            market.close_date,
            market.end_date,
            market.min_bet_qu,
            market.max_slots_per_option,
            &market.creator_address,
        );
        if recomputed_hash != market.commitment_hash {
            db::markets::set_commitment_hash(conn, &market.id, &recomputed_hash)?;
        }
    }
    Ok(())
}
