//! Market state machine (spec.md §4.3): creation through `issueBet`,
//! on-chain bet-id discovery, the close trigger, the resolution driver,
//! the Resolve transaction, and creator/admin cancellation.

pub mod payout;
pub mod winner;

use crate::chain::ChainClient;
use crate::config::Config;
use crate::db;
use crate::errors::{EngineError, EngineResult};
use crate::oracle::{OracleDispatcher, OracleResult};
use crate::proof::{append_entry, market_commitment, sha256_hex};
use crate::state::{
    bet::BetStatus,
    chain_log::EventType,
    escrow::EscrowStatus,
    market::{Market, MarketStatus, MarketType, Provenance, ResolutionSpec},
    random_id, MAX_SAFE_QU,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

const DISCOVERY_ATTEMPTS: u32 = 5;
const DISCOVERY_BACKOFF: Duration = Duration::from_millis(500);

#[allow(clippy::too_many_arguments)]
pub struct CreateMarketParams {
    pub pair_or_topic: String,
    pub question: String,
    pub resolution: ResolutionSpec,
    pub market_type: MarketType,
    pub options: Vec<String>,
    pub close_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub min_bet_qu: i64,
    pub max_slots_per_option: u32,
    pub creator_address: String,
    pub oracle_addresses: Vec<String>,
    pub oracle_fee_bps: u32,
    pub category: String,
    pub provenance: Provenance,
}

/// Derives a stable 32-byte stand-in for an oracle's public key from its
/// address string — the real Quottery oracle key exchange is out of
/// this engine's contract (spec.md §9), so the bytes only need to be
/// deterministic and collision-resistant, which SHA-256 already gives.
fn oracle_pubkey_bytes(address: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    let hex_hash = sha256_hex(address.as_bytes());
    let bytes = hex::decode(&hex_hash).unwrap_or_default();
    out.copy_from_slice(&bytes[..32]);
    out
}

/// Creation: validate, insert `draft`, commit the hash, append
/// `market_create`, attempt `issueBet`, then burn up to five discovery
/// attempts before settling on `active` either way (spec.md §4.3).
pub async fn create_market(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
    params: CreateMarketParams,
) -> EngineResult<Market> {
    Market::validate_params(
        &params.options,
        params.close_date,
        params.end_date,
        params.market_type,
        params.min_bet_qu,
        params.max_slots_per_option,
    )
    .map_err(EngineError::InvalidMarketParams)?;

    let amount_per_slot = params.min_bet_qu;
    amount_per_slot
        .checked_mul(params.max_slots_per_option as i64)
        .filter(|v| *v <= MAX_SAFE_QU)
        .ok_or(EngineError::AmountOverflow(amount_per_slot))?;

    let commitment_hash = market_commitment(
        &params.pair_or_topic,
        &params.question,
        &params.resolution,
        params.close_date,
        params.end_date,
        params.min_bet_qu,
        params.max_slots_per_option,
        &params.creator_address,
    );

    let auto_refund_at = match params.market_type {
        MarketType::Custom | MarketType::Ai => Some(params.end_date + chrono::Duration::hours(48)),
        _ => None,
    };

    let option_count = params.options.len();
    let market = Market {
        id: random_id("mkt"),
        on_chain_bet_id: 0,
        pair_or_topic: params.pair_or_topic,
        question: params.question,
        resolution: params.resolution,
        market_type: params.market_type,
        options: params.options,
        close_date: params.close_date,
        end_date: params.end_date,
        min_bet_qu: params.min_bet_qu,
        max_slots_per_option: params.max_slots_per_option,
        total_pool: 0,
        slot_map: vec![0; option_count],
        status: MarketStatus::Draft,
        resolution_price: None,
        winning_option: None,
        creator_address: params.creator_address,
        creation_tx: None,
        commitment_hash,
        oracle_addresses: params.oracle_addresses,
        oracle_fee_bps: params.oracle_fee_bps,
        auto_refund_at,
        category: params.category,
        ai_attempt_count: 0,
        ai_resolution_proof: None,
        provenance: params.provenance,
        created_at: crate::time::now(),
    };

    db::markets::insert_market(conn, &market)?;
    append_entry(
        conn,
        EventType::MarketCreate,
        &market.id,
        &json!({
            "pair_or_topic": market.pair_or_topic,
            "question": market.question,
            "options": market.options,
            "commitment_hash": market.commitment_hash,
        }),
    )?;

    let Some(master_seed) = config.master_seed.clone() else {
        return Err(EngineError::MissingConfig("MASTER_SEED"));
    };

    let fee_per_slot_per_hour = chain.fee_per_slot_per_hour().await;
    let hours_until_end = (market.end_date - crate::time::now()).num_seconds() as f64 / 3600.0;
    let issue_fee = crate::chain::rpc::compute_issue_fee(
        market.max_slots_per_option,
        market.options.len() as u32,
        fee_per_slot_per_hour,
        hours_until_end,
    );

    let mut option_ids: [&str; 8] = [""; 8];
    for (i, opt) in market.options.iter().enumerate().take(8) {
        option_ids[i] = opt.as_str();
    }
    let mut oracle_public_keys = [[0u8; 32]; 8];
    let mut oracle_fees = [0u32; 8];
    for (i, addr) in market.oracle_addresses.iter().enumerate().take(8) {
        oracle_public_keys[i] = oracle_pubkey_bytes(addr);
        oracle_fees[i] = market.oracle_fee_bps;
    }

    let issue_params = crate::chain::procedures::IssueBetParams {
        bet_id: &market.id,
        option_ids,
        oracle_public_keys,
        oracle_fees,
        close_date: market.close_date,
        end_date: market.end_date,
        amount_per_slot,
        max_slots: market.max_slots_per_option,
        option_count: market.options.len() as u32,
    };

    let receipt = chain
        .send_issue_bet(&master_seed, &issue_params, issue_fee)
        .await?;
    db::markets::set_creation_tx(conn, &market.id, &receipt.tx_id)?;
    db::markets::update_status(conn, &market.id, MarketStatus::PendingTx)?;

    let mut discovered = false;
    for attempt in 0..DISCOVERY_ATTEMPTS {
        match chain.discover_bet_id(&market.id).await {
            Ok(Some(bet_id)) => {
                db::markets::set_on_chain_bet_id(conn, &market.id, bet_id)?;
                discovered = true;
                break;
            }
            Ok(None) => {}
            Err(e) => warn!(market_id = %market.id, error = %e, "bet-id discovery attempt failed"),
        }
        if attempt + 1 < DISCOVERY_ATTEMPTS {
            tokio::time::sleep(DISCOVERY_BACKOFF).await;
        }
    }
    db::markets::update_status(conn, &market.id, MarketStatus::Active)?;
    if !discovered {
        info!(market_id = %market.id, "bet-id undiscovered after initial attempts, retried by phase 0c");
    }

    db::markets::get_market(conn, &market.id)?
        .ok_or_else(|| EngineError::NotFound(format!("market {}", market.id)))
}

/// Phase 0c: retries bet-id discovery for any market still at 0,
/// independent of how it got there (spec.md §4.3, §4.9).
pub async fn discover_pending_bet_ids(conn: &mut Connection, chain: &ChainClient) -> EngineResult<()> {
    let markets = db::markets::list_markets_with_zero_bet_id(
        conn,
        &[MarketStatus::PendingTx, MarketStatus::Active],
    )?;
    for market in markets {
        match chain.discover_bet_id(&market.id).await {
            Ok(Some(bet_id)) => {
                db::markets::set_on_chain_bet_id(conn, &market.id, bet_id)?;
                if market.status == MarketStatus::PendingTx {
                    db::markets::update_status(conn, &market.id, MarketStatus::Active)?;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(market_id = %market.id, error = %e, "phase 0c discovery failed"),
        }
    }
    Ok(())
}

/// Phase 0a: `active` & `close_date <= now` => `closed`. No RPC.
pub fn close_expired_betting(conn: &Connection) -> EngineResult<()> {
    let now = crate::time::now();
    for market in db::markets::list_markets_by_status(conn, MarketStatus::Active)? {
        if market.close_date <= now {
            db::markets::update_status(conn, &market.id, MarketStatus::Closed)?;
        }
    }
    Ok(())
}

/// Phase 0b: offers every expired `active`/`closed` market to its
/// matching oracle adapter and resolves it on a result (spec.md §4.3).
pub async fn resolve_expired_markets(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
    dispatcher: &OracleDispatcher,
) -> EngineResult<()> {
    let now = crate::time::now();
    let mut candidates = db::markets::list_markets_by_status(conn, MarketStatus::Active)?;
    candidates.extend(db::markets::list_markets_by_status(conn, MarketStatus::Closed)?);

    for market in candidates {
        if market.end_date > now {
            continue;
        }
        let adapter = dispatcher.for_market(&market);
        if !adapter.can_resolve(&market).await {
            continue;
        }
        match adapter.fetch_result(&market).await {
            Ok(Some(result)) => {
                if let Err(e) = resolve_market(conn, chain, config, &market, result).await {
                    warn!(market_id = %market.id, error = %e, "resolve failed");
                }
            }
            Ok(None) => {
                if market.market_type == MarketType::Ai {
                    db::markets::bump_ai_attempt_count(conn, &market.id)?;
                }
            }
            Err(e) => warn!(market_id = %market.id, error = %e, "oracle fetch failed"),
        }
    }
    Ok(())
}

/// The seven-step Resolve transaction (spec.md §4.3).
pub async fn resolve_market(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
    market: &Market,
    oracle_result: OracleResult,
) -> EngineResult<()> {
    if !db::markets::try_claim_market_for_resolution(conn, &market.id)? {
        return Ok(());
    }

    for attestation in &oracle_result.attestations {
        db::oracle::insert_attestation(conn, attestation)?;
    }

    if market.on_chain_bet_id != 0 {
        if let Some(master_seed) = &config.master_seed {
            if let Err(e) = chain
                .send_publish_result(master_seed, market.on_chain_bet_id, oracle_result.winning_option as u32)
                .await
            {
                warn!(market_id = %market.id, error = %e, "publishResult failed, continuing local settlement");
            }
        }
    }

    let bets = db::bets::list_bets_for_market(conn, &market.id)?;
    let mut recomputed_pool: i64 = 0;
    let mut slot_map = vec![0u32; market.options.len()];
    for bet in &bets {
        if matches!(bet.status, BetStatus::Pending | BetStatus::Confirmed) {
            recomputed_pool = recomputed_pool
                .checked_add(bet.amount_qu)
                .ok_or(EngineError::Arithmetic("recomputed_pool"))?;
            if let Some(slot) = slot_map.get_mut(bet.option as usize) {
                *slot += bet.slots;
            }
        }
    }

    let winner = oracle_result.winning_option;
    let winner_slots = slot_map.get(winner as usize).copied().unwrap_or(0) as u64;
    let total_slots: u64 = slot_map.iter().map(|s| *s as u64).sum();
    let breakdown = payout::compute_payout(recomputed_pool, winner_slots, total_slots, market.oracle_fee_bps)?;

    let mut total_payout: i64 = 0;
    let mut winners = Vec::new();
    for bet in &bets {
        if matches!(bet.status, BetStatus::Pending | BetStatus::Confirmed) && bet.option == winner {
            let payout_amount = breakdown
                .per_slot
                .checked_mul(bet.slots as i64)
                .ok_or(EngineError::Arithmetic("bet payout"))?;
            total_payout = total_payout
                .checked_add(payout_amount)
                .ok_or(EngineError::Arithmetic("total_payout"))?;
            winners.push((bet.clone(), payout_amount));
        }
    }

    // Steps 3-7 cross the invariant line (pool/slot recompute, payout
    // compute, solvency guard, resolution + credits, escrow fan-out) and
    // run as one ACID unit (spec.md §4.1, §4.3: Resolve is a single
    // logical transaction) so a crash never leaves a market resolved
    // with winners uncredited.
    let tx = conn.transaction()?;

    db::markets::set_pool_and_slots(&tx, &market.id, recomputed_pool, &slot_map)?;

    if total_payout > recomputed_pool {
        append_entry(
            &tx,
            EventType::SolvencyViolation,
            &market.id,
            &json!({"recomputed_pool": recomputed_pool, "total_payout": total_payout}),
        )?;
        tx.commit()?;
        return Err(EngineError::SolvencyViolation(market.id.clone()));
    }

    db::markets::set_resolution(&tx, &market.id, winner, oracle_result.price)?;

    for (bet, payout_amount) in &winners {
        db::bets::set_payout(&tx, &bet.id, BetStatus::Won, *payout_amount)?;
        db::accounts::credit_payout(&tx, &bet.user_payout_address, *payout_amount)?;
        append_entry(
            &tx,
            EventType::Payout,
            &bet.id,
            &json!({"market_id": market.id, "amount_qu": payout_amount}),
        )?;
    }
    for bet in &bets {
        if matches!(bet.status, BetStatus::Pending | BetStatus::Confirmed) && bet.option != winner {
            db::bets::set_status(&tx, &bet.id, BetStatus::Lost)?;
        }
    }

    // `active_in_sc` escrows are fanned out by the dedicated payout-check
    // phase, which reads the balance this resolve just made meaningful
    // (spec.md §9: on-chain balance is the only trustworthy signal).
    // Escrows still stuck in `joining_sc` never entered the SC pool at
    // all, so they get routed straight into the refund branch here.
    for escrow in db::escrows::list_escrows_for_market(&tx, &market.id)? {
        if escrow.status == EscrowStatus::JoiningSc {
            if let Err(e) = crate::escrow::refund_escrow_now(&tx, chain, config, &escrow).await {
                warn!(escrow_id = %escrow.id, error = %e, "joining_sc refund at resolution failed");
            }
        }
    }

    append_entry(
        &tx,
        EventType::MarketResolve,
        &market.id,
        &json!({"winning_option": winner, "price": oracle_result.price, "payout": breakdown}),
    )?;

    tx.commit()?;

    Ok(())
}

/// Creator/admin cancel: SC `cancelBet`, then every funded bet is
/// refunded; `pending_deposit` bets are just marked `refunded` since
/// they never touched the pool (spec.md §4.3).
pub async fn cancel_market(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
    market_id: &str,
) -> EngineResult<()> {
    let market = db::markets::get_market(conn, market_id)?
        .ok_or_else(|| EngineError::NotFound(format!("market {market_id}")))?;
    if matches!(market.status, MarketStatus::Resolved | MarketStatus::Cancelled) {
        return Ok(());
    }

    if market.on_chain_bet_id != 0 {
        if let Some(master_seed) = &config.master_seed {
            if let Err(e) = chain.send_cancel_bet(master_seed, market.on_chain_bet_id).await {
                warn!(market_id, error = %e, "cancelBet failed, proceeding with local cancellation anyway");
            }
        }
    }

    for escrow in db::escrows::list_escrows_for_market(conn, market_id)? {
        if escrow.status.is_terminal() {
            continue;
        }
        if let Err(e) = crate::escrow::refund_escrow_now(conn, chain, config, &escrow).await {
            warn!(escrow_id = %escrow.id, error = %e, "market cancellation refund failed");
            continue;
        }
        db::ledger::append(
            conn,
            &escrow.user_payout_address,
            crate::state::ledger::TransactionType::Refund,
            escrow.expected_amount_qu,
            None,
            Some(market_id),
            "complete",
        )?;
    }

    for bet in db::bets::list_bets_for_market(conn, market_id)? {
        if bet.status == BetStatus::PendingDeposit {
            db::bets::set_status(conn, &bet.id, BetStatus::Refunded)?;
        }
    }

    db::markets::set_cancelled(conn, market_id)?;
    append_entry(conn, EventType::MarketRecovery, market_id, &json!({"reason": "cancelled"}))?;
    Ok(())
}
