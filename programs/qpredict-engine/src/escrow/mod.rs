//! Escrow state machine (spec.md §4.2). Each bet is custodied through a
//! fresh on-chain identity; this module owns every transition of that
//! identity's lifecycle from first deposit through final sweep.

use crate::chain::ChainClient;
use crate::config::Config;
use crate::db;
use crate::errors::{EngineError, EngineResult};
use crate::proof::{append_entry, bet_commitment, commitment::random_nonce_hex};
use crate::state::{
    bet::{Bet, BetStatus},
    chain_log::EventType,
    escrow::{Escrow, EscrowStatus},
    escrow_key::{EscrowKey, KeyStatus},
    market::Market,
    random_id, MAX_SAFE_QU,
};
use crate::vault::{decrypt_seed, derive_master_key, encrypt_seed, generate_seed, EncryptedSeed};
use rusqlite::Connection;
use serde_json::json;
use tracing::{debug, warn};

const JOIN_RETRY_LIMIT: u32 = 3;
const ORPHAN_JOIN_IDLE_MINUTES: i64 = 30;
const ORPHAN_SWEEP_IDLE_MINUTES: i64 = 15;

/// Creates an escrow and its pending bet in one transaction: fresh
/// on-chain identity, AEAD-encrypted seed, bet row (`pending_deposit`,
/// pool untouched), escrow row (`awaiting_deposit`), key row (`active`)
/// (spec.md §4.2).
pub fn create_escrow(
    conn: &mut Connection,
    config: &Config,
    market: &Market,
    user_payout_address: &str,
    option: u8,
    slots: u32,
) -> EngineResult<(Bet, Escrow)> {
    let expected_amount = market
        .min_bet_qu
        .checked_mul(slots as i64)
        .ok_or(EngineError::Arithmetic("expected_amount"))?;
    if expected_amount > MAX_SAFE_QU {
        return Err(EngineError::AmountOverflow(expected_amount));
    }

    let seed = generate_seed();
    let escrow_address = crate::chain::identity::derive_public_address(&seed);
    let master_key = derive_master_key(&config.escrow_master_key);
    let encrypted = encrypt_seed(&seed, &master_key)?;

    let now = crate::time::now();
    let nonce_hex = random_nonce_hex();
    let bet_id = random_id("bet");
    let commitment_hash = bet_commitment(&market.id, user_payout_address, option, slots, &nonce_hex);

    let bet = Bet {
        id: bet_id.clone(),
        market_id: market.id.clone(),
        user_payout_address: user_payout_address.to_string(),
        option,
        slots,
        amount_qu: expected_amount,
        on_chain_tx: None,
        status: BetStatus::PendingDeposit,
        payout_qu: None,
        commitment_hash,
        commitment_nonce: nonce_hex,
        user_signature: None,
        created_at: now,
    };

    let escrow_id = random_id("escrow");
    let escrow = Escrow {
        id: escrow_id.clone(),
        bet_id: bet_id.clone(),
        market_id: market.id.clone(),
        escrow_address: escrow_address.clone(),
        user_payout_address: user_payout_address.to_string(),
        option,
        slots,
        expected_amount_qu: expected_amount,
        status: EscrowStatus::AwaitingDeposit,
        deposit_detected_at: None,
        deposit_amount_qu: None,
        join_tx_id: None,
        join_target_tick: None,
        payout_detected_at: None,
        payout_amount_qu: None,
        sweep_tx_id: None,
        sweep_target_tick: None,
        join_retry_count: 0,
        expires_at: now + chrono::Duration::hours(config.escrow_expiry_hours),
        created_at: now,
    };

    let key = EscrowKey {
        escrow_id: escrow_id.clone(),
        ciphertext_hex: encrypted.ciphertext_hex,
        iv_hex: encrypted.iv_hex,
        tag_hex: encrypted.tag_hex,
        status: KeyStatus::Active,
    };

    let tx = conn.transaction()?;
    db::bets::insert_bet(&tx, &bet)?;
    db::escrows::insert_escrow(&tx, &escrow)?;
    db::keys::insert_key(&tx, &key)?;
    append_entry(
        &tx,
        EventType::BetPlace,
        &bet.id,
        &json!({
            "market_id": market.id,
            "escrow_id": escrow.id,
            "escrow_address": escrow.escrow_address,
            "option": option,
            "slots": slots,
            "expected_amount_qu": expected_amount,
        }),
    )?;
    tx.commit()?;

    Ok((bet, escrow))
}

fn decrypt_escrow_seed(conn: &Connection, config: &Config, escrow_id: &str) -> EngineResult<String> {
    let key = db::keys::get_key(conn, escrow_id)?
        .ok_or_else(|| EngineError::NotFound(format!("escrow key for {escrow_id}")))?;
    let master_key = derive_master_key(&config.escrow_master_key);
    let enc = EncryptedSeed {
        ciphertext_hex: key.ciphertext_hex,
        iv_hex: key.iv_hex,
        tag_hex: key.tag_hex,
    };
    decrypt_seed(&enc, &master_key)
}

/// Phase 1: `awaiting_deposit` escrows whose on-chain balance has
/// arrived, plus the expiry branches (spec.md §4.2).
pub async fn check_deposits(conn: &mut Connection, chain: &ChainClient, config: &Config) -> EngineResult<()> {
    let escrows = db::escrows::list_escrows_by_status(conn, EscrowStatus::AwaitingDeposit)?;
    for escrow in escrows {
        if let Err(e) = check_one_deposit(conn, chain, config, &escrow).await {
            warn!(escrow_id = %escrow.id, error = %e, "deposit check failed");
        }
    }
    Ok(())
}

async fn check_one_deposit(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
    escrow: &Escrow,
) -> EngineResult<()> {
    let balance = chain.get_balance(&escrow.escrow_address).await?;
    let now = crate::time::now();

    if balance >= escrow.expected_amount_qu {
        let confirmed = db::bets::confirm_bet_deposit(conn, &escrow.bet_id, &escrow.escrow_address)?;
        if confirmed {
            db::escrows::mark_deposit_detected(conn, &escrow.id, balance, now)?;
            append_entry(
                conn,
                EventType::BetConfirm,
                &escrow.bet_id,
                &json!({"escrow_id": escrow.id, "balance": balance}),
            )?;
        } else {
            warn!(escrow_id = %escrow.id, "option slots exhausted while escrow was awaiting deposit, routing to refund");
            db::bets::set_status(conn, &escrow.bet_id, BetStatus::Refunded)?;
            db::escrows::mark_won_awaiting_sweep(conn, &escrow.id, balance, now)?;
        }
        return Ok(());
    }

    if now < escrow.expires_at {
        return Ok(());
    }

    let fee = config.qubic_tx_fee_qu;
    if balance == 0 {
        if db::escrows::mark_expired(conn, &escrow.id)? {
            db::bets::set_status(conn, &escrow.bet_id, BetStatus::Refunded)?;
            db::keys::archive_key(conn, &escrow.id)?;
        }
    } else if balance > fee {
        debug!(escrow_id = %escrow.id, balance, "expired escrow with residual balance, late-refund path");
        db::escrows::mark_won_awaiting_sweep(conn, &escrow.id, balance, now)?;
    }
    Ok(())
}

/// Phase 2: broadcasts `joinBet` for every `deposit_detected` escrow
/// whose market has a discovered on-chain bet-id.
pub async fn execute_joins(conn: &mut Connection, chain: &ChainClient, config: &Config) -> EngineResult<()> {
    let escrows = db::escrows::list_escrows_by_status(conn, EscrowStatus::DepositDetected)?;
    for escrow in escrows {
        if let Err(e) = execute_one_join(conn, chain, config, &escrow).await {
            warn!(escrow_id = %escrow.id, error = %e, "joinBet execution failed");
        }
    }
    Ok(())
}

async fn execute_one_join(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
    escrow: &Escrow,
) -> EngineResult<()> {
    let market = db::markets::get_market(conn, &escrow.market_id)?
        .ok_or_else(|| EngineError::NotFound(format!("market {}", escrow.market_id)))?;
    if market.on_chain_bet_id == 0 {
        return Ok(());
    }

    if !db::escrows::mark_joining(conn, &escrow.id)? {
        return Ok(());
    }

    let seed = match decrypt_escrow_seed(conn, config, &escrow.id) {
        Ok(s) => s,
        Err(e) => {
            db::escrows::revert_join_bet(conn, &escrow.id)?;
            return Err(e);
        }
    };

    match chain
        .send_join_bet(&seed, escrow.expected_amount_qu, market.on_chain_bet_id, escrow.slots, escrow.option as u32)
        .await
    {
        Ok(receipt) => {
            db::escrows::set_join_tx(conn, &escrow.id, &receipt.tx_id, receipt.target_tick)?;
            Ok(())
        }
        Err(e) => {
            let retries = db::escrows::revert_join_bet(conn, &escrow.id)?;
            if retries >= JOIN_RETRY_LIMIT {
                warn!(escrow_id = %escrow.id, retries, "joinBet retries exhausted, routing to refund sweep");
                db::escrows::mark_won_awaiting_sweep(conn, &escrow.id, escrow.expected_amount_qu, crate::time::now())?;
            }
            Err(e)
        }
    }
}

/// Phase 2b: confirms `joining_sc` escrows once their join transaction
/// has visibly drained the escrow balance, or reverts on timeout.
pub async fn verify_join_confirmations(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
) -> EngineResult<()> {
    let escrows = db::escrows::list_escrows_by_status(conn, EscrowStatus::JoiningSc)?;
    let tick = chain.current_tick().await?;
    for escrow in escrows {
        if let Err(e) = verify_one_join(conn, chain, config, &escrow, tick).await {
            warn!(escrow_id = %escrow.id, error = %e, "joinBet confirmation check failed");
        }
    }
    Ok(())
}

async fn verify_one_join(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
    escrow: &Escrow,
    current_tick: u32,
) -> EngineResult<()> {
    let balance = chain.get_balance(&escrow.escrow_address).await?;
    if balance < escrow.expected_amount_qu / 2 {
        db::escrows::confirm_join_bet(conn, &escrow.id)?;
        return Ok(());
    }

    if let Some(join_tick) = escrow.join_target_tick {
        if current_tick.saturating_sub(join_tick) > config.joinbet_timeout_ticks {
            db::escrows::revert_join_bet(conn, &escrow.id)?;
        }
    }
    Ok(())
}

/// Phase 3: the sole signal for a `active_in_sc` escrow's outcome is its
/// own on-chain balance once the market has resolved — never the
/// resolution transaction's timing (spec.md §9 open question). An
/// escrow whose balance has dropped to ~0 paid out to the winner side
/// of the SC pool and lost; one still holding its stake, on the winning
/// option, is promoted to sweep.
pub async fn check_payouts(conn: &mut Connection, chain: &ChainClient) -> EngineResult<()> {
    let escrows = db::escrows::list_escrows_by_status(conn, EscrowStatus::ActiveInSc)?;
    for escrow in escrows {
        if let Err(e) = check_one_payout(conn, chain, &escrow).await {
            warn!(escrow_id = %escrow.id, error = %e, "payout check failed");
        }
    }
    Ok(())
}

async fn check_one_payout(conn: &mut Connection, chain: &ChainClient, escrow: &Escrow) -> EngineResult<()> {
    let market = db::markets::get_market(conn, &escrow.market_id)?
        .ok_or_else(|| EngineError::NotFound(format!("market {}", escrow.market_id)))?;
    let Some(winning_option) = market.winning_option else {
        return Ok(());
    };

    let balance = chain.get_balance(&escrow.escrow_address).await?;
    let now = crate::time::now();

    if escrow.option == winning_option && balance > 0 {
        db::escrows::mark_won_awaiting_sweep(conn, &escrow.id, balance, now)?;
    } else {
        db::escrows::mark_lost(conn, &escrow.id)?;
        db::keys::archive_key(conn, &escrow.id)?;
        db::bets::set_status(conn, &escrow.bet_id, BetStatus::Lost)?;
    }
    Ok(())
}

/// Phase 4: claims the sweep mutex, re-reads balance past the claim
/// (TOCTOU close), decrypts the seed, records the sweep tx-id before
/// broadcasting so `confirm_sweep_complete`'s SQL guard can ever
/// succeed, then broadcasts (spec.md §4.2).
pub async fn execute_sweeps(conn: &mut Connection, chain: &ChainClient, config: &Config) -> EngineResult<()> {
    let escrows = db::escrows::list_escrows_by_status(conn, EscrowStatus::WonAwaitingSweep)?;
    for escrow in escrows {
        if let Err(e) = execute_one_sweep(conn, chain, config, &escrow).await {
            warn!(escrow_id = %escrow.id, error = %e, "sweep execution failed");
        }
    }
    Ok(())
}

async fn execute_one_sweep(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
    escrow: &Escrow,
) -> EngineResult<()> {
    if !db::escrows::claim_escrow_for_sweep(conn, &escrow.id)? {
        return Ok(());
    }

    let balance = chain.get_balance(&escrow.escrow_address).await?;
    let fee = config.qubic_tx_fee_qu;
    if balance <= fee {
        db::escrows::revert_sweep_claim(conn, &escrow.id)?;
        return Ok(());
    }

    let key = match db::keys::get_key(conn, &escrow.id)? {
        Some(k) if k.status == KeyStatus::Active => k,
        _ => {
            db::escrows::revert_sweep_claim(conn, &escrow.id)?;
            return Err(EngineError::InvalidStateTransition(format!(
                "escrow {} key is no longer active",
                escrow.id
            )));
        }
    };
    let master_key = derive_master_key(&config.escrow_master_key);
    let enc = EncryptedSeed {
        ciphertext_hex: key.ciphertext_hex,
        iv_hex: key.iv_hex,
        tag_hex: key.tag_hex,
    };
    let seed = match decrypt_seed(&enc, &master_key) {
        Ok(s) => s,
        Err(e) => {
            db::escrows::revert_sweep_claim(conn, &escrow.id)?;
            return Err(e);
        }
    };

    let transfer_amount = balance - fee;
    let tick = chain.current_tick().await?;
    let target_tick = tick + 5;

    // Record before broadcasting so confirm_sweep_complete's guard can succeed
    // even if the process crashes between this write and the broadcast.
    db::escrows::set_sweep_tx(conn, &escrow.id, "pending", target_tick)?;

    match chain.send_transfer(&seed, &escrow.user_payout_address, transfer_amount).await {
        Ok(receipt) => {
            db::escrows::set_sweep_tx(conn, &escrow.id, &receipt.tx_id, receipt.target_tick)?;
        }
        Err(e) => {
            db::escrows::set_sweep_tx(conn, &escrow.id, "", 0)?;
            db::escrows::revert_sweep_claim(conn, &escrow.id)?;
            return Err(e);
        }
    }
    Ok(())
}

/// Phase 4b: confirms `sweeping` escrows once the escrow balance has
/// drained to the fee dust, or reverts on crash/timeout.
pub async fn verify_sweep_confirmations(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
) -> EngineResult<()> {
    let escrows = db::escrows::list_escrows_by_status(conn, EscrowStatus::Sweeping)?;
    let tick = chain.current_tick().await?;
    for escrow in escrows {
        if let Err(e) = verify_one_sweep(conn, chain, config, &escrow, tick).await {
            warn!(escrow_id = %escrow.id, error = %e, "sweep confirmation check failed");
        }
    }
    Ok(())
}

async fn verify_one_sweep(
    conn: &mut Connection,
    chain: &ChainClient,
    config: &Config,
    escrow: &Escrow,
    current_tick: u32,
) -> EngineResult<()> {
    let Some(sweep_tx_id) = &escrow.sweep_tx_id else {
        db::escrows::revert_sweep_claim(conn, &escrow.id)?;
        return Ok(());
    };
    if sweep_tx_id.is_empty() {
        db::escrows::revert_sweep_claim(conn, &escrow.id)?;
        return Ok(());
    }

    let balance = chain.get_balance(&escrow.escrow_address).await?;
    let fee = config.qubic_tx_fee_qu;

    if balance <= fee {
        if db::escrows::confirm_sweep_complete(conn, &escrow.id)? {
            db::keys::archive_key(conn, &escrow.id)?;
            // A bet already marked refunded got here via the late-refund or
            // retries-exhausted path, not a genuine win; leave its status alone.
            if let Some(bet) = db::bets::get_bet(conn, &escrow.bet_id)? {
                if bet.status != BetStatus::Refunded {
                    db::bets::set_payout(conn, &escrow.bet_id, BetStatus::Won, escrow.payout_amount_qu.unwrap_or(0))?;
                }
            }
            append_entry(
                conn,
                EventType::Payout,
                &escrow.id,
                &json!({"bet_id": escrow.bet_id, "sweep_tx_id": sweep_tx_id, "amount_qu": escrow.payout_amount_qu}),
            )?;
        } else {
            warn!(escrow_id = %escrow.id, "confirm_sweep_complete guard rejected, reverting for manual review");
            db::escrows::revert_sweep_claim(conn, &escrow.id)?;
        }
        return Ok(());
    }

    if let Some(sweep_tick) = escrow.sweep_target_tick {
        if current_tick.saturating_sub(sweep_tick) > config.sweep_timeout_ticks {
            db::escrows::revert_sweep_claim(conn, &escrow.id)?;
        }
    }
    Ok(())
}

/// Phase 5: escrows that sat in `awaiting_deposit` past their expiry
/// and were never touched by `check_deposits` in time (the normal
/// path handles expiry inline; this phase is the safety net for escrows
/// created just before a cron cycle and this is a separate sweep of
/// all expired rows, independent of phase 1's per-escrow pass).
pub async fn handle_expired_escrows(conn: &mut Connection, chain: &ChainClient, config: &Config) -> EngineResult<()> {
    let now = crate::time::now();
    let escrows = db::escrows::list_expired_awaiting_deposit(conn, now)?;
    for escrow in escrows {
        if let Err(e) = check_one_deposit(conn, chain, config, &escrow).await {
            warn!(escrow_id = %escrow.id, error = %e, "expired escrow handling failed");
        }
    }
    Ok(())
}

/// Pre-deposit cancellation (spec.md §4.2): requires `awaiting_deposit`
/// and zero on-chain balance. One atomic step to `expired` / `refunded`
/// / `archived`.
pub async fn cancel_escrow(conn: &mut Connection, chain: &ChainClient, escrow_id: &str) -> EngineResult<bool> {
    let escrow = db::escrows::get_escrow(conn, escrow_id)?
        .ok_or_else(|| EngineError::NotFound(format!("escrow {escrow_id}")))?;
    if escrow.status != EscrowStatus::AwaitingDeposit {
        return Ok(false);
    }
    let balance = chain.get_balance(&escrow.escrow_address).await?;
    if balance != 0 {
        return Ok(false);
    }

    if db::escrows::mark_expired(conn, &escrow.id)? {
        db::bets::set_status(conn, &escrow.bet_id, BetStatus::Refunded)?;
        db::keys::archive_key(conn, &escrow.id)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Used by market cancellation (spec.md §4.3) to physically return any
/// balance a funded escrow still custodies to its user. Not part of the
/// regular fast-cycle phase list — invoked synchronously by
/// `crate::market::cancel_market` for each escrow the cancelled market
/// still holds funds in, reusing the same decrypt/transfer path the
/// regular sweep phase uses.
pub async fn refund_escrow_now(conn: &Connection, chain: &ChainClient, config: &Config, escrow: &Escrow) -> EngineResult<()> {
    if escrow.status.is_terminal() {
        return Ok(());
    }
    let balance = chain.get_balance(&escrow.escrow_address).await?;
    let fee = config.qubic_tx_fee_qu;
    if balance <= fee {
        if !escrow.status.is_terminal() {
            db::escrows::mark_refunding(conn, &escrow.id)?;
            db::escrows::mark_refunded(conn, &escrow.id)?;
            db::keys::archive_key(conn, &escrow.id)?;
        }
        return Ok(());
    }

    let seed = decrypt_escrow_seed(conn, config, &escrow.id)?;
    let receipt = chain
        .send_transfer(&seed, &escrow.user_payout_address, balance - fee)
        .await?;
    db::escrows::mark_refunding(conn, &escrow.id)?;
    append_entry(
        conn,
        EventType::Withdrawal,
        &escrow.id,
        &json!({"bet_id": escrow.bet_id, "refund_tx": receipt.tx_id, "amount_qu": balance - fee}),
    )?;
    db::escrows::mark_refunded(conn, &escrow.id)?;
    db::keys::archive_key(conn, &escrow.id)?;
    Ok(())
}

/// Orphan recovery thresholds (spec.md §4.9), run each fast cycle.
pub async fn recover_orphans(conn: &mut Connection, chain: &ChainClient) -> EngineResult<()> {
    let now = crate::time::now();

    for escrow in db::escrows::list_escrows_by_status(conn, EscrowStatus::JoiningSc)? {
        if now - escrow.created_at < chrono::Duration::minutes(ORPHAN_JOIN_IDLE_MINUTES) {
            continue;
        }
        match chain.get_balance(&escrow.escrow_address).await {
            Ok(balance) if balance == 0 => {
                db::escrows::confirm_join_bet(conn, &escrow.id)?;
            }
            Ok(_) => {
                db::escrows::revert_join_bet(conn, &escrow.id)?;
            }
            Err(e) => warn!(escrow_id = %escrow.id, error = %e, "orphan joining_sc balance check failed"),
        }
    }

    for escrow in db::escrows::list_escrows_by_status(conn, EscrowStatus::Sweeping)? {
        if escrow.sweep_tx_id.as_deref().unwrap_or("").is_empty()
            && now - escrow.created_at >= chrono::Duration::minutes(ORPHAN_SWEEP_IDLE_MINUTES)
        {
            db::escrows::revert_sweep_claim(conn, &escrow.id)?;
        }
    }

    for escrow in db::escrows::list_escrows_by_status(conn, EscrowStatus::WonAwaitingSweep)? {
        if let Some(detected_at) = escrow.payout_detected_at {
            if now - detected_at >= chrono::Duration::hours(2) {
                warn!(escrow_id = %escrow.id, "escrow stuck in won_awaiting_sweep for over 2 hours");
            }
        }
    }

    Ok(())
}
