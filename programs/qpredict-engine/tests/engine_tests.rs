//! End-to-end coverage over `Db::open_in_memory()` fixtures, driving the
//! same module functions the cron orchestrator calls. None of these
//! exercise `ChainClient` against a live endpoint: fixtures are chosen so
//! the few RPC call sites on these paths are never reached, or reached
//! only in their already error-tolerant branches.

use chrono::{Duration, Utc};
use qpredict_engine::chain::ChainClient;
use qpredict_engine::config::Config;
use qpredict_engine::db;
use qpredict_engine::oracle::OracleResult;
use qpredict_engine::proof;
use qpredict_engine::state::bet::{Bet, BetStatus};
use qpredict_engine::state::chain_log::EventType;
use qpredict_engine::state::escrow::{Escrow, EscrowStatus};
use qpredict_engine::state::escrow_key::{EscrowKey, KeyStatus};
use qpredict_engine::state::market::{
    Market, MarketStatus, MarketType, Provenance, ResolutionSpec, ResolutionType,
};
use qpredict_engine::state::solvency::SolvencyProof;
use qpredict_engine::Db;

fn test_config() -> Config {
    Config {
        qubic_rpc_urls: vec![],
        escrow_master_key: "test-operator-secret".to_string(),
        attestation_secret_key: "test-attestation-secret".to_string(),
        master_identity: None,
        master_seed: None,
        fast_cycle_ms: 15_000,
        slow_cycle_ms: 21_600_000,
        escrow_expiry_hours: 2,
        joinbet_timeout_ticks: 600,
        sweep_timeout_ticks: 300,
        min_oracle_sources: 2,
        log_level: "info".to_string(),
        alert_webhook_url: None,
        alert_webhook_type: None,
        db_path: "qpredict.sqlite3".to_string(),
        qubic_tx_fee_qu: 0,
        price_oracle_urls: vec![],
        sports_oracle_url: None,
        ai_council_url: None,
        ai_council_api_key: None,
        news_api_url: None,
        ai_max_attempts: 3,
        operator_address: "OPERATORADDR".to_string(),
    }
}

fn bare_market(id: &str, options: usize) -> Market {
    let now = Utc::now();
    Market {
        id: id.to_string(),
        on_chain_bet_id: 0,
        pair_or_topic: "BTC/USD".to_string(),
        question: "Will BTC close above 100k?".to_string(),
        resolution: ResolutionSpec {
            kind: ResolutionType::Above,
            target: 100_000.0,
            target_high: None,
        },
        market_type: MarketType::Price,
        options: (0..options).map(|i| format!("option-{i}")).collect(),
        close_date: now - Duration::hours(1),
        end_date: now - Duration::minutes(1),
        min_bet_qu: 10_000,
        max_slots_per_option: 10,
        total_pool: 0,
        slot_map: vec![0; options],
        status: MarketStatus::Closed,
        resolution_price: None,
        winning_option: None,
        creator_address: "CREATORADDR".to_string(),
        creation_tx: None,
        commitment_hash: "deadbeef".to_string(),
        oracle_addresses: vec![],
        oracle_fee_bps: 0,
        auto_refund_at: None,
        category: "crypto".to_string(),
        ai_attempt_count: 0,
        ai_resolution_proof: None,
        provenance: Provenance::default(),
        created_at: now,
    }
}

fn bare_bet(id: &str, market_id: &str, user: &str, option: u8, slots: u32, amount_qu: i64) -> Bet {
    Bet {
        id: id.to_string(),
        market_id: market_id.to_string(),
        user_payout_address: user.to_string(),
        option,
        slots,
        amount_qu,
        on_chain_tx: Some(format!("tx-{id}")),
        status: BetStatus::Confirmed,
        payout_qu: None,
        commitment_hash: proof::bet_commitment(market_id, user, option, slots, "nonce"),
        commitment_nonce: "nonce".to_string(),
        user_signature: None,
        created_at: Utc::now(),
    }
}

fn bare_escrow(id: &str, bet_id: &str, market_id: &str, status: EscrowStatus) -> Escrow {
    let now = Utc::now();
    Escrow {
        id: id.to_string(),
        bet_id: bet_id.to_string(),
        market_id: market_id.to_string(),
        escrow_address: "A".repeat(60),
        user_payout_address: "USERADDR".to_string(),
        option: 0,
        slots: 2,
        expected_amount_qu: 20_000,
        status,
        deposit_detected_at: None,
        deposit_amount_qu: None,
        join_tx_id: None,
        join_target_tick: None,
        payout_detected_at: None,
        payout_amount_qu: None,
        sweep_tx_id: None,
        sweep_target_tick: None,
        join_retry_count: 0,
        expires_at: now + Duration::hours(2),
        created_at: now,
    }
}

/// Spec scenario 1: two bettors, 2 slots each, 10000 QU/slot, one side
/// wins. Resolution must recompute the pool/slot map, pay the winner
/// exactly `per_slot * slots`, and leave the loser's bet marked lost.
#[tokio::test]
async fn resolve_market_matches_happy_path_scenario() {
    let db = Db::open_in_memory().unwrap();
    let mut conn = db.lock().await;
    let config = test_config();
    let chain = ChainClient::new(vec![]);

    let market = bare_market("mkt-1", 2);
    db::markets::insert_market(&conn, &market).unwrap();

    let winner_bet = bare_bet("bet-winner", "mkt-1", "ALICE", 0, 2, 20_000);
    let loser_bet = bare_bet("bet-loser", "mkt-1", "BOB", 1, 2, 20_000);
    db::bets::insert_bet(&conn, &winner_bet).unwrap();
    db::bets::insert_bet(&conn, &loser_bet).unwrap();

    let oracle_result = OracleResult {
        winning_option: 0,
        price: Some(105_000.0),
        attestations: vec![],
        proof: serde_json::json!({}),
    };

    qpredict_engine::market::resolve_market(&mut conn, &chain, &config, &market, oracle_result)
        .await
        .unwrap();

    let resolved = db::markets::get_market(&conn, "mkt-1").unwrap().unwrap();
    assert_eq!(resolved.status, MarketStatus::Resolved);
    assert_eq!(resolved.winning_option, Some(0));
    assert_eq!(resolved.total_pool, 40_000);

    let won = db::bets::get_bet(&conn, "bet-winner").unwrap().unwrap();
    assert_eq!(won.status, BetStatus::Won);
    assert_eq!(won.payout_qu, Some(37_500));

    let lost = db::bets::get_bet(&conn, "bet-loser").unwrap().unwrap();
    assert_eq!(lost.status, BetStatus::Lost);
    assert_eq!(lost.payout_qu, None);

    let alice = db::accounts::get_account(&conn, "ALICE").unwrap().unwrap();
    assert_eq!(alice.balance_qu, 37_500);
    assert!(won.payout_qu.unwrap() <= resolved.total_pool);
}

/// Two concurrent claims on the same `won_awaiting_sweep` escrow must
/// never both succeed (spec.md's anti-double-sweep mutex).
#[tokio::test]
async fn double_sweep_claim_only_succeeds_once() {
    let db = Db::open_in_memory().unwrap();
    let conn = db.lock().await;

    let market = bare_market("mkt-2", 2);
    db::markets::insert_market(&conn, &market).unwrap();
    let bet = bare_bet("bet-2", "mkt-2", "CAROL", 0, 1, 10_000);
    db::bets::insert_bet(&conn, &bet).unwrap();
    let mut escrow = bare_escrow("esc-2", "bet-2", "mkt-2", EscrowStatus::WonAwaitingSweep);
    escrow.payout_amount_qu = Some(9_500);
    db::escrows::insert_escrow(&conn, &escrow).unwrap();

    let first = db::escrows::claim_escrow_for_sweep(&conn, "esc-2").unwrap();
    let second = db::escrows::claim_escrow_for_sweep(&conn, "esc-2").unwrap();

    assert!(first);
    assert!(!second);
}

/// `confirm_sweep_complete`'s SQL guard refuses to flip an escrow to
/// `swept` while `sweep_tx_id` is still null, even if it is already
/// `sweeping` — this is what keeps a crash between the claim and the
/// broadcast from silently marking funds delivered.
#[tokio::test]
async fn confirm_sweep_complete_rejects_missing_tx_id() {
    let db = Db::open_in_memory().unwrap();
    let conn = db.lock().await;

    let market = bare_market("mkt-3", 2);
    db::markets::insert_market(&conn, &market).unwrap();
    let bet = bare_bet("bet-3", "mkt-3", "DAVE", 0, 1, 10_000);
    db::bets::insert_bet(&conn, &bet).unwrap();
    let escrow = bare_escrow("esc-3", "bet-3", "mkt-3", EscrowStatus::Sweeping);
    db::escrows::insert_escrow(&conn, &escrow).unwrap();

    let confirmed = db::escrows::confirm_sweep_complete(&conn, "esc-3").unwrap();
    assert!(!confirmed);

    db::escrows::set_sweep_tx(&conn, "esc-3", "sweep-tx-1", 1234).unwrap();
    let confirmed = db::escrows::confirm_sweep_complete(&conn, "esc-3").unwrap();
    assert!(confirmed);
}

/// A `sweeping` escrow whose sweep transaction never landed (no
/// `sweep_tx_id`, idle past the orphan threshold) must revert back to
/// `won_awaiting_sweep` on the next recovery pass — without touching
/// chain, since this branch never needs a balance check.
#[tokio::test]
async fn recover_orphans_reverts_stuck_sweep_with_no_tx_id() {
    let db = Db::open_in_memory().unwrap();
    let mut conn = db.lock().await;
    let chain = ChainClient::new(vec![]);

    let market = bare_market("mkt-4", 2);
    db::markets::insert_market(&conn, &market).unwrap();
    let bet = bare_bet("bet-4", "mkt-4", "ERIN", 0, 1, 10_000);
    db::bets::insert_bet(&conn, &bet).unwrap();

    let mut escrow = bare_escrow("esc-4", "bet-4", "mkt-4", EscrowStatus::Sweeping);
    escrow.created_at = Utc::now() - Duration::minutes(30);
    db::escrows::insert_escrow(&conn, &escrow).unwrap();

    qpredict_engine::escrow::recover_orphans(&mut conn, &chain)
        .await
        .unwrap();

    let reverted = db::escrows::get_escrow(&conn, "esc-4").unwrap().unwrap();
    assert_eq!(reverted.status, EscrowStatus::WonAwaitingSweep);
    assert!(reverted.sweep_tx_id.is_none());
}

/// Spec scenario 5: tampering with one commitment-chain row's payload
/// after the fact must be detectable by `verify_chain_sequence`, which
/// should report the mutated row's sequence number.
#[tokio::test]
async fn commitment_chain_detects_tampering() {
    let db = Db::open_in_memory().unwrap();
    let conn = db.lock().await;

    proof::append_entry(
        &conn,
        EventType::MarketCreate,
        "mkt-5",
        &serde_json::json!({"question": "will it happen"}),
    )
    .unwrap();
    proof::append_entry(
        &conn,
        EventType::BetPlace,
        "bet-5",
        &serde_json::json!({"amount_qu": 10_000}),
    )
    .unwrap();
    proof::append_entry(
        &conn,
        EventType::MarketResolve,
        "mkt-5",
        &serde_json::json!({"winning_option": 0}),
    )
    .unwrap();

    let entries = db::chain_log::all_entries(&conn).unwrap();
    let verification = proof::verify_chain_sequence(&entries);
    assert!(verification.valid);

    conn.execute(
        "UPDATE commitment_chain SET payload_json = ?1 WHERE sequence_num = 2",
        rusqlite::params!["{\"amount_qu\":999999}"],
    )
    .unwrap();

    let tampered = db::chain_log::all_entries(&conn).unwrap();
    let verification = proof::verify_chain_sequence(&tampered);
    assert!(!verification.valid);
    assert_eq!(verification.broken_at, Some(2));
}

/// Spec scenario 6: a solvency proof over the spec's literal three-account
/// example must report the exact total and the right solvency verdict,
/// and a stored proof's Merkle root must still verify an inclusion proof
/// for one of the accounts.
#[tokio::test]
async fn solvency_proof_over_three_accounts_is_solvent_and_verifiable() {
    let db = Db::open_in_memory().unwrap();
    let conn = db.lock().await;

    let accounts = vec![
        ("addr-a".to_string(), 1000i64),
        ("addr-b".to_string(), 2500i64),
        ("addr-c".to_string(), 500i64),
    ];
    let total_user_balance: i64 = accounts.iter().map(|(_, b)| b).sum();
    let levels = proof::build_merkle_tree(&accounts);
    let root = levels.last().unwrap()[0].clone();

    let on_chain_balance = 4_000i64;
    let proof_record = SolvencyProof {
        merkle_root: root.clone(),
        total_user_balance,
        on_chain_balance,
        is_solvent: on_chain_balance >= total_user_balance,
        account_count: accounts.len() as u64,
        tick: 1,
        epoch: 1,
        leaves: accounts.iter().map(|(a, b)| format!("{a}|{b}")).collect(),
    };
    db::solvency::insert_proof(&conn, &proof_record).unwrap();

    let latest = db::solvency::latest_proof(&conn).unwrap().unwrap();
    assert_eq!(latest.total_user_balance, 4_000);
    assert!(latest.is_solvent);
    assert_eq!(latest.merkle_root, root);

    let mut sorted = accounts.clone();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let b_index = sorted.iter().position(|(a, _)| a == "addr-b").unwrap();
    let b_leaf = proof::sha256_hex(b"addr-b|2500");
    let steps = proof::inclusion_proof(&levels, b_index);
    assert!(proof::merkle::verify_inclusion(&b_leaf, &steps, &latest.merkle_root));
}

/// A deposit confirmation that would overflow an option's slot capacity
/// must be rejected, and must leave the market's pool/slot map untouched
/// (the ghost-bet prevention rule, spec.md §3 invariant 5).
#[tokio::test]
async fn confirm_bet_deposit_rejects_slot_exhaustion() {
    let db = Db::open_in_memory().unwrap();
    let mut conn = db.lock().await;

    let mut market = bare_market("mkt-6", 2);
    market.max_slots_per_option = 2;
    market.slot_map = vec![2, 0];
    db::markets::insert_market(&conn, &market).unwrap();

    let mut bet = bare_bet("bet-6", "mkt-6", "FRANK", 0, 1, 10_000);
    bet.status = BetStatus::PendingDeposit;
    db::bets::insert_bet(&conn, &bet).unwrap();

    let confirmed = db::bets::confirm_bet_deposit(&mut conn, "bet-6", "tx-frank").unwrap();
    assert!(!confirmed);

    let still_pending = db::bets::get_bet(&conn, "bet-6").unwrap().unwrap();
    assert_eq!(still_pending.status, BetStatus::PendingDeposit);

    let market_after = db::markets::get_market(&conn, "mkt-6").unwrap().unwrap();
    assert_eq!(market_after.total_pool, 0);
    assert_eq!(market_after.slot_map, vec![2, 0]);
}

/// A deposit confirmation with available capacity must flip the bet to
/// `pending` and bump the market's pool/slot map in the same write.
#[tokio::test]
async fn confirm_bet_deposit_accepts_when_capacity_available() {
    let db = Db::open_in_memory().unwrap();
    let mut conn = db.lock().await;

    let market = bare_market("mkt-7", 2);
    db::markets::insert_market(&conn, &market).unwrap();

    let mut bet = bare_bet("bet-7", "mkt-7", "GRACE", 0, 2, 20_000);
    bet.status = BetStatus::PendingDeposit;
    db::bets::insert_bet(&conn, &bet).unwrap();

    let confirmed = db::bets::confirm_bet_deposit(&mut conn, "bet-7", "tx-grace").unwrap();
    assert!(confirmed);

    let updated = db::bets::get_bet(&conn, "bet-7").unwrap().unwrap();
    assert_eq!(updated.status, BetStatus::Pending);

    let market_after = db::markets::get_market(&conn, "mkt-7").unwrap().unwrap();
    assert_eq!(market_after.total_pool, 20_000);
    assert_eq!(market_after.slot_map, vec![2, 0]);
}

/// Archiving a key must overwrite its ciphertext/iv/tag with fresh bytes
/// of equal length in the same write that flips the status, so the
/// pre-archive material is never retrievable again (spec.md §4.8).
#[tokio::test]
async fn archive_key_overwrites_material_and_breaks_decryption() {
    let db = Db::open_in_memory().unwrap();
    let conn = db.lock().await;

    let master_key = qpredict_engine::vault::derive_master_key("test-operator-secret");
    let seed = qpredict_engine::vault::generate_seed();
    let encrypted = qpredict_engine::vault::encrypt_seed(&seed, &master_key).unwrap();

    let key = EscrowKey {
        escrow_id: "esc-8".to_string(),
        ciphertext_hex: encrypted.ciphertext_hex.clone(),
        iv_hex: encrypted.iv_hex.clone(),
        tag_hex: encrypted.tag_hex.clone(),
        status: KeyStatus::Active,
    };
    db::keys::insert_key(&conn, &key).unwrap();

    db::keys::archive_key(&conn, "esc-8").unwrap();

    let archived = db::keys::get_key(&conn, "esc-8").unwrap().unwrap();
    assert_eq!(archived.status, KeyStatus::Archived);
    assert_ne!(archived.ciphertext_hex, encrypted.ciphertext_hex);
    assert_ne!(archived.iv_hex, encrypted.iv_hex);
    assert_ne!(archived.tag_hex, encrypted.tag_hex);
    assert_eq!(archived.ciphertext_hex.len(), encrypted.ciphertext_hex.len());

    let archived_enc = qpredict_engine::vault::EncryptedSeed {
        ciphertext_hex: archived.ciphertext_hex,
        iv_hex: archived.iv_hex,
        tag_hex: archived.tag_hex,
    };
    assert!(qpredict_engine::vault::decrypt_seed(&archived_enc, &master_key).is_err());
}

/// A `custom` market whose creator never calls in must be cancelled once
/// its `auto_refund_at` fallback (end + 48h) comes due, even though
/// nothing else ever flags it as stuck (spec.md §6).
#[tokio::test]
async fn stuck_market_recovery_cancels_past_auto_refund_deadline() {
    let db = Db::open_in_memory().unwrap();
    let mut conn = db.lock().await;
    let config = test_config();
    let chain = ChainClient::new(vec![]);

    let mut market = bare_market("mkt-10", 2);
    market.market_type = MarketType::Custom;
    market.status = MarketStatus::Active;
    market.auto_refund_at = Some(Utc::now() - Duration::hours(1));
    db::markets::insert_market(&conn, &market).unwrap();

    qpredict_engine::recovery::recover_stuck_markets(&mut conn, &chain, &config)
        .await
        .unwrap();

    let after = db::markets::get_market(&conn, "mkt-10").unwrap().unwrap();
    assert_eq!(after.status, MarketStatus::Cancelled);
}

/// Cancelling a market whose bets never left `pending_deposit` must mark
/// them refunded without ever touching an account balance (they never
/// contributed to the pool to begin with).
#[tokio::test]
async fn cancel_market_refunds_pending_deposit_bets_without_escrow() {
    let db = Db::open_in_memory().unwrap();
    let mut conn = db.lock().await;
    let config = test_config();
    let chain = ChainClient::new(vec![]);

    let market = bare_market("mkt-9", 2);
    db::markets::insert_market(&conn, &market).unwrap();

    let mut bet = bare_bet("bet-9", "mkt-9", "HEIDI", 0, 1, 10_000);
    bet.status = BetStatus::PendingDeposit;
    db::bets::insert_bet(&conn, &bet).unwrap();

    qpredict_engine::market::cancel_market(&mut conn, &chain, &config, "mkt-9")
        .await
        .unwrap();

    let cancelled = db::markets::get_market(&conn, "mkt-9").unwrap().unwrap();
    assert_eq!(cancelled.status, MarketStatus::Cancelled);

    let refunded_bet = db::bets::get_bet(&conn, "bet-9").unwrap().unwrap();
    assert_eq!(refunded_bet.status, BetStatus::Refunded);

    let heidi = db::accounts::get_account(&conn, "HEIDI").unwrap();
    assert!(heidi.is_none());
}
