use crate::errors::EngineResult;
use rusqlite::Connection;

/// Creates every table and index the core depends on. Idempotent —
/// `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS` so it is
/// safe to call on every process start.
pub fn migrate(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS markets (
            id TEXT PRIMARY KEY,
            on_chain_bet_id INTEGER NOT NULL DEFAULT 0,
            pair_or_topic TEXT NOT NULL,
            question TEXT NOT NULL,
            resolution_json TEXT NOT NULL,
            market_type TEXT NOT NULL,
            options_json TEXT NOT NULL,
            close_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            min_bet_qu INTEGER NOT NULL,
            max_slots_per_option INTEGER NOT NULL,
            total_pool INTEGER NOT NULL DEFAULT 0,
            slot_map_json TEXT NOT NULL,
            status TEXT NOT NULL,
            resolution_price REAL,
            winning_option INTEGER,
            creator_address TEXT NOT NULL,
            creation_tx TEXT,
            commitment_hash TEXT NOT NULL,
            oracle_addresses_json TEXT NOT NULL,
            oracle_fee_bps INTEGER NOT NULL DEFAULT 0,
            auto_refund_at TEXT,
            category TEXT NOT NULL DEFAULT '',
            ai_attempt_count INTEGER NOT NULL DEFAULT 0,
            ai_resolution_proof_json TEXT,
            provenance_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_markets_status ON markets(status);
        CREATE INDEX IF NOT EXISTS idx_markets_end_date ON markets(end_date);

        CREATE TABLE IF NOT EXISTS bets (
            id TEXT PRIMARY KEY,
            market_id TEXT NOT NULL REFERENCES markets(id),
            user_payout_address TEXT NOT NULL,
            option INTEGER NOT NULL,
            slots INTEGER NOT NULL,
            amount_qu INTEGER NOT NULL,
            on_chain_tx TEXT,
            status TEXT NOT NULL,
            payout_qu INTEGER,
            commitment_hash TEXT NOT NULL,
            commitment_nonce TEXT NOT NULL,
            user_signature TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bets_market_id ON bets(market_id);
        CREATE INDEX IF NOT EXISTS idx_bets_user_address ON bets(user_payout_address);

        CREATE TABLE IF NOT EXISTS escrows (
            id TEXT PRIMARY KEY,
            bet_id TEXT NOT NULL REFERENCES bets(id),
            market_id TEXT NOT NULL REFERENCES markets(id),
            escrow_address TEXT NOT NULL UNIQUE,
            user_payout_address TEXT NOT NULL,
            option INTEGER NOT NULL,
            slots INTEGER NOT NULL,
            expected_amount_qu INTEGER NOT NULL,
            status TEXT NOT NULL,
            deposit_detected_at TEXT,
            deposit_amount_qu INTEGER,
            join_tx_id TEXT,
            join_target_tick INTEGER,
            payout_detected_at TEXT,
            payout_amount_qu INTEGER,
            sweep_tx_id TEXT,
            sweep_target_tick INTEGER,
            join_retry_count INTEGER NOT NULL DEFAULT 0,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_escrows_status ON escrows(status);
        CREATE INDEX IF NOT EXISTS idx_escrows_market_id ON escrows(market_id);
        CREATE INDEX IF NOT EXISTS idx_escrows_bet_id ON escrows(bet_id);

        CREATE TABLE IF NOT EXISTS escrow_keys (
            escrow_id TEXT PRIMARY KEY REFERENCES escrows(id),
            ciphertext_hex TEXT NOT NULL,
            iv_hex TEXT NOT NULL,
            tag_hex TEXT NOT NULL,
            status TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS accounts (
            address TEXT PRIMARY KEY,
            display_name TEXT,
            balance_qu INTEGER NOT NULL DEFAULT 0,
            total_deposited_qu INTEGER NOT NULL DEFAULT 0,
            total_withdrawn_qu INTEGER NOT NULL DEFAULT 0,
            total_bet_qu INTEGER NOT NULL DEFAULT 0,
            total_won_qu INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS ledger_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount_qu INTEGER NOT NULL,
            tx_hash TEXT,
            market_id TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS commitment_chain (
            sequence_num INTEGER PRIMARY KEY,
            event_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            payload_hash TEXT NOT NULL,
            prev_hash TEXT NOT NULL,
            chain_hash TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chain_entity_id ON commitment_chain(entity_id);

        CREATE TABLE IF NOT EXISTS oracle_attestations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            market_id TEXT NOT NULL,
            source TEXT NOT NULL,
            pair TEXT NOT NULL,
            price REAL NOT NULL,
            tick INTEGER,
            epoch INTEGER,
            source_ts TEXT NOT NULL,
            attestation_hash TEXT NOT NULL,
            server_signature TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_oracle_attestations_market_id ON oracle_attestations(market_id);

        CREATE TABLE IF NOT EXISTS solvency_proofs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            merkle_root TEXT NOT NULL,
            total_user_balance INTEGER NOT NULL,
            on_chain_balance INTEGER NOT NULL,
            is_solvent INTEGER NOT NULL,
            account_count INTEGER NOT NULL,
            tick INTEGER NOT NULL,
            epoch INTEGER NOT NULL,
            leaves_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS nonces (
            address TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (address, endpoint)
        );
        CREATE INDEX IF NOT EXISTS idx_nonces_created_at ON nonces(created_at);

        CREATE TABLE IF NOT EXISTS idempotency_keys (
            key TEXT PRIMARY KEY,
            response_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cron_locks (
            name TEXT PRIMARY KEY,
            holder_id TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}
