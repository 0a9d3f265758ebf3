//! Cron orchestrator (spec.md §4.4): a single process-global driver
//! with a fast cycle (default 15 s) and a slow cycle (default 6 h). The
//! fast cycle runs every phase named in the spec's phase table in
//! order; each phase catches and records its own errors so one bad
//! phase never aborts the cycle, and RPC-bearing phases are skipped
//! wholesale while the chain breaker is open.

use crate::chain::ChainClient;
use crate::config::Config;
use crate::db::Db;
use crate::errors::EngineResult;
use crate::oracle::OracleDispatcher;
use crate::{db, escrow, market, recovery};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const LOCK_TTL_SECS: i64 = 30;
const SHUTDOWN_DRAIN_BUDGET: Duration = Duration::from_secs(30);
const NONCE_RETENTION_HOURS: i64 = 24;
const IDEMPOTENCY_RETENTION_HOURS: i64 = 24;

/// Orchestrator state shared between the fast-cycle loop and whatever
/// installs the shutdown signal handler.
pub struct Orchestrator {
    db: Arc<Db>,
    chain: Arc<ChainClient>,
    oracle: Arc<OracleDispatcher>,
    config: Arc<Config>,
    holder_id: String,
    shutting_down: Arc<AtomicBool>,
    cycle_count: AtomicU64,
    backup_every_n_cycles: u64,
}

impl Orchestrator {
    pub fn new(db: Arc<Db>, chain: Arc<ChainClient>, oracle: Arc<OracleDispatcher>, config: Arc<Config>) -> Self {
        Orchestrator {
            db,
            chain,
            oracle,
            config,
            holder_id: crate::state::random_id("cron"),
            shutting_down: Arc::new(AtomicBool::new(false)),
            cycle_count: AtomicU64::new(0),
            backup_every_n_cycles: 240, // roughly hourly at the default 15s cadence
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutting_down.clone()
    }

    /// Runs fast and slow cycles on their own intervals until
    /// `shutting_down` is set, then drains the in-flight cycle up to
    /// the drain budget before returning.
    pub async fn run(&self) {
        let mut fast_ticker = tokio::time::interval(Duration::from_millis(self.config.fast_cycle_ms));
        let mut slow_ticker = tokio::time::interval(Duration::from_millis(self.config.slow_cycle_ms));
        fast_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        slow_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = fast_ticker.tick() => {
                    let drain = tokio::time::timeout(SHUTDOWN_DRAIN_BUDGET, self.run_fast_cycle());
                    if drain.await.is_err() {
                        warn!("fast cycle exceeded shutdown drain budget");
                    }
                }
                _ = slow_ticker.tick() => {
                    self.run_slow_cycle().await;
                }
            }
        }
        info!("cron orchestrator shut down");
    }

    async fn run_fast_cycle(&self) {
        let expires_at = crate::time::now() + chrono::Duration::seconds(LOCK_TTL_SECS);
        let acquired = {
            let conn = self.db.lock().await;
            db::cron_lock::acquire(&conn, &self.holder_id, expires_at).unwrap_or(false)
        };
        if !acquired {
            return;
        }

        self.cycle_count.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.run_phases().await {
            error!(error = %e, "fast cycle phase runner returned an error");
        }

        let conn = self.db.lock().await;
        if let Err(e) = db::cron_lock::release(&conn, &self.holder_id) {
            warn!(error = %e, "failed to release cron lock");
        }
    }

    async fn run_phases(&self) -> EngineResult<()> {
        let rpc_healthy = self.chain.breaker.is_healthy();

        // Phase 0: repair commitment hashes / slot counts. No RPC.
        self.phase("0 repair", || async {
            let conn = self.db.lock().await;
            recovery::repair_markets(&conn)
        })
        .await;

        // Phase 0a: close expired betting. No RPC.
        self.phase("0a close expired betting", || async {
            let conn = self.db.lock().await;
            market::close_expired_betting(&conn)
        })
        .await;

        if rpc_healthy {
            // Phase 0d: stuck-market handler.
            self.phase("0d stuck markets", || async {
                let mut conn = self.db.lock().await;
                recovery::recover_stuck_markets(&mut conn, &self.chain, &self.config).await
            })
            .await;

            // Phase 0b: resolve expired markets via oracle adapters.
            self.phase("0b resolve expired markets", || async {
                let mut conn = self.db.lock().await;
                market::resolve_expired_markets(&mut conn, &self.chain, &self.config, &self.oracle).await
            })
            .await;

            // Phase 0c: discover pending bet-ids.
            self.phase("0c discover bet ids", || async {
                let mut conn = self.db.lock().await;
                market::discover_pending_bet_ids(&mut conn, &self.chain).await
            })
            .await;

            // Phase 1: check escrow deposits.
            self.phase("1 check deposits", || async {
                let mut conn = self.db.lock().await;
                escrow::check_deposits(&mut conn, &self.chain, &self.config).await
            })
            .await;

            // Phase 2: execute joinBet.
            self.phase("2 execute joins", || async {
                let mut conn = self.db.lock().await;
                escrow::execute_joins(&mut conn, &self.chain, &self.config).await
            })
            .await;

            // Phase 2b: verify joinBet confirmations.
            self.phase("2b verify joins", || async {
                let mut conn = self.db.lock().await;
                escrow::verify_join_confirmations(&mut conn, &self.chain, &self.config).await
            })
            .await;

            // Phase 3: check payouts on active_in_sc.
            self.phase("3 check payouts", || async {
                let mut conn = self.db.lock().await;
                escrow::check_payouts(&mut conn, &self.chain).await
            })
            .await;

            // Phase 4: execute sweeps.
            self.phase("4 execute sweeps", || async {
                let mut conn = self.db.lock().await;
                escrow::execute_sweeps(&mut conn, &self.chain, &self.config).await
            })
            .await;

            // Phase 4b: verify sweep confirmations.
            self.phase("4b verify sweeps", || async {
                let mut conn = self.db.lock().await;
                escrow::verify_sweep_confirmations(&mut conn, &self.chain, &self.config).await
            })
            .await;

            // Phase 5: handle expired escrows (balance check).
            self.phase("5 handle expired escrows", || async {
                let mut conn = self.db.lock().await;
                escrow::handle_expired_escrows(&mut conn, &self.chain, &self.config).await
            })
            .await;

            // Phase 6.5: orphan recovery.
            self.phase("6.5 orphan recovery", || async {
                let mut conn = self.db.lock().await;
                escrow::recover_orphans(&mut conn, &self.chain).await
            })
            .await;
        } else {
            warn!("chain circuit breaker open, skipping rpc-bearing phases this cycle");
        }

        // Phase 6: sweep nonce + idempotency tables. No RPC.
        self.phase("6 sweep tables", || async {
            let conn = self.db.lock().await;
            let cutoff_nonce = crate::time::now() - chrono::Duration::hours(NONCE_RETENTION_HOURS);
            let cutoff_idem = crate::time::now() - chrono::Duration::hours(IDEMPOTENCY_RETENTION_HOURS);
            db::nonce::sweep_expired(&conn, cutoff_nonce)?;
            db::idempotency::sweep_expired(&conn, cutoff_idem)?;
            Ok(())
        })
        .await;

        // Phase 7: periodic backup.
        let cycle_count = self.cycle_count.load(Ordering::SeqCst);
        if cycle_count % self.backup_every_n_cycles == 0 {
            self.phase("7 backup", || async { self.backup().await }).await;
        }

        Ok(())
    }

    /// Runs a phase closure, logging and swallowing any error so one
    /// phase's failure never aborts the rest of the cycle (spec.md §4.4).
    async fn phase<F, Fut>(&self, name: &str, f: F)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = EngineResult<()>>,
    {
        if let Err(e) = f().await {
            warn!(phase = name, error = %e, "cron phase failed");
        }
    }

    async fn run_slow_cycle(&self) {
        // Out-of-scope trending-market scan lives here (spec.md §4.4);
        // nothing else currently runs on the slow cadence.
        info!("slow cycle tick (no-op: trending-market scan is out of scope)");
    }

    async fn backup(&self) -> EngineResult<()> {
        let source = &self.config.db_path;
        if source == ":memory:" {
            return Ok(());
        }
        let backup_path = format!("{source}.bak");
        match tokio::fs::copy(source, &backup_path).await {
            Ok(_) => {
                info!(backup_path, "database backup complete");
                Ok(())
            }
            Err(e) => Err(crate::errors::EngineError::Backup(e.to_string())),
        }
    }
}
