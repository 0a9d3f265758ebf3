//! Persistence (spec.md §4.1): a single SQLite file, WAL-mode, single
//! writer, busy_timeout >= 5s, foreign keys on. `Db` owns the one
//! connection the rest of the core shares; every multi-row mutation
//! that crosses an invariant line runs inside one `conn.transaction()`.

pub mod accounts;
pub mod bets;
pub mod chain_log;
pub mod cron_lock;
pub mod escrows;
pub mod idempotency;
pub mod keys;
pub mod ledger;
pub mod markets;
pub mod nonce;
pub mod oracle;
pub mod schema;
pub mod solvency;

use crate::errors::{EngineError, EngineResult};
use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

/// The shared connection is behind a `tokio::sync::Mutex` rather than
/// `std::sync::Mutex`: every cron phase holds the guard across the chain
/// RPC calls it makes between reading a row and writing the resulting
/// state transition, and a std guard held across `.await` is not `Send`
/// (spec.md §4.1's "single writer" requirement is what the lock is for,
/// not just the SQL statement in flight).
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open(path).map_err(|e| EngineError::DbOpen(e.to_string()))?;
        Self::configure(&conn)?;
        schema::migrate(&conn)?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| EngineError::DbOpen(e.to_string()))?;
        Self::configure(&conn)?;
        schema::migrate(&conn)?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    fn configure(conn: &Connection) -> EngineResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5_000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Locks the shared connection for the caller's exclusive use. The
    /// guard derefs to `&mut Connection`, so it can be held across the
    /// `.await` points a cron phase needs between a read and the write
    /// that claims the resulting state transition.
    pub async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
