pub mod account;
pub mod bet;
pub mod chain_log;
pub mod escrow;
pub mod escrow_key;
pub mod ledger;
pub mod market;
pub mod oracle;
pub mod solvency;

pub use account::Account;
pub use bet::{Bet, BetStatus};
pub use chain_log::{ChainEntry, EventType};
pub use escrow::{Escrow, EscrowStatus};
pub use escrow_key::{EscrowKey, KeyStatus};
pub use ledger::{LedgerTransaction, TransactionType};
pub use market::{Market, MarketStatus, MarketType, ResolutionSpec, ResolutionType};
pub use oracle::OracleAttestation;
pub use solvency::SolvencyProof;

/// QU is carried as a signed 64-bit integer everywhere past the wire
/// boundary. SQLite's INTEGER column is 8 bytes, so this never truncates;
/// the `2^53 - 1` bound from spec.md is a business rule enforced at the
/// specific crossings the spec names (see `crate::errors::EngineError::AmountOverflow`),
/// not a storage limitation.
pub type Qu = i64;

/// Safe-integer bound inherited from the spec's JavaScript-origin data
/// model. Amounts are rejected, not silently truncated, past this point.
pub const MAX_SAFE_QU: i64 = (1i64 << 53) - 1;

pub fn random_id(prefix: &str) -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..20)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{prefix}_{suffix}")
}
