use thiserror::Error;

/// Error classification per the error-handling design: every variant here
/// is tagged with the kind of failure it represents so callers (the cron
/// orchestrator in particular) can decide whether to retry, freeze an
/// entity, or surface an alert without re-deriving that policy at each
/// call site.
#[derive(Error, Debug)]
pub enum EngineError {
    // ── Persistence ──────────────────────────────────────────
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("database open failed: {0}")]
    DbOpen(String),

    // ── Transient RPC ────────────────────────────────────────
    #[error("rpc call to {endpoint} failed: {source}")]
    RpcTransient {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("rpc call timed out after {0:?}")]
    RpcTimeout(std::time::Duration),

    #[error("circuit breaker is open, call blocked")]
    CircuitOpen,

    #[error("no healthy rpc endpoint in ring")]
    NoHealthyEndpoint,

    #[error("malformed rpc response: {0}")]
    RpcDecode(String),

    // ── Domain invariant ─────────────────────────────────────
    #[error("slots exhausted for option {option} on market {market_id}")]
    SlotsExhausted { market_id: String, option: u8 },

    #[error("insufficient on-chain balance: have {have}, need {need}")]
    InsufficientBalance { have: i64, need: i64 },

    #[error("entity {0} is not in the expected state for this transition")]
    InvalidStateTransition(String),

    #[error("amount {0} exceeds the safe-integer bound 2^53-1")]
    AmountOverflow(i64),

    #[error("arithmetic overflow computing {0}")]
    Arithmetic(&'static str),

    #[error("invalid market parameters: {0}")]
    InvalidMarketParams(String),

    #[error("date {0} is out of the packable range 2024-2087")]
    DateOutOfRange(i32),

    // ── Cryptographic ────────────────────────────────────────
    #[error("AEAD operation failed")]
    CryptoAead,

    #[error("seed does not match the expected 55-lowercase-letter format")]
    InvalidSeedFormat,

    #[error("HMAC signature verification failed")]
    SignatureMismatch,

    #[error("commitment hash mismatch for {0}")]
    CommitmentMismatch(String),

    #[error("commitment chain broken at sequence {0}")]
    ChainBroken(i64),

    // ── Operational ──────────────────────────────────────────
    #[error("backup failed: {0}")]
    Backup(String),

    #[error("alert delivery failed: {0}")]
    AlertDelivery(String),

    // ── Fatal ────────────────────────────────────────────────
    #[error("required configuration {0} is missing")]
    MissingConfig(&'static str),

    #[error("solvency violation on market {0}: payouts exceed pool")]
    SolvencyViolation(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Coarse classification used by the cron orchestrator to decide whether a
/// phase error should trip the circuit breaker, freeze an entity, or just
/// get logged and skipped. Mirrors the error-kind table in the design doc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientRpc,
    DomainInvariant,
    Cryptographic,
    Operational,
    Fatal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::RpcTransient { .. }
            | EngineError::RpcTimeout(_)
            | EngineError::CircuitOpen
            | EngineError::NoHealthyEndpoint
            | EngineError::RpcDecode(_) => ErrorKind::TransientRpc,

            EngineError::SlotsExhausted { .. }
            | EngineError::InsufficientBalance { .. }
            | EngineError::InvalidStateTransition(_)
            | EngineError::AmountOverflow(_)
            | EngineError::Arithmetic(_)
            | EngineError::InvalidMarketParams(_)
            | EngineError::DateOutOfRange(_) => ErrorKind::DomainInvariant,

            EngineError::CryptoAead
            | EngineError::InvalidSeedFormat
            | EngineError::SignatureMismatch
            | EngineError::CommitmentMismatch(_)
            | EngineError::ChainBroken(_) => ErrorKind::Cryptographic,

            EngineError::Backup(_) | EngineError::AlertDelivery(_) => ErrorKind::Operational,

            EngineError::MissingConfig(_)
            | EngineError::SolvencyViolation(_)
            | EngineError::Db(_)
            | EngineError::DbOpen(_)
            | EngineError::Serde(_)
            | EngineError::NotFound(_) => ErrorKind::Fatal,
        }
    }
}
