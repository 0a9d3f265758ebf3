use crate::errors::{EngineError, EngineResult};

/// Process configuration, read once at startup from the environment (see
/// spec §6). `ESCROW_MASTER_KEY` is the only variable whose absence is
/// fatal — everything else has a documented default.
#[derive(Debug, Clone)]
pub struct Config {
    pub qubic_rpc_urls: Vec<String>,
    pub escrow_master_key: String,
    pub attestation_secret_key: String,
    pub master_identity: Option<String>,
    pub master_seed: Option<String>,
    pub fast_cycle_ms: u64,
    pub slow_cycle_ms: u64,
    pub escrow_expiry_hours: i64,
    pub joinbet_timeout_ticks: u32,
    pub sweep_timeout_ticks: u32,
    pub min_oracle_sources: usize,
    pub log_level: String,
    pub alert_webhook_url: Option<String>,
    pub alert_webhook_type: Option<String>,
    pub db_path: String,
    /// QUBIC_TX_FEE_QU — the source sets this to 0 (see spec.md §9 open
    /// question); kept as a config knob rather than a hardcoded constant
    /// so an operator who learns the chain's real dust behavior can
    /// correct it without a code change.
    pub qubic_tx_fee_qu: i64,

    // ── Oracle adapters (spec.md §6) ──────────────────────────
    pub price_oracle_urls: Vec<String>,
    pub sports_oracle_url: Option<String>,
    pub ai_council_url: Option<String>,
    pub ai_council_api_key: Option<String>,
    pub news_api_url: Option<String>,
    pub ai_max_attempts: u32,
    pub operator_address: String,
}

impl Config {
    pub fn from_env() -> EngineResult<Self> {
        let _ = dotenvy::dotenv();

        let escrow_master_key = std::env::var("ESCROW_MASTER_KEY")
            .map_err(|_| EngineError::MissingConfig("ESCROW_MASTER_KEY"))?;

        let qubic_rpc_urls = std::env::var("QUBIC_RPC_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:21841".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        Ok(Config {
            qubic_rpc_urls,
            escrow_master_key,
            attestation_secret_key: std::env::var("ATTESTATION_SECRET_KEY")
                .unwrap_or_else(|_| "dev-only-insecure-attestation-key".to_string()),
            master_identity: std::env::var("MASTER_IDENTITY").ok(),
            master_seed: std::env::var("MASTER_SEED").ok(),
            fast_cycle_ms: env_u64("ENGINE_FAST_CYCLE_MS", 15_000),
            slow_cycle_ms: env_u64("ENGINE_SLOW_CYCLE_MS", 6 * 60 * 60 * 1000),
            escrow_expiry_hours: env_i64("ESCROW_EXPIRY_HOURS", 2),
            joinbet_timeout_ticks: env_u64("JOINBET_TIMEOUT_TICKS", 600) as u32,
            sweep_timeout_ticks: env_u64("SWEEP_TIMEOUT_TICKS", 300) as u32,
            min_oracle_sources: env_u64("MIN_ORACLE_SOURCES", 2) as usize,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL").ok(),
            alert_webhook_type: std::env::var("ALERT_WEBHOOK_TYPE").ok(),
            db_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "qpredict.sqlite3".to_string()),
            qubic_tx_fee_qu: env_i64("QUBIC_TX_FEE_QU", 0),
            price_oracle_urls: std::env::var("PRICE_ORACLE_URLS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            sports_oracle_url: std::env::var("SPORTS_ORACLE_URL").ok(),
            ai_council_url: std::env::var("AI_COUNCIL_URL").ok(),
            ai_council_api_key: std::env::var("AI_COUNCIL_API_KEY").ok(),
            news_api_url: std::env::var("NEWS_API_URL").ok(),
            ai_max_attempts: env_u64("AI_MAX_ATTEMPTS", 3) as u32,
            operator_address: std::env::var("OPERATOR_ADDRESS").unwrap_or_default(),
        })
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}
