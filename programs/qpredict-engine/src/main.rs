use qpredict_engine::chain::ChainClient;
use qpredict_engine::cron::Orchestrator;
use qpredict_engine::oracle::OracleDispatcher;
use qpredict_engine::{Config, Db};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("qpredict-engine starting");

    let db = Arc::new(Db::open(&config.db_path)?);
    let chain = Arc::new(ChainClient::new(config.qubic_rpc_urls.clone()));
    let oracle = Arc::new(OracleDispatcher::new(&config));
    let config = Arc::new(config);

    let orchestrator = Orchestrator::new(db, chain, oracle, config);
    let shutting_down = orchestrator.shutdown_flag();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
            return;
        }
        info!("shutdown signal received, draining in-flight cycle");
        shutting_down.store(true, Ordering::SeqCst);
    });

    orchestrator.run().await;

    info!("qpredict-engine stopped");
    Ok(())
}
