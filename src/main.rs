use multiwallet::api::server;
use multiwallet::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    log::info!(
        "Starting multi-chain wallet backend on {} ({} ledger(s) configured)",
        config.bind_address,
        config.chains.len()
    );

    server::start_server(config).await?;
    Ok(())
}
