use std::sync::Arc;
use std::time::Duration;

use alloy::providers::ProviderBuilder;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use swapwatch_detector::chains::ChainState;
use swapwatch_detector::config::Config;
use swapwatch_detector::detector::alert::SwapCounters;
use swapwatch_detector::ingest::source::run_chain_detector;
use swapwatch_detector::price::run_threshold_refresh;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=info for output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("SwapWatch Detector starting");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        chains = config.chains.len(),
        "Configuration loaded from {}",
        config_path
    );

    let settings = config.detection.settings();
    let min_usd_threshold = config.detection.min_usd_threshold_decimal()?;
    let provider_timeout = Duration::from_millis(config.provider.timeout_ms);
    let refresh_period = Duration::from_secs(config.detection.price_refresh_secs);

    // Process-wide counters behind the anomaly score, shared by all chains.
    let counters = Arc::new(SwapCounters::new());

    // Create shutdown signal
    let shutdown = CancellationToken::new();

    // Spawn one detector task (plus a threshold-refresh task) per chain
    let mut handles = Vec::new();
    for chain_config in config.chains {
        // Unknown chain ids fail here, before any task starts.
        let chain = ChainState::for_chain(chain_config.chain_id)?;
        chain.apply_overrides(
            chain_config.min_native_threshold_decimal()?,
            chain_config.receipt_strategy,
        );
        let chain = Arc::new(chain);
        tracing::info!(
            chain = %chain_config.name,
            threshold = %chain.current().min_native_threshold,
            strategy = ?chain.current().receipt_strategy,
            "Chain resolved"
        );

        let refresh_url = chain_config
            .rpc_http
            .parse()
            .map_err(|e| eyre::eyre!("Invalid RPC URL: {}", e))?;
        let refresh_provider = ProviderBuilder::new().connect_http(refresh_url);
        tokio::spawn(run_threshold_refresh(
            refresh_provider,
            chain.clone(),
            min_usd_threshold.clone(),
            refresh_period,
            shutdown.clone(),
        ));

        let counters = counters.clone();
        let shutdown = shutdown.clone();
        let settings = settings.clone();
        let chain_name = chain_config.name.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = run_chain_detector(
                chain_config,
                chain,
                counters,
                settings,
                provider_timeout,
                shutdown,
            )
            .await
            {
                tracing::error!(chain = %chain_name, error = %e, "Chain detector failed");
            }
        });

        handles.push(handle);
    }

    tracing::info!("All chain detectors started. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping all detectors...");
    shutdown.cancel();

    // Wait for all tasks to finish
    for handle in handles {
        let _ = handle.await;
    }

    tracing::info!(
        swaps_observed = counters.native_swaps(),
        alerts_raised = counters.alerts(),
        "SwapWatch Detector stopped gracefully"
    );
    Ok(())
}
