use alloy::providers::Provider;
use alloy::sol;
use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::chains::ChainState;

sol! {
    #[sol(rpc)]
    contract AggregatorV3 {
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound);
        function decimals() external view returns (uint8);
    }
}

/// Re-convert the USD-denominated alert threshold into native units using the
/// chain's Chainlink native/USD aggregator, and publish a new snapshot.
///
/// On failure the previous snapshot stays in effect (stale but valid).
pub async fn refresh_native_threshold<P: Provider>(
    provider: &P,
    chain: &ChainState,
    min_usd_threshold: &BigDecimal,
) -> eyre::Result<()> {
    let snapshot = chain.current();
    let aggregator = AggregatorV3::new(snapshot.native_usd_aggregator, provider);

    let round = aggregator.latestRoundData().call().await?;
    let decimals = aggregator.decimals().call().await?;

    let answer = BigDecimal::from_str(&round.answer.to_string())
        .map_err(|e| eyre::eyre!("Unparseable aggregator answer: {}", e))?;
    let threshold = native_threshold_from_answer(min_usd_threshold, &answer, decimals)?;

    tracing::info!(
        chain_id = snapshot.chain_id,
        threshold = %threshold,
        "Native alert threshold refreshed"
    );
    chain.set_min_native_threshold(threshold);
    Ok(())
}

/// `min_usd / (answer / 10^decimals)`, rounded to 2 decimal places.
fn native_threshold_from_answer(
    min_usd: &BigDecimal,
    answer: &BigDecimal,
    decimals: u8,
) -> eyre::Result<BigDecimal> {
    if *answer <= BigDecimal::zero() {
        return Err(eyre::eyre!("Aggregator reported non-positive price"));
    }
    // The answer is a fixed-point integer scaled by 10^decimals; the scaling
    // is exact for every value a uint8 decimals response can carry.
    let price = answer * BigDecimal::new(BigInt::from(1), i64::from(decimals));
    Ok((min_usd / price).with_scale_round(2, RoundingMode::HalfUp))
}

/// Periodic refresh task. Shares only its cadence with the eviction sweep;
/// the two communicate exclusively through the chain snapshot.
pub async fn run_threshold_refresh<P: Provider>(
    provider: P,
    chain: Arc<ChainState>,
    min_usd_threshold: BigDecimal,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    // The first tick fires immediately and seeds the native threshold.
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) =
                    refresh_native_threshold(&provider, &chain, &min_usd_threshold).await
                {
                    tracing::warn!(
                        chain_id = chain.current().chain_id,
                        error = %e,
                        "Threshold refresh failed, keeping previous value"
                    );
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}
