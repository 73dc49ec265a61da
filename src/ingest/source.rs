use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::BlockNumberOrTag;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::chains::ChainState;
use crate::config::ChainConfig;
use crate::detector::alert::SwapCounters;
use crate::detector::engine::{DetectionSettings, SwapEngine};
use crate::detector::receipt::ChainProvider;
use crate::findings;
use crate::ingest::decoder;
use crate::ingest::types::TxEvent;
use crate::provider::RpcChainProvider;

/// Main entry point for a single chain's detector task.
/// Subscribes to new blocks (WebSocket when available, HTTP polling
/// otherwise) and feeds every transaction to the detection engine in order.
pub async fn run_chain_detector(
    config: ChainConfig,
    chain: Arc<ChainState>,
    counters: Arc<SwapCounters>,
    settings: DetectionSettings,
    provider_timeout: Duration,
    shutdown: CancellationToken,
) -> eyre::Result<()> {
    tracing::info!(chain = %config.name, chain_id = config.chain_id, "Starting chain detector");

    let url = config
        .rpc_http
        .parse()
        .map_err(|e| eyre::eyre!("Invalid RPC URL: {}", e))?;
    let http = ProviderBuilder::new().connect_http(url);

    let mut engine = SwapEngine::new(
        RpcChainProvider::new(http.clone(), provider_timeout),
        chain,
        counters,
        settings,
    );

    if let Some(ws_url) = config.rpc_ws.clone() {
        match watch_blocks_ws(&config, &ws_url, &http, &mut engine, &shutdown).await {
            Ok(StreamOutcome::Shutdown) => return Ok(()),
            Ok(StreamOutcome::StreamEnded) => {
                tracing::warn!(
                    chain = %config.name,
                    "Block stream ended, falling back to HTTP polling"
                );
            }
            Err(e) => {
                tracing::warn!(
                    chain = %config.name,
                    error = %e,
                    "WebSocket connection failed, falling back to HTTP polling"
                );
            }
        }
    }

    poll_blocks_http(&config, &http, &mut engine, &shutdown).await
}

/// How a block stream terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamOutcome {
    /// Shutdown was requested; the detector is done.
    Shutdown,
    /// The subscription ended on its own; the caller falls back to HTTP
    /// polling rather than stop watching the chain.
    StreamEnded,
}

/// Consumer of (block number, timestamp) pairs pulled off a block stream.
trait BlockSink {
    fn on_block(
        &mut self,
        block_number: u64,
        timestamp: u64,
    ) -> impl std::future::Future<Output = eyre::Result<()>> + Send;
}

struct EngineSink<'a, P, Q> {
    provider: &'a P,
    config: &'a ChainConfig,
    engine: &'a mut SwapEngine<Q>,
}

impl<P: Provider, Q: ChainProvider + Send + Sync> BlockSink for EngineSink<'_, P, Q> {
    async fn on_block(&mut self, block_number: u64, timestamp: u64) -> eyre::Result<()> {
        process_block(self.provider, self.config, self.engine, block_number, timestamp).await
    }
}

/// Block subscription via WebSocket; receipts are fetched over HTTP.
async fn watch_blocks_ws<P: Provider, Q: ChainProvider + Send + Sync>(
    config: &ChainConfig,
    ws_url: &str,
    receipts: &P,
    engine: &mut SwapEngine<Q>,
    shutdown: &CancellationToken,
) -> eyre::Result<StreamOutcome> {
    let ws = WsConnect::new(ws_url);
    let provider = ProviderBuilder::new().connect_ws(ws).await?;

    let sub = provider.subscribe_blocks().await?;
    let stream = sub
        .into_stream()
        .map(|header| (header.number, header.timestamp));

    tracing::info!(chain = %config.name, "WebSocket block subscription active");

    let mut sink = EngineSink {
        provider: receipts,
        config,
        engine,
    };
    let outcome = drain_block_stream(stream, &mut sink, shutdown).await;
    if outcome == StreamOutcome::Shutdown {
        tracing::info!(chain = %config.name, "Shutdown received, stopping detector");
    }
    Ok(outcome)
}

/// Pull blocks off the stream until it ends or shutdown is requested.
/// Processing failures are logged and skipped; they never end the stream.
async fn drain_block_stream<S, K>(
    mut stream: S,
    sink: &mut K,
    shutdown: &CancellationToken,
) -> StreamOutcome
where
    S: Stream<Item = (u64, u64)> + Unpin,
    K: BlockSink,
{
    loop {
        tokio::select! {
            maybe_block = stream.next() => {
                match maybe_block {
                    Some((block_number, timestamp)) => {
                        if let Err(e) = sink.on_block(block_number, timestamp).await {
                            tracing::error!(
                                block = block_number,
                                error = %e,
                                "Failed to process block"
                            );
                        }
                    }
                    None => return StreamOutcome::StreamEnded,
                }
            }
            _ = shutdown.cancelled() => return StreamOutcome::Shutdown,
        }
    }
}

/// HTTP polling fallback, used when no WebSocket endpoint is configured or
/// the subscription drops.
async fn poll_blocks_http<P: Provider, Q: ChainProvider>(
    config: &ChainConfig,
    provider: &P,
    engine: &mut SwapEngine<Q>,
    shutdown: &CancellationToken,
) -> eyre::Result<()> {
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let mut last_block = retry_rpc(|| provider.get_block_number()).await?;

    tracing::info!(
        chain = %config.name,
        poll_interval_ms = config.poll_interval_ms,
        last_block,
        "HTTP polling active"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = shutdown.cancelled() => {
                tracing::info!(chain = %config.name, "Shutdown received, stopping poller");
                break;
            }
        }

        let current = match retry_rpc(|| provider.get_block_number()).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(chain = %config.name, error = %e, "Failed to get block number");
                continue;
            }
        };

        if current <= last_block {
            continue;
        }

        for block_num in (last_block + 1)..=current {
            if shutdown.is_cancelled() {
                break;
            }

            let block = retry_rpc(|| async {
                provider
                    .get_block_by_number(BlockNumberOrTag::Number(block_num))
                    .await
            })
            .await?;

            if let Some(block) = block {
                if let Err(e) = process_block(
                    provider,
                    config,
                    engine,
                    block.header.number,
                    block.header.timestamp,
                )
                .await
                {
                    tracing::error!(
                        chain = %config.name,
                        block = block_num,
                        error = %e,
                        "Failed to process block"
                    );
                }
            }
        }

        last_block = current;
    }

    Ok(())
}

/// Fetch one block's receipts, decode each transaction's logs, and feed them
/// to the engine in blockchain order.
async fn process_block<P: Provider, Q: ChainProvider>(
    provider: &P,
    config: &ChainConfig,
    engine: &mut SwapEngine<Q>,
    block_number: u64,
    timestamp: u64,
) -> eyre::Result<()> {
    let receipts =
        retry_rpc(|| async { provider.get_block_receipts(block_number.into()).await }).await?;
    let receipts = match receipts {
        Some(receipts) => receipts,
        None => {
            tracing::debug!(chain = %config.name, block = block_number, "No receipts yet");
            return Ok(());
        }
    };

    let mut alerts_raised = 0usize;
    for receipt in &receipts {
        let (transfers, withdrawals) = decoder::decode_receipt_logs(receipt.inner.logs());

        let tx = TxEvent {
            chain_id: config.chain_id,
            sender: receipt.from,
            tx_hash: receipt.transaction_hash,
            block_number,
            timestamp,
            transfers,
            withdrawals,
        };

        let alerts = engine.process(tx).await?;
        for alert in &alerts {
            findings::emit(alert);
        }
        alerts_raised += alerts.len();
    }

    tracing::debug!(
        chain = %config.name,
        block = block_number,
        transactions = receipts.len(),
        alerts = alerts_raised,
        "Processed block"
    );

    Ok(())
}

/// Retry an async operation with exponential backoff.
/// Only used for block and receipt fetches; the engine's nonce and balance
/// queries are never retried so the swap counter cannot double-increment.
pub async fn retry_rpc<F, Fut, T, E>(mut f: F) -> eyre::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = Duration::from_millis(500);
    let max_retries = 5;

    for attempt in 0..max_retries {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "RPC call failed, retrying..."
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }
        }
    }

    f().await
        .map_err(|e| eyre::eyre!("RPC call failed after {} retries: {}", max_retries, e))
}
