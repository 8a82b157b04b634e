// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::time::Duration;

use ethers::providers::Middleware;
use ethers::types::{Filter, ValueOrArray};
use wallet_activator_config::event_watcher::EventsWatcherConfig;
use wallet_activator_store::{HistoryStore, HistoryStoreKey};
use wallet_activator_types::Chain;
use wallet_activator_utils::metric::Metrics;
use wallet_activator_utils::{probe, Error, Result};

use crate::{ChainLog, EventRegistry};

/// Returns the next inclusive block range to query after `last`, bounded by
/// `target` and at most `step` blocks wide, or `None` when already synced.
pub fn next_range(last: u64, target: u64, step: u64) -> Option<(u64, u64)> {
    if last >= target {
        return None;
    }
    let to = last.saturating_add(step.max(1)).min(target);
    Some((last + 1, to))
}

async fn confirmed_head<M: Middleware>(
    client: &M,
    block_confirmations: u8,
) -> Result<u64> {
    let head = client
        .get_block_number()
        .await
        .map_err(|e| Error::Middleware(e.to_string()))?;
    Ok(head.as_u64().saturating_sub(u64::from(block_confirmations)))
}

/// A trait for polling the logs of a chain and feeding them to an
/// [`EventRegistry`].
#[async_trait::async_trait]
pub trait EventWatcher: Send + Sync {
    /// A Helper tag used to identify the logs watcher during the logs,
    /// also part of the key its progress is stored under.
    const TAG: &'static str;
    /// The Storage backend that keeps the last processed block.
    type Store: HistoryStore + 'static;

    /// Returns a task that should be running in the background
    /// that will watch logs.
    ///
    /// Only blocks at least `block_confirmations` deep are queried. RPC
    /// failures, and logs no handler could process, restart the loop from the
    /// last stored block with an exponential backoff.
    #[tracing::instrument(
        skip_all,
        fields(
            chain = %chain,
            tag = %Self::TAG,
        ),
    )]
    #[allow(clippy::too_many_arguments)]
    async fn run<M>(
        &self,
        chain: Chain,
        client: Arc<M>,
        store: Arc<Self::Store>,
        config: EventsWatcherConfig,
        block_confirmations: u8,
        registry: Arc<EventRegistry>,
        metrics: Arc<Metrics>,
    ) -> Result<()>
    where
        M: Middleware + 'static,
    {
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: None,
            ..Default::default()
        };
        let history_store_key = HistoryStoreKey::new(chain.clone(), Self::TAG);
        let polling_interval = Duration::from_millis(config.polling_interval);
        let print_progress_interval =
            Duration::from_millis(config.print_progress_interval);

        let task = || async {
            // saves the last time we printed sync progress.
            let mut instant = std::time::Instant::now();
            let mut target_block_number =
                confirmed_head(client.as_ref(), block_confirmations)
                    .await
                    .map_err(backoff::Error::transient)?;
            // a fresh watcher without a start block starts at the head.
            let default_last_block = config
                .sync_blocks_from
                .map(|b| b.saturating_sub(1))
                .unwrap_or(target_block_number);

            loop {
                let block = store.get_last_block_number(
                    history_store_key.clone(),
                    default_last_block,
                )?;
                let signatures = registry.signatures();
                let range = next_range(
                    block,
                    target_block_number,
                    config.max_blocks_per_step,
                );
                let Some((from_block, dest_block)) =
                    range.filter(|_| !signatures.is_empty())
                else {
                    tracing::trace!(
                        "Cooldown a bit for {}ms",
                        polling_interval.as_millis()
                    );
                    tokio::time::sleep(polling_interval).await;
                    target_block_number =
                        confirmed_head(client.as_ref(), block_confirmations)
                            .await
                            .map_err(backoff::Error::transient)?;
                    continue;
                };

                let topic0 = ValueOrArray::Array(
                    signatures.into_iter().map(Some).collect::<Vec<_>>(),
                );
                let filter = Filter::new()
                    .from_block(from_block)
                    .to_block(dest_block)
                    .topic0(topic0);
                let found_logs = client
                    .get_logs(&filter)
                    .await
                    .map_err(|e| Error::Middleware(e.to_string()))
                    .map_err(backoff::Error::transient)?;
                tracing::trace!("Found #{} logs", found_logs.len());

                for log in found_logs {
                    if log.removed == Some(true) {
                        continue;
                    }
                    registry
                        .dispatch(&ChainLog::new(chain.clone(), log))
                        .await
                        .map_err(backoff::Error::transient)?;
                }

                // move the block pointer to the destination block
                store.set_last_block_number(
                    history_store_key.clone(),
                    dest_block,
                )?;

                if print_progress_interval != Duration::from_millis(0)
                    && instant.elapsed() > print_progress_interval
                {
                    let progress = dest_block as f64
                        / target_block_number.max(1) as f64
                        * 100.0;
                    let is_syncing = progress < 99.99;
                    tracing::info!(
                        target_block = target_block_number,
                        currently_at = dest_block,
                        is_syncing,
                        progress,
                        %chain,
                    );
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::TRACE,
                        kind = %probe::Kind::Sync,
                        %chain,
                        %block,
                        %dest_block,
                    );
                    instant = std::time::Instant::now();
                }
            }
        };
        let notify = |e: Error, after: Duration| {
            metrics.logs_watcher_back_off.inc();
            tracing::warn!(
                %e,
                "Restarting logs watcher in {}ms",
                after.as_millis(),
            );
        };
        backoff::future::retry_notify(backoff, task, notify).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ethers::providers::Provider;
    use ethers::types::{Log, H256, U64};
    use parking_lot::Mutex;
    use wallet_activator_store::InMemoryStore;

    use super::*;
    use crate::LogHandler;

    /// Block whose log fails every attempt of its first delivery.
    const FLAKY_BLOCK: u64 = 18;

    #[derive(Default)]
    struct Recorder {
        blocks: Mutex<Vec<u64>>,
        flaky_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LogHandler for Recorder {
        async fn handle_log(&self, log: &ChainLog) -> Result<()> {
            let block = log.log.block_number.unwrap_or_default().as_u64();
            if block == FLAKY_BLOCK
                && self.flaky_calls.fetch_add(1, Ordering::SeqCst) < 6
            {
                return Err(Error::Generic("node lagging"));
            }
            self.blocks.lock().push(block);
            Ok(())
        }
    }

    struct TestWatcher;

    impl EventWatcher for TestWatcher {
        const TAG: &'static str = "Test Watcher";

        type Store = InMemoryStore;
    }

    fn log_at(block: u64, removed: bool) -> Log {
        Log {
            topics: vec![H256::repeat_byte(1)],
            block_number: Some(U64::from(block)),
            transaction_hash: Some(H256::from_low_u64_be(block)),
            removed: Some(removed),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn saves_progress_per_range_and_resumes_after_a_restart() {
        let chain: Chain = "zksync".parse().unwrap();
        let (provider, mock) = Provider::mocked();
        // responses are served last pushed first
        mock.push::<Vec<Log>, _>(vec![log_at(FLAKY_BLOCK, false)])
            .unwrap();
        mock.push::<U64, _>(U64::from(20u64)).unwrap();
        mock.push::<Vec<Log>, _>(vec![log_at(FLAKY_BLOCK, false)])
            .unwrap();
        mock.push::<Vec<Log>, _>(vec![log_at(12, false), log_at(13, true)])
            .unwrap();
        mock.push::<U64, _>(U64::from(20u64)).unwrap();

        let store = Arc::new(InMemoryStore::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let registry = Arc::new(EventRegistry::new(metrics.clone()));
        let recorder = Arc::new(Recorder::default());
        registry.on(H256::repeat_byte(1), recorder.clone());
        let config = EventsWatcherConfig {
            polling_interval: 10,
            max_blocks_per_step: 5,
            print_progress_interval: 0,
            sync_blocks_from: Some(11),
            ..Default::default()
        };

        let task = tokio::spawn({
            let store = store.clone();
            let metrics = metrics.clone();
            let chain = chain.clone();
            async move {
                TestWatcher
                    .run(
                        chain,
                        Arc::new(provider),
                        store,
                        config,
                        0,
                        registry,
                        metrics,
                    )
                    .await
            }
        });

        let key = HistoryStoreKey::new(chain, TestWatcher::TAG);
        let synced = tokio::time::timeout(Duration::from_secs(20), async {
            loop {
                let last = store.get_last_block_number(key.clone(), 0).unwrap();
                if last == 20 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        task.abort();

        assert!(synced.is_ok());
        // the first range was stored before the restart, so block 12 is not
        // delivered twice. Removed logs are never delivered.
        assert_eq!(*recorder.blocks.lock(), vec![12, FLAKY_BLOCK]);
        assert_eq!(recorder.flaky_calls.load(Ordering::SeqCst), 7);
        assert!(metrics.logs_watcher_back_off.get() >= 1.0);
    }

    #[test]
    fn ranges_are_bounded_by_step_and_target() {
        assert_eq!(next_range(10, 10, 500), None);
        assert_eq!(next_range(11, 10, 500), None);
        assert_eq!(next_range(0, 10, 500), Some((1, 10)));
        assert_eq!(next_range(0, 1_000, 500), Some((1, 500)));
        assert_eq!(next_range(500, 1_000, 500), Some((501, 1_000)));
    }

    #[test]
    fn zero_step_still_progresses() {
        assert_eq!(next_range(4, 10, 0), Some((5, 5)));
    }
}
