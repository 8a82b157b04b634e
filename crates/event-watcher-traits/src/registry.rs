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

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Log, H256};
use parking_lot::RwLock;
use wallet_activator_types::Chain;
use wallet_activator_utils::metric::Metrics;
use wallet_activator_utils::retry::ConstantWithMaxRetryCount;
use wallet_activator_utils::{probe, Error, Result};

/// How many times a failing handler is retried for the same log.
const MAX_RETRY_COUNT: usize = 5;
/// Delay between two attempts of the same handler.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// A raw log together with the chain it was emitted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLog {
    /// The chain the log comes from.
    pub chain: Chain,
    /// The log, including its block and transaction metadata.
    pub log: Log,
}

impl ChainLog {
    /// Wraps a log emitted on `chain`.
    pub fn new(chain: Chain, log: Log) -> Self {
        Self { chain, log }
    }

    /// The event signature of this log, if any.
    pub fn signature(&self) -> Option<H256> {
        self.log.topics.first().copied()
    }
}

/// A handler for the logs of one or more event signatures.
///
/// Handlers must be idempotent: the same log can be delivered again after a
/// restart of the watcher.
#[async_trait::async_trait]
pub trait LogHandler: Send + Sync {
    /// Called once per matching log. Returning an error makes the registry
    /// retry the call a few times before giving up on this log.
    async fn handle_log(&self, log: &ChainLog) -> Result<()>;
}

/// Identifier returned by [`EventRegistry::on`], used to unsubscribe.
pub type HandlerId = u64;

type Handlers = Vec<(HandlerId, Arc<dyn LogHandler>)>;

/// Subscriptions of log handlers, keyed by event signature.
pub struct EventRegistry {
    handlers: RwLock<BTreeMap<H256, Handlers>>,
    next_id: AtomicU64,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("signatures", &self.signatures())
            .finish()
    }
}

impl EventRegistry {
    /// Creates an empty registry.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            handlers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// Subscribes `handler` to the logs whose first topic is `signature`.
    pub fn on(
        &self,
        signature: H256,
        handler: Arc<dyn LogHandler>,
    ) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(signature)
            .or_default()
            .push((id, handler));
        tracing::debug!(?signature, id, "Handler subscribed");
        id
    }

    /// Removes a subscription. Returns `false` if it was not registered.
    pub fn off(&self, signature: H256, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(subscribed) = handlers.get_mut(&signature) else {
            return false;
        };
        let before = subscribed.len();
        subscribed.retain(|(handler_id, _)| *handler_id != id);
        let removed = subscribed.len() != before;
        if subscribed.is_empty() {
            handlers.remove(&signature);
        }
        removed
    }

    /// Every signature with at least one handler.
    pub fn signatures(&self) -> Vec<H256> {
        self.handlers.read().keys().copied().collect()
    }

    /// Runs, one after the other, the handlers subscribed to the log's
    /// signature.
    ///
    /// Each handler is retried with a constant backoff. A handler that still
    /// fails is logged and skipped. If all of them failed the log was not
    /// handled at all and [`Error::ForceRestart`] is returned, so the watcher
    /// delivers it again.
    #[tracing::instrument(
        skip_all,
        fields(chain = %log.chain, tx = ?log.log.transaction_hash),
    )]
    pub async fn dispatch(&self, log: &ChainLog) -> Result<()> {
        let Some(signature) = log.signature() else {
            return Ok(());
        };
        // snapshot, so handlers can subscribe or unsubscribe while we run.
        let handlers = self
            .handlers
            .read()
            .get(&signature)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            return Ok(());
        }

        let mut failed = 0;
        for (id, handler) in &handlers {
            let backoff = ConstantWithMaxRetryCount::new(
                RETRY_INTERVAL,
                MAX_RETRY_COUNT,
            );
            let task = move || async move {
                handler
                    .handle_log(log)
                    .await
                    .map_err(backoff::Error::transient)
            };
            let notify = |e: Error, after: Duration| {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Retry,
                    handler = id,
                    error = %e,
                    after = ?after,
                );
            };
            let result =
                backoff::future::retry_notify(backoff, task, notify).await;
            if let Err(e) = result {
                failed += 1;
                self.metrics.handler_failures.inc();
                tracing::error!(
                    %e,
                    handler = id,
                    "Error while handling the log",
                );
            }
        }

        if failed == handlers.len() {
            tracing::error!("All handlers failed for this log");
            return Err(Error::ForceRestart);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct Counting {
        calls: AtomicUsize,
        failures: usize,
    }

    impl Counting {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl LogHandler for Counting {
        async fn handle_log(&self, _log: &ChainLog) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(Error::Generic("not yet"))
            } else {
                Ok(())
            }
        }
    }

    fn registry() -> EventRegistry {
        EventRegistry::new(Arc::new(Metrics::new().unwrap()))
    }

    fn log_with(signature: H256) -> ChainLog {
        let log = Log {
            topics: vec![signature],
            ..Default::default()
        };
        ChainLog::new("zksync".parse().unwrap(), log)
    }

    #[tokio::test]
    async fn dispatches_to_subscribed_handlers_only() {
        let registry = registry();
        let a = Counting::new(0);
        let b = Counting::new(0);
        registry.on(H256::repeat_byte(1), a.clone());
        registry.on(H256::repeat_byte(2), b.clone());

        registry.dispatch(&log_with(H256::repeat_byte(1))).await.unwrap();
        registry.dispatch(&log_with(H256::repeat_byte(3))).await.unwrap();

        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
        assert_eq!(
            registry.signatures(),
            vec![H256::repeat_byte(1), H256::repeat_byte(2)]
        );
    }

    #[tokio::test]
    async fn off_unsubscribes() {
        let registry = registry();
        let handler = Counting::new(0);
        let id = registry.on(H256::repeat_byte(1), handler.clone());
        assert!(registry.off(H256::repeat_byte(1), id));
        assert!(!registry.off(H256::repeat_byte(1), id));
        assert!(registry.signatures().is_empty());

        registry.dispatch(&log_with(H256::repeat_byte(1))).await.unwrap();
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn retries_a_flaky_handler() {
        let registry = registry();
        let handler = Counting::new(2);
        registry.on(H256::repeat_byte(1), handler.clone());

        registry.dispatch(&log_with(H256::repeat_byte(1))).await.unwrap();
        assert_eq!(handler.calls(), 3);
        assert_eq!(registry.metrics.handler_failures.get() as u64, 0);
    }

    #[tokio::test]
    async fn one_success_is_enough() {
        let registry = registry();
        let broken = Counting::new(usize::MAX);
        let healthy = Counting::new(0);
        registry.on(H256::repeat_byte(1), broken.clone());
        registry.on(H256::repeat_byte(1), healthy.clone());

        registry.dispatch(&log_with(H256::repeat_byte(1))).await.unwrap();
        assert_eq!(broken.calls(), MAX_RETRY_COUNT + 1);
        assert_eq!(healthy.calls(), 1);
        assert_eq!(registry.metrics.handler_failures.get() as u64, 1);
    }

    #[tokio::test]
    async fn all_handlers_failing_forces_a_restart() {
        let registry = registry();
        registry.on(H256::repeat_byte(1), Counting::new(usize::MAX));

        let result = registry.dispatch(&log_with(H256::repeat_byte(1))).await;
        assert!(matches!(result, Err(Error::ForceRestart)));
    }
}
