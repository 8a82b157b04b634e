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

//! # Activator Service Module 🕸️
//!
//! A module for starting the long-running tasks of the activator.
//!
//! ## Overview
//!
//! Services are tasks which the activator constantly runs throughout its
//! lifetime: one policy events watcher per enabled chain, and one job worker
//! per activation queue. Every task stops on the context's shutdown signal.

use std::sync::Arc;

use wallet_activation::{
    ActivationJobProcessor, ActivationOrchestrator, TransactionJobProcessor,
};
use wallet_activator_config::evm::ChainConfig;
use wallet_activator_context::ActivatorContext;
use wallet_activator_store::SledStore;
use wallet_activator_types::{Chain, UAddress};
use wallet_activator_utils::{probe, Result};
use wallet_event_watcher_traits::{EventRegistry, EventWatcher};
use wallet_ew_policy::{PolicyEventsHandler, PolicyEventsWatcher};
use wallet_job_queue::{JobProcessor, JobQueue, JobWorker};

/// Type alias for [Sled](https://sled.rs)-based database store
pub type Store = SledStore;

/// Starts all background services. This does not block, the services run on
/// background tasks.
///
/// The activation of every account in `activate` is enqueued once the
/// workers are set up.
pub fn ignite(
    ctx: &ActivatorContext,
    store: Arc<Store>,
    activate: &[UAddress],
) -> Result<()> {
    let registry = Arc::new(EventRegistry::new(ctx.metrics.clone()));
    let handler = Arc::new(PolicyEventsHandler::new(
        store.clone(),
        ctx.config.policy_events.into(),
        ctx.metrics.clone(),
    ));
    let subscriptions = wallet_ew_policy::register(&registry, handler);
    tracing::debug!(?subscriptions, "Policy events handler registered");

    for chain_config in ctx.config.chains.values() {
        start_policy_events_watcher(
            ctx,
            chain_config,
            store.clone(),
            registry.clone(),
        )?;
    }

    let orchestrator = Arc::new(ActivationOrchestrator::new(
        store.clone(),
        ctx.gateways()?,
        ctx.config.factories()?,
        ctx.metrics.clone(),
    ));
    let queue = JobQueue::new(store);
    let recovered = queue.recover()?;
    if recovered > 0 {
        tracing::info!(recovered, "Requeued jobs interrupted by a restart");
    }
    start_job_worker(
        ctx,
        queue.clone(),
        ActivationJobProcessor::new(orchestrator.clone()),
    );
    start_job_worker(
        ctx,
        queue.clone(),
        TransactionJobProcessor::new(orchestrator.clone()),
    );

    for account in activate {
        match orchestrator.activate(&queue, account) {
            Ok(node) => {
                tracing::info!(%account, job = node.id, "Activation enqueued");
            }
            Err(e) => {
                tracing::error!(%account, %e, "Failed to enqueue activation");
            }
        }
    }
    Ok(())
}

/// Starts the logs watcher confirming policy states on one chain.
fn start_policy_events_watcher(
    ctx: &ActivatorContext,
    chain_config: &ChainConfig,
    store: Arc<Store>,
    registry: Arc<EventRegistry>,
) -> Result<()> {
    let chain: Chain = chain_config.name.parse()?;
    if !chain_config.events_watcher.enabled {
        tracing::warn!("Policy events watcher is disabled for ({}).", chain);
        return Ok(());
    }
    let client = Arc::new(ctx.evm_provider(&chain)?);
    let mut shutdown_signal = ctx.shutdown_signal();
    let config = chain_config.events_watcher.clone();
    let block_confirmations = chain_config.block_confirmations;
    let metrics = ctx.metrics.clone();
    let task = async move {
        tracing::debug!("Policy events watcher for ({}) Started.", chain);
        let watcher = PolicyEventsWatcher::<Store>::default();
        let watcher_task = watcher.run(
            chain.clone(),
            client,
            store,
            config,
            block_confirmations,
            registry,
            metrics,
        );
        tokio::select! {
            result = watcher_task => {
                tracing::warn!(
                    ?result,
                    "Policy events watcher task stopped for ({})",
                    chain,
                );
            },
            _ = shutdown_signal.recv() => {
                tracing::trace!(
                    "Stopping Policy events watcher for ({})",
                    chain,
                );
            },
        }
    };
    // kick off the watcher.
    tokio::task::spawn(task);
    Ok(())
}

/// Starts a worker draining the queue of `processor`.
fn start_job_worker<P>(
    ctx: &ActivatorContext,
    queue: JobQueue<Store>,
    processor: P,
) where
    P: JobProcessor + 'static,
{
    let queue_name = processor.queue_name();
    let worker = JobWorker::new(
        queue,
        processor,
        ctx.config.job_queue,
        ctx.metrics.clone(),
    );
    let mut shutdown_signal = ctx.shutdown_signal();
    tracing::debug!("Job worker for ({}) Started.", queue_name);
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::JobQueue,
        queue = queue_name,
        started = true,
    );
    let task = async move {
        tokio::select! {
            result = worker.run() => {
                tracing::warn!(
                    ?result,
                    "Job worker task stopped for ({})",
                    queue_name,
                );
            },
            _ = shutdown_signal.recv() => {
                tracing::trace!("Stopping Job worker for ({})", queue_name);
            },
        }
    };
    tokio::task::spawn(task);
}

#[cfg(test)]
mod tests {
    use wallet_activator_config::ActivatorConfig;

    use super::*;

    #[tokio::test]
    async fn ignites_without_chains() {
        let ctx = ActivatorContext::new(ActivatorConfig::default()).unwrap();
        let store = Arc::new(Store::temporary().unwrap());
        ignite(&ctx, store, &[]).unwrap();
        ctx.shutdown();
    }

    #[tokio::test]
    async fn unknown_accounts_do_not_stop_the_service() {
        let config: ActivatorConfig =
            serde_json::from_value(serde_json::json!({
                "chains": {
                    "zksync": {
                        "name": "zksync",
                        "enabled": true,
                        "http-endpoint": "http://localhost:8545",
                        "chain-id": 324,
                        "private-key": "0x8f2a55949038a9610f50fb23b5883af3b4ecb3c3bb792cbcefbd1542c692be63",
                        "account-factory": "0x00000000000000000000000000000000000000fa",
                        "events-watcher": { "enabled": false },
                    }
                }
            }))
            .unwrap();
        let ctx = ActivatorContext::new(config).unwrap();
        let store = Arc::new(Store::temporary().unwrap());
        let missing: UAddress =
            "zksync:0x00000000000000000000000000000000000000aa"
                .parse()
                .unwrap();
        ignite(&ctx, store, &[missing]).unwrap();
        ctx.shutdown();
    }
}
