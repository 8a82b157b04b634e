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

//! Confirms stored policy states from the `PolicyAdded` and `PolicyRemoved`
//! logs of smart accounts.

use std::marker::PhantomData;
use std::sync::Arc;

use ethers::abi::RawLog;
use ethers::contract::{EthEvent, EthLogDecode};
use ethers::types::{Log, H256};
use wallet_activator_config::PolicyEventsConfig;
use wallet_activator_store::{
    HistoryStore, PolicyStateFilter, PolicyStateId, PolicyStore,
};
use wallet_activator_types::contracts::{
    AccountEvents, PolicyAddedFilter, PolicyRemovedFilter,
};
use wallet_activator_types::{Chain, PolicyKey, UAddress};
use wallet_activator_utils::metric::Metrics;
use wallet_activator_utils::{probe, Error, Result};
use wallet_event_watcher_traits::{
    ChainLog, EventRegistry, EventWatcher, HandlerId, LogHandler,
};

#[cfg(test)]
mod tests;

/// How events are matched to the policy states they confirm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyMatching {
    /// Also require a `PolicyAdded` hash to equal the state's policy hash.
    ///
    /// When off, every unconfirmed state of the policy linked to the emitting
    /// transaction is confirmed, even if one proposal carried several states
    /// of the same policy.
    pub match_state_hash: bool,
}

impl From<PolicyEventsConfig> for PolicyMatching {
    fn from(config: PolicyEventsConfig) -> Self {
        Self {
            match_state_hash: config.match_state_hash,
        }
    }
}

/// The store update a policy event calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStateActivation {
    pub filter: PolicyStateFilter,
    pub block_number: u64,
}

/// Works out which policy states `event` confirms.
///
/// `log` must carry its block number and transaction hash.
pub fn reconcile(
    event: &AccountEvents,
    chain: &Chain,
    log: &Log,
    matching: PolicyMatching,
) -> Result<PolicyStateActivation> {
    let block_number = log
        .block_number
        .ok_or(Error::MissingLogMetadata("block_number"))?
        .as_u64();
    let transaction_hash = log
        .transaction_hash
        .ok_or(Error::MissingLogMetadata("transaction_hash"))?;
    let state_hash = match event {
        AccountEvents::PolicyAddedFilter(added)
            if matching.match_state_hash =>
        {
            Some(H256(added.hash))
        }
        _ => None,
    };
    let filter = PolicyStateFilter {
        account: UAddress::new(chain.clone(), log.address),
        key: PolicyKey(event.key()),
        transaction_hash,
        state_hash,
    };
    Ok(PolicyStateActivation {
        filter,
        block_number,
    })
}

/// Applies [`reconcile`] to the store for every policy log it receives.
#[derive(Debug)]
pub struct PolicyEventsHandler<S> {
    store: Arc<S>,
    matching: PolicyMatching,
    metrics: Arc<Metrics>,
}

impl<S> PolicyEventsHandler<S> {
    pub fn new(
        store: Arc<S>,
        matching: PolicyMatching,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            matching,
            metrics,
        }
    }
}

impl<S> PolicyEventsHandler<S>
where
    S: PolicyStore,
{
    /// Decodes and applies one log, returning the ids of the states it
    /// confirmed. A log already applied confirms nothing.
    pub fn apply(&self, log: &ChainLog) -> Result<Vec<PolicyStateId>> {
        let raw = RawLog {
            topics: log.log.topics.clone(),
            data: log.log.data.to_vec(),
        };
        let event = <AccountEvents as EthLogDecode>::decode_log(&raw)?;
        let activation =
            reconcile(&event, &log.chain, &log.log, self.matching)?;
        let activated = self.store.activate_policy_states(
            &activation.filter,
            activation.block_number,
        )?;
        self.metrics
            .policy_states_activated
            .inc_by(activated.len() as f64);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::PolicyEvents,
            account = %activation.filter.account,
            key = %activation.filter.key,
            block = activation.block_number,
            activated = ?activated,
        );
        if activated.is_empty() {
            tracing::trace!(
                account = %activation.filter.account,
                key = %activation.filter.key,
                "No unconfirmed policy state for this log",
            );
        }
        Ok(activated)
    }
}

#[async_trait::async_trait]
impl<S> LogHandler for PolicyEventsHandler<S>
where
    S: PolicyStore + 'static,
{
    async fn handle_log(&self, log: &ChainLog) -> Result<()> {
        match self.apply(log) {
            Ok(_) => Ok(()),
            // the same bytes never decode on a retry.
            Err(e @ (Error::Abi(_) | Error::MissingLogMetadata(_))) => {
                tracing::warn!(
                    chain = %log.chain,
                    address = ?log.log.address,
                    tx = ?log.log.transaction_hash,
                    %e,
                    "Skipping malformed policy log",
                );
                self.metrics.policy_logs_skipped.inc();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// The signatures a [`PolicyEventsHandler`] is interested in.
pub fn signatures() -> [H256; 2] {
    [PolicyAddedFilter::signature(), PolicyRemovedFilter::signature()]
}

/// Subscribes `handler` to both policy events. The returned pairs can be
/// passed to [`EventRegistry::off`].
pub fn register(
    registry: &EventRegistry,
    handler: Arc<dyn LogHandler>,
) -> Vec<(H256, HandlerId)> {
    signatures()
        .into_iter()
        .map(|signature| (signature, registry.on(signature, handler.clone())))
        .collect()
}

/// Logs watcher feeding the policy events of a chain to the registry.
#[derive(Debug)]
pub struct PolicyEventsWatcher<S> {
    _store: PhantomData<fn() -> S>,
}

impl<S> Default for PolicyEventsWatcher<S> {
    fn default() -> Self {
        Self {
            _store: PhantomData,
        }
    }
}

impl<S> EventWatcher for PolicyEventsWatcher<S>
where
    S: HistoryStore + 'static,
{
    const TAG: &'static str = "Policy Events Watcher";

    type Store = S;
}
