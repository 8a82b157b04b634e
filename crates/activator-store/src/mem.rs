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

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ethers::types::{H256, U256};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use wallet_activator_types::{PolicyKey, UAddress};
use wallet_activator_utils::Error;

use super::{
    AccountRecord, AccountStore, HistoryStore, HistoryStoreKey, JobId,
    JobStore, PolicyRecord, PolicyStateFilter, PolicyStateId,
    PolicyStateRecord, PolicyStore, ProposalId, ProposalRecord,
    ProposalStore, QueueItem,
};

/// InMemoryStore keeps every record in memory, behind `RwLock`s.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    last_block_numbers: Arc<RwLock<HashMap<HistoryStoreKey, u64>>>,
    accounts: Arc<RwLock<HashMap<UAddress, AccountRecord>>>,
    activation_fees: Arc<RwLock<HashMap<UAddress, U256>>>,
    policies: Arc<RwLock<HashMap<(UAddress, PolicyKey), PolicyRecord>>>,
    policy_states: Arc<RwLock<BTreeMap<PolicyStateId, PolicyStateRecord>>>,
    proposals: Arc<RwLock<HashMap<ProposalId, ProposalRecord>>>,
    jobs: Arc<RwLock<HashMap<JobId, Vec<u8>>>>,
    ready: Arc<RwLock<HashMap<String, VecDeque<JobId>>>>,
    ids: Arc<AtomicU64>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl InMemoryStore {
    fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl HistoryStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn get_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> crate::Result<u64> {
        let guard = self.last_block_numbers.read();
        let val = guard
            .get(&key.into())
            .cloned()
            .unwrap_or(default_block_number);
        Ok(val)
    }

    #[tracing::instrument(skip(self))]
    fn set_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> crate::Result<u64> {
        let mut guard = self.last_block_numbers.write();
        let old = guard.insert(key.into(), block_number);
        Ok(old.unwrap_or(block_number))
    }
}

impl AccountStore for InMemoryStore {
    fn insert_account(&self, account: &AccountRecord) -> crate::Result<()> {
        self.accounts
            .write()
            .insert(account.address.clone(), account.clone());
        Ok(())
    }

    fn get_account(
        &self,
        address: &UAddress,
    ) -> crate::Result<Option<AccountRecord>> {
        Ok(self.accounts.read().get(address).cloned())
    }

    fn mark_account_active(&self, address: &UAddress) -> crate::Result<bool> {
        let mut guard = self.accounts.write();
        let account =
            guard
                .get_mut(address)
                .ok_or_else(|| Error::AccountNotFound {
                    address: address.to_string(),
                })?;
        let transitioned = !account.is_active;
        account.is_active = true;
        Ok(transitioned)
    }

    fn activation_fee(
        &self,
        address: &UAddress,
    ) -> crate::Result<Option<U256>> {
        Ok(self.activation_fees.read().get(address).copied())
    }

    fn set_activation_fee(
        &self,
        address: &UAddress,
        fee: Option<U256>,
    ) -> crate::Result<()> {
        let mut guard = self.activation_fees.write();
        match fee {
            Some(fee) => guard.insert(address.clone(), fee),
            None => guard.remove(address),
        };
        Ok(())
    }

    fn clear_activation_fee_if(
        &self,
        address: &UAddress,
        expected: U256,
    ) -> crate::Result<bool> {
        let mut guard = self.activation_fees.write();
        if guard.get(address) == Some(&expected) {
            guard.remove(address);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

impl ProposalStore for InMemoryStore {
    fn insert_proposal(&self, proposal: &ProposalRecord) -> crate::Result<()> {
        self.proposals.write().insert(proposal.id, proposal.clone());
        Ok(())
    }

    fn get_proposal(
        &self,
        id: ProposalId,
    ) -> crate::Result<Option<ProposalRecord>> {
        Ok(self.proposals.read().get(&id).cloned())
    }

    fn set_proposal_transaction(
        &self,
        id: ProposalId,
        transaction: H256,
    ) -> crate::Result<bool> {
        let mut guard = self.proposals.write();
        match guard.get_mut(&id) {
            Some(proposal) => {
                proposal.transaction = Some(transaction);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl PolicyStore for InMemoryStore {
    fn insert_policy(&self, policy: &PolicyRecord) -> crate::Result<()> {
        self.policies
            .write()
            .insert((policy.account.clone(), policy.key), policy.clone());
        Ok(())
    }

    fn get_policy(
        &self,
        account: &UAddress,
        key: PolicyKey,
    ) -> crate::Result<Option<PolicyRecord>> {
        Ok(self.policies.read().get(&(account.clone(), key)).cloned())
    }

    fn insert_policy_state(
        &self,
        mut state: PolicyStateRecord,
    ) -> crate::Result<PolicyStateId> {
        state.id = self.next_id();
        let id = state.id;
        self.policy_states.write().insert(id, state);
        Ok(id)
    }

    fn get_policy_state(
        &self,
        id: PolicyStateId,
    ) -> crate::Result<Option<PolicyStateRecord>> {
        Ok(self.policy_states.read().get(&id).cloned())
    }

    fn policy_states(
        &self,
        account: &UAddress,
    ) -> crate::Result<Vec<PolicyStateRecord>> {
        let guard = self.policy_states.read();
        Ok(guard
            .values()
            .filter(|s| &s.account == account)
            .cloned()
            .collect())
    }

    #[tracing::instrument(skip(self))]
    fn activate_policy_states(
        &self,
        filter: &PolicyStateFilter,
        block_number: u64,
    ) -> crate::Result<Vec<PolicyStateId>> {
        let proposals = self.proposals.read();
        let mut states = self.policy_states.write();
        let mut activated = Vec::new();
        for state in states.values_mut() {
            let transaction = state
                .proposal
                .and_then(|id| proposals.get(&id))
                .and_then(|p| p.transaction);
            if filter.matches(state, transaction) {
                state.activation_block = Some(block_number);
                activated.push(state.id);
            }
        }
        Ok(activated)
    }
}

impl<T> JobStore<T> for InMemoryStore
where
    T: Serialize + DeserializeOwned + Clone,
{
    fn next_job_id(&self) -> crate::Result<JobId> {
        Ok(self.next_id())
    }

    fn insert_job(&self, id: JobId, item: &QueueItem<T>) -> crate::Result<()> {
        let bytes = serde_json::to_vec(item)?;
        self.jobs.write().insert(id, bytes);
        Ok(())
    }

    fn get_job(&self, id: JobId) -> crate::Result<Option<QueueItem<T>>> {
        let guard = self.jobs.read();
        match guard.get(&id) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    fn update_job<F>(&self, id: JobId, mut f: F) -> crate::Result<bool>
    where
        F: FnMut(&mut QueueItem<T>) -> crate::Result<()>,
    {
        let mut guard = self.jobs.write();
        let Some(bytes) = guard.get_mut(&id) else {
            return Ok(false);
        };
        let mut item: QueueItem<T> = serde_json::from_slice(bytes)?;
        f(&mut item)?;
        *bytes = serde_json::to_vec(&item)?;
        Ok(true)
    }

    fn push_ready(&self, queue: &str, id: JobId) -> crate::Result<()> {
        self.ready
            .write()
            .entry(queue.to_owned())
            .or_default()
            .push_back(id);
        Ok(())
    }

    fn pop_ready(&self, queue: &str) -> crate::Result<Option<JobId>> {
        Ok(self
            .ready
            .write()
            .get_mut(queue)
            .and_then(VecDeque::pop_front))
    }

    fn job_ids(&self) -> crate::Result<Vec<JobId>> {
        let mut ids: Vec<_> = self.jobs.read().keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn ready_ids(&self, queue: &str) -> crate::Result<Vec<JobId>> {
        Ok(self
            .ready
            .read()
            .get(queue)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    #[test]
    fn accounts_and_fees() {
        test_utils::accounts_and_fees(InMemoryStore::default());
    }

    #[test]
    fn compare_and_clear_under_contention() {
        test_utils::compare_and_clear_under_contention(
            InMemoryStore::default(),
        );
    }

    #[test]
    fn policy_states_activate_once() {
        test_utils::policy_states_activate_once(InMemoryStore::default());
    }

    #[test]
    fn policy_view_tracks_state_and_draft() {
        test_utils::policy_view_tracks_state_and_draft(
            InMemoryStore::default(),
        );
    }

    #[test]
    fn jobs_and_ready_lists() {
        test_utils::jobs_and_ready_lists(InMemoryStore::default());
    }

    #[test]
    fn last_block_numbers() {
        let store = InMemoryStore::default();
        let chain = "zksync".parse().unwrap();
        let key = HistoryStoreKey::new(chain, "logs");
        assert_eq!(
            store.get_last_block_number_or_default(key.clone()).unwrap(),
            1
        );
        store.set_last_block_number(key.clone(), 42).unwrap();
        assert_eq!(store.get_last_block_number(key, 0).unwrap(), 42);
    }
}
