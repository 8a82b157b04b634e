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

use std::fmt::Debug;
use std::path::Path;

use ethers::types::{H256, U256};
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

/// SledStore is a store that keeps every record in a [Sled](https://sled.rs)-based database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db })
    }

    /// Creates a temporary SledStore, removed once dropped.
    pub fn temporary() -> crate::Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Gets the total amount of data stored on disk
    pub fn get_data_stored_size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or_default()
    }

    fn job_id(bytes: &[u8]) -> JobId {
        let mut id = [0u8; 8];
        id.copy_from_slice(&bytes[..8]);
        JobId::from_be_bytes(id)
    }

    fn policy_key(account: &UAddress, key: PolicyKey) -> Vec<u8> {
        format!("{account}/{key}").into_bytes()
    }

    fn get_json<T: DeserializeOwned>(
        tree: &sled::Tree,
        key: impl AsRef<[u8]>,
    ) -> crate::Result<Option<T>> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        tree: &sled::Tree,
        key: impl AsRef<[u8]>,
        value: &T,
    ) -> crate::Result<()> {
        tree.insert(key.as_ref(), serde_json::to_vec(value)?)?;
        Ok(())
    }
}

impl HistoryStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn set_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> crate::Result<u64> {
        let tree = self.db.open_tree("last_block_numbers")?;
        let key: HistoryStoreKey = key.into();
        let old = tree.insert(key.to_bytes(), &block_number.to_be_bytes()[..])?;
        match old {
            Some(v) => {
                let mut output = [0u8; 8];
                output.copy_from_slice(&v);
                Ok(u64::from_be_bytes(output))
            }
            None => Ok(block_number),
        }
    }

    #[tracing::instrument(skip(self))]
    fn get_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> crate::Result<u64> {
        let tree = self.db.open_tree("last_block_numbers")?;
        let key: HistoryStoreKey = key.into();
        let val = tree.get(key.to_bytes())?;
        match val {
            Some(v) => {
                let mut output = [0u8; 8];
                output.copy_from_slice(&v);
                Ok(u64::from_be_bytes(output))
            }
            None => Ok(default_block_number),
        }
    }
}

impl AccountStore for SledStore {
    fn insert_account(&self, account: &AccountRecord) -> crate::Result<()> {
        let tree = self.db.open_tree("accounts")?;
        Self::put_json(&tree, account.address.to_string(), account)
    }

    fn get_account(
        &self,
        address: &UAddress,
    ) -> crate::Result<Option<AccountRecord>> {
        let tree = self.db.open_tree("accounts")?;
        Self::get_json(&tree, address.to_string())
    }

    fn mark_account_active(&self, address: &UAddress) -> crate::Result<bool> {
        let tree = self.db.open_tree("accounts")?;
        let key = address.to_string();
        loop {
            let old = tree.get(&key)?.ok_or_else(|| Error::AccountNotFound {
                address: key.clone(),
            })?;
            let mut account: AccountRecord = serde_json::from_slice(&old)?;
            if account.is_active {
                return Ok(false);
            }
            account.is_active = true;
            let new = serde_json::to_vec(&account)?;
            if tree.compare_and_swap(&key, Some(old), Some(new))?.is_ok() {
                self.db.flush()?;
                return Ok(true);
            }
        }
    }

    fn activation_fee(
        &self,
        address: &UAddress,
    ) -> crate::Result<Option<U256>> {
        let tree = self.db.open_tree("activation_fees")?;
        let fee = tree.get(address.to_string())?;
        Ok(fee.map(|bytes| U256::from_big_endian(&bytes)))
    }

    fn set_activation_fee(
        &self,
        address: &UAddress,
        fee: Option<U256>,
    ) -> crate::Result<()> {
        let tree = self.db.open_tree("activation_fees")?;
        match fee {
            Some(fee) => {
                let mut bytes = [0u8; 32];
                fee.to_big_endian(&mut bytes);
                tree.insert(address.to_string(), &bytes[..])?;
            }
            None => {
                tree.remove(address.to_string())?;
            }
        }
        self.db.flush()?;
        Ok(())
    }

    fn clear_activation_fee_if(
        &self,
        address: &UAddress,
        expected: U256,
    ) -> crate::Result<bool> {
        let tree = self.db.open_tree("activation_fees")?;
        let mut bytes = [0u8; 32];
        expected.to_big_endian(&mut bytes);
        let swapped = tree.compare_and_swap(
            address.to_string(),
            Some(&bytes[..]),
            None::<&[u8]>,
        )?;
        if swapped.is_ok() {
            self.db.flush()?;
        }
        Ok(swapped.is_ok())
    }
}

impl ProposalStore for SledStore {
    fn insert_proposal(&self, proposal: &ProposalRecord) -> crate::Result<()> {
        let tree = self.db.open_tree("proposals")?;
        Self::put_json(&tree, proposal.id.to_be_bytes(), proposal)
    }

    fn get_proposal(
        &self,
        id: ProposalId,
    ) -> crate::Result<Option<ProposalRecord>> {
        let tree = self.db.open_tree("proposals")?;
        Self::get_json(&tree, id.to_be_bytes())
    }

    fn set_proposal_transaction(
        &self,
        id: ProposalId,
        transaction: H256,
    ) -> crate::Result<bool> {
        let tree = self.db.open_tree("proposals")?;
        let Some(mut proposal) =
            Self::get_json::<ProposalRecord>(&tree, id.to_be_bytes())?
        else {
            return Ok(false);
        };
        proposal.transaction = Some(transaction);
        Self::put_json(&tree, id.to_be_bytes(), &proposal)?;
        Ok(true)
    }
}

impl PolicyStore for SledStore {
    fn insert_policy(&self, policy: &PolicyRecord) -> crate::Result<()> {
        let tree = self.db.open_tree("policies")?;
        Self::put_json(
            &tree,
            Self::policy_key(&policy.account, policy.key),
            policy,
        )
    }

    fn get_policy(
        &self,
        account: &UAddress,
        key: PolicyKey,
    ) -> crate::Result<Option<PolicyRecord>> {
        let tree = self.db.open_tree("policies")?;
        Self::get_json(&tree, Self::policy_key(account, key))
    }

    fn insert_policy_state(
        &self,
        mut state: PolicyStateRecord,
    ) -> crate::Result<PolicyStateId> {
        let tree = self.db.open_tree("policy_states")?;
        state.id = self.db.generate_id()?;
        Self::put_json(&tree, state.id.to_be_bytes(), &state)?;
        Ok(state.id)
    }

    fn get_policy_state(
        &self,
        id: PolicyStateId,
    ) -> crate::Result<Option<PolicyStateRecord>> {
        let tree = self.db.open_tree("policy_states")?;
        Self::get_json(&tree, id.to_be_bytes())
    }

    fn policy_states(
        &self,
        account: &UAddress,
    ) -> crate::Result<Vec<PolicyStateRecord>> {
        let tree = self.db.open_tree("policy_states")?;
        let mut states = Vec::new();
        for entry in tree.iter() {
            let (_, bytes) = entry?;
            let state: PolicyStateRecord = serde_json::from_slice(&bytes)?;
            if &state.account == account {
                states.push(state);
            }
        }
        Ok(states)
    }

    #[tracing::instrument(skip(self))]
    fn activate_policy_states(
        &self,
        filter: &PolicyStateFilter,
        block_number: u64,
    ) -> crate::Result<Vec<PolicyStateId>> {
        let tree = self.db.open_tree("policy_states")?;
        let mut activated = Vec::new();
        for entry in tree.iter() {
            let (key, old) = entry?;
            let mut state: PolicyStateRecord = serde_json::from_slice(&old)?;
            let transaction = match state.proposal {
                Some(id) => self.get_proposal(id)?.and_then(|p| p.transaction),
                None => None,
            };
            if !filter.matches(&state, transaction) {
                continue;
            }
            state.activation_block = Some(block_number);
            let new = serde_json::to_vec(&state)?;
            // A lost swap means a concurrent update already confirmed it.
            if tree.compare_and_swap(key, Some(old), Some(new))?.is_ok() {
                activated.push(state.id);
            }
        }
        self.db.flush()?;
        Ok(activated)
    }
}

impl<T> JobStore<T> for SledStore
where
    T: Serialize + DeserializeOwned + Clone,
{
    fn next_job_id(&self) -> crate::Result<JobId> {
        Ok(self.db.generate_id()?)
    }

    fn insert_job(&self, id: JobId, item: &QueueItem<T>) -> crate::Result<()> {
        let tree = self.db.open_tree("jobs")?;
        Self::put_json(&tree, id.to_be_bytes(), item)?;
        self.db.flush()?;
        Ok(())
    }

    fn get_job(&self, id: JobId) -> crate::Result<Option<QueueItem<T>>> {
        let tree = self.db.open_tree("jobs")?;
        Self::get_json(&tree, id.to_be_bytes())
    }

    fn update_job<F>(&self, id: JobId, mut f: F) -> crate::Result<bool>
    where
        F: FnMut(&mut QueueItem<T>) -> crate::Result<()>,
    {
        let tree = self.db.open_tree("jobs")?;
        loop {
            let Some(old) = tree.get(id.to_be_bytes())? else {
                return Ok(false);
            };
            let mut item: QueueItem<T> = serde_json::from_slice(&old)?;
            f(&mut item)?;
            let new = serde_json::to_vec(&item)?;
            if tree
                .compare_and_swap(id.to_be_bytes(), Some(old), Some(new))?
                .is_ok()
            {
                self.db.flush()?;
                return Ok(true);
            }
        }
    }

    fn push_ready(&self, queue: &str, id: JobId) -> crate::Result<()> {
        let tree = self.db.open_tree(format!("ready/{queue}"))?;
        let position = self.db.generate_id()?;
        tree.insert(position.to_be_bytes(), &id.to_be_bytes()[..])?;
        self.db.flush()?;
        Ok(())
    }

    fn pop_ready(&self, queue: &str) -> crate::Result<Option<JobId>> {
        let tree = self.db.open_tree(format!("ready/{queue}"))?;
        let Some((_, value)) = tree.pop_min()? else {
            return Ok(None);
        };
        Ok(Some(Self::job_id(&value)))
    }

    fn job_ids(&self) -> crate::Result<Vec<JobId>> {
        let tree = self.db.open_tree("jobs")?;
        tree.iter()
            .keys()
            .map(|key| -> crate::Result<JobId> {
                Ok(Self::job_id(&key?))
            })
            .collect()
    }

    fn ready_ids(&self, queue: &str) -> crate::Result<Vec<JobId>> {
        let tree = self.db.open_tree(format!("ready/{queue}"))?;
        tree.iter()
            .values()
            .map(|value| -> crate::Result<JobId> {
                Ok(Self::job_id(&value?))
            })
            .collect()
    }
}
