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

//! # Activator Store Module 🕸️
//!
//! A module for managing the storage of the wallet activator.
//!
//! ## Overview
//!
//! The store keeps the accounts with their cached activation fee, their
//! policies, policy states and proposals, the jobs of the activation flows and
//! the last block each logs watcher processed.
//!
use std::fmt::{Debug, Display};

use ethers::types::U256;
use wallet_activator_types::{Chain, PolicyKey, UAddress};
use wallet_activator_utils::Result;

/// A module for managing in-memory storage of the activator.
pub mod mem;
/// Records persisted by the store and the policy state filter.
pub mod models;
/// Job items and the job store.
pub mod queue;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;
pub use models::*;
pub use queue::{JobId, JobStore, QueueItem, QueueItemState};

/// HistoryStoreKey identifies the sync progress of one watcher on one chain.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct HistoryStoreKey {
    chain: Chain,
    watcher: &'static str,
}

impl HistoryStoreKey {
    pub fn new(chain: Chain, watcher: &'static str) -> Self {
        Self { chain, watcher }
    }

    /// The chain of this key.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Returns the bytes of the key.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl Display for HistoryStoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.watcher, self.chain)
    }
}

impl From<(Chain, &'static str)> for HistoryStoreKey {
    fn from((chain, watcher): (Chain, &'static str)) -> Self {
        Self::new(chain, watcher)
    }
}

/// HistoryStore is a simple trait for storing and retrieving history
/// of block numbers.
pub trait HistoryStore: Clone + Send + Sync {
    /// Sets the new block number for that contract in the cache and returns the old one.
    fn set_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64>;
    /// Get the last block number for that contract.
    /// if not found, returns the `default_block_number`.
    fn get_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64>;

    /// an easy way to call the `get_last_block_number`
    /// where the default block number is `1`.
    fn get_last_block_number_or_default<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
    ) -> Result<u64> {
        self.get_last_block_number(key, 1u64)
    }
}

/// Accounts and their cached activation fee.
pub trait AccountStore: Clone + Send + Sync {
    /// Inserts or replaces an account.
    fn insert_account(&self, account: &AccountRecord) -> Result<()>;
    /// Gets an account by its address.
    fn get_account(&self, address: &UAddress) -> Result<Option<AccountRecord>>;
    /// Marks the account active.
    ///
    /// Returns `true` only for the call that performed the transition.
    fn mark_account_active(&self, address: &UAddress) -> Result<bool>;
    /// The cached activation fee of the account, in wei.
    fn activation_fee(&self, address: &UAddress) -> Result<Option<U256>>;
    /// Caches (or clears, with `None`) the activation fee of the account.
    fn set_activation_fee(
        &self,
        address: &UAddress,
        fee: Option<U256>,
    ) -> Result<()>;
    /// Clears the cached activation fee only if it still equals `expected`.
    ///
    /// Returns `true` if this call cleared it.
    fn clear_activation_fee_if(
        &self,
        address: &UAddress,
        expected: U256,
    ) -> Result<bool>;
}

/// Proposals and the transaction that executed them.
pub trait ProposalStore: Clone + Send + Sync {
    /// Inserts or replaces a proposal.
    fn insert_proposal(&self, proposal: &ProposalRecord) -> Result<()>;
    /// Gets a proposal by id.
    fn get_proposal(&self, id: ProposalId) -> Result<Option<ProposalRecord>>;
    /// Links the proposal to the transaction that executes it.
    fn set_proposal_transaction(
        &self,
        id: ProposalId,
        transaction: ethers::types::H256,
    ) -> Result<bool>;
}

/// Policies and their versioned states.
pub trait PolicyStore: ProposalStore {
    /// Inserts or replaces a policy.
    fn insert_policy(&self, policy: &PolicyRecord) -> Result<()>;
    /// Gets a policy of an account.
    fn get_policy(
        &self,
        account: &UAddress,
        key: PolicyKey,
    ) -> Result<Option<PolicyRecord>>;
    /// Stores a new policy state under a freshly assigned id, which is
    /// returned. The `id` of the given record is ignored.
    fn insert_policy_state(
        &self,
        state: PolicyStateRecord,
    ) -> Result<PolicyStateId>;
    /// Gets a policy state by id.
    fn get_policy_state(
        &self,
        id: PolicyStateId,
    ) -> Result<Option<PolicyStateRecord>>;
    /// All the policy states of an account, ordered by id.
    fn policy_states(&self, account: &UAddress)
        -> Result<Vec<PolicyStateRecord>>;
    /// Sets `activation_block` on every unconfirmed state matching `filter`.
    ///
    /// Confirmed states are never touched again. Returns the ids updated.
    fn activate_policy_states(
        &self,
        filter: &PolicyStateFilter,
        block_number: u64,
    ) -> Result<Vec<PolicyStateId>>;

    /// The policy with its current (confirmed) state and pending draft.
    fn policy_view(
        &self,
        account: &UAddress,
        key: PolicyKey,
    ) -> Result<Option<PolicyView>> {
        let Some(policy) = self.get_policy(account, key)? else {
            return Ok(None);
        };
        let states: Vec<_> = self
            .policy_states(account)?
            .into_iter()
            .filter(|s| s.key == key)
            .collect();
        let state = states
            .iter()
            .filter(|s| s.activation_block.is_some())
            .max_by_key(|s| (s.activation_block, s.id))
            .cloned();
        let draft = states
            .iter()
            .filter(|s| s.activation_block.is_none())
            .max_by_key(|s| s.id)
            .cloned();
        Ok(Some(PolicyView {
            policy,
            state,
            draft,
        }))
    }
}

/// What activating an account needs to know about it.
pub trait ActivationStore: AccountStore + PolicyStore {
    /// Reads the account, its cached fee and its init policy states.
    fn select_account(
        &self,
        address: &UAddress,
    ) -> Result<Option<AccountActivation>> {
        let Some(account) = self.get_account(address)? else {
            return Ok(None);
        };
        let activation_eth_fee = self.activation_fee(address)?;
        let init_policies = self
            .policy_states(address)?
            .into_iter()
            .filter(|s| s.is_account_init_state)
            .collect();
        Ok(Some(AccountActivation {
            is_active: account.is_active,
            implementation: account.implementation,
            salt: account.salt,
            activation_eth_fee,
            init_policies,
        }))
    }
}

impl<T> ActivationStore for T where T: AccountStore + PolicyStore {}

#[cfg(test)]
pub(crate) mod test_utils {
    //! Behaviour every store backend must share.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    use ethers::types::{Address, H256, U256};

    use super::*;

    pub fn account(byte: u8) -> UAddress {
        UAddress::new("zksync".parse().unwrap(), Address::repeat_byte(byte))
    }

    pub fn account_record(byte: u8) -> AccountRecord {
        AccountRecord {
            address: account(byte),
            name: format!("account {byte}"),
            implementation: Address::repeat_byte(0xee),
            salt: H256::repeat_byte(byte),
            is_active: false,
        }
    }

    pub fn accounts_and_fees<S: AccountStore>(store: S) {
        let record = account_record(1);
        store.insert_account(&record).unwrap();
        assert_eq!(
            store.get_account(&record.address).unwrap(),
            Some(record.clone())
        );
        assert_eq!(store.get_account(&account(2)).unwrap(), None);

        assert_eq!(store.activation_fee(&record.address).unwrap(), None);
        store
            .set_activation_fee(&record.address, Some(U256::from(100)))
            .unwrap();
        assert!(!store
            .clear_activation_fee_if(&record.address, U256::from(99))
            .unwrap());
        assert!(store
            .clear_activation_fee_if(&record.address, U256::from(100))
            .unwrap());
        assert!(!store
            .clear_activation_fee_if(&record.address, U256::from(100))
            .unwrap());
        assert_eq!(store.activation_fee(&record.address).unwrap(), None);

        assert!(store.mark_account_active(&record.address).unwrap());
        assert!(!store.mark_account_active(&record.address).unwrap());
        assert!(store.get_account(&record.address).unwrap().unwrap().is_active);
        assert!(store.mark_account_active(&account(3)).is_err());
    }

    pub fn compare_and_clear_under_contention<S: AccountStore + 'static>(
        store: S,
    ) {
        let address = account(1);
        store.insert_account(&account_record(1)).unwrap();
        store
            .set_activation_fee(&address, Some(U256::from(7)))
            .unwrap();

        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let store = store.clone();
                let address = address.clone();
                let barrier = barrier.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    if store
                        .clear_activation_fee_if(&address, U256::from(7))
                        .unwrap()
                    {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    pub fn policy_states_activate_once<S: PolicyStore>(store: S) {
        let owner = account(1);
        let key = PolicyKey(1);
        let tx = H256::repeat_byte(0x77);
        store
            .insert_proposal(&ProposalRecord {
                id: 10,
                account: owner.clone(),
                transaction: None,
            })
            .unwrap();
        assert!(store.set_proposal_transaction(10, tx).unwrap());
        assert!(!store.set_proposal_transaction(11, tx).unwrap());

        let linked = store
            .insert_policy_state(
                PolicyStateRecord::draft(
                    owner.clone(),
                    key,
                    1,
                    vec![Address::repeat_byte(1)],
                )
                .with_proposal(10),
            )
            .unwrap();
        let unrelated = store
            .insert_policy_state(PolicyStateRecord::draft(
                owner.clone(),
                key,
                1,
                vec![Address::repeat_byte(2)],
            ))
            .unwrap();

        let filter = PolicyStateFilter {
            account: owner.clone(),
            key,
            transaction_hash: tx,
            state_hash: None,
        };
        assert_eq!(
            store.activate_policy_states(&filter, 5).unwrap(),
            vec![linked]
        );
        // redelivery leaves the first block in place
        assert!(store.activate_policy_states(&filter, 9).unwrap().is_empty());
        let state = store.get_policy_state(linked).unwrap().unwrap();
        assert_eq!(state.activation_block, Some(5));
        let other = store.get_policy_state(unrelated).unwrap().unwrap();
        assert_eq!(other.activation_block, None);
        assert_eq!(store.policy_states(&owner).unwrap().len(), 2);
        assert!(store.policy_states(&account(2)).unwrap().is_empty());
    }

    pub fn policy_view_tracks_state_and_draft<S: PolicyStore>(store: S) {
        let owner = account(1);
        let key = PolicyKey(3);
        assert_eq!(store.policy_view(&owner, key).unwrap(), None);
        store
            .insert_policy(&PolicyRecord {
                account: owner.clone(),
                key,
                name: "Admin".to_string(),
            })
            .unwrap();
        let genesis = store
            .insert_policy_state(
                PolicyStateRecord::draft(
                    owner.clone(),
                    key,
                    1,
                    vec![Address::repeat_byte(1)],
                )
                .init_state(),
            )
            .unwrap();
        let view = store.policy_view(&owner, key).unwrap().unwrap();
        assert_eq!(view.state, None);
        assert_eq!(view.draft.map(|s| s.id), Some(genesis));

        let filter = PolicyStateFilter {
            account: owner.clone(),
            key,
            transaction_hash: H256::zero(),
            state_hash: None,
        };
        store.activate_policy_states(&filter, 3).unwrap();
        let draft = store
            .insert_policy_state(
                PolicyStateRecord::draft(
                    owner.clone(),
                    key,
                    2,
                    vec![Address::repeat_byte(1), Address::repeat_byte(2)],
                )
                .with_proposal(1),
            )
            .unwrap();
        let view = store.policy_view(&owner, key).unwrap().unwrap();
        assert_eq!(view.policy.name, "Admin");
        assert_eq!(view.state.map(|s| s.id), Some(genesis));
        assert_eq!(view.draft.map(|s| s.id), Some(draft));
    }

    pub fn jobs_and_ready_lists<S: JobStore<String>>(store: S) {
        let a = store.next_job_id().unwrap();
        let b = store.next_job_id().unwrap();
        assert_ne!(a, b);
        store.insert_job(a, &QueueItem::new("a".to_string())).unwrap();
        store.insert_job(b, &QueueItem::new("b".to_string())).unwrap();

        let updated = store
            .update_job(a, |item| {
                item.record_attempt();
                item.set_state(QueueItemState::Processed);
                Ok(())
            })
            .unwrap();
        assert!(updated);
        assert!(!store.update_job(999, |_| Ok(())).unwrap());
        let item = store.get_job(a).unwrap().unwrap();
        assert_eq!(item.attempts(), 1);
        assert_eq!(item.state(), QueueItemState::Processed);
        assert_eq!(item.inner(), "a");

        store.push_ready("Activations", b).unwrap();
        store.push_ready("Activations", a).unwrap();
        assert_eq!(store.job_ids().unwrap(), vec![a, b]);
        assert_eq!(store.ready_ids("Activations").unwrap(), vec![b, a]);
        assert!(store.ready_ids("Transactions").unwrap().is_empty());
        assert_eq!(store.pop_ready("Transactions").unwrap(), None);
        assert_eq!(store.pop_ready("Activations").unwrap(), Some(b));
        assert_eq!(store.pop_ready("Activations").unwrap(), Some(a));
        assert_eq!(store.pop_ready("Activations").unwrap(), None);
    }
}
