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

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use wallet_activator_types::{Hook, Policy, PolicyError, PolicyKey, UAddress};

/// Id of a stored policy state.
pub type PolicyStateId = u64;
/// Id of a stored proposal.
pub type ProposalId = u64;

/// A smart account tracked by the activator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub address: UAddress,
    pub name: String,
    pub implementation: Address,
    pub salt: H256,
    #[serde(default)]
    pub is_active: bool,
}

/// A named policy of an account. `key` is unique within the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    pub account: UAddress,
    pub key: PolicyKey,
    pub name: String,
}

/// A versioned configuration of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStateRecord {
    pub id: PolicyStateId,
    pub account: UAddress,
    pub key: PolicyKey,
    pub threshold: u16,
    pub approvers: Vec<Address>,
    #[serde(default)]
    pub hooks: Vec<Hook>,
    #[serde(default)]
    pub is_removed: bool,
    /// Part of the policies the account is deployed with.
    #[serde(default)]
    pub is_account_init_state: bool,
    /// The proposal that changes the policy to this state, absent for the
    /// genesis state.
    pub proposal: Option<ProposalId>,
    /// Block of the event confirming this state on chain.
    pub activation_block: Option<u64>,
}

impl PolicyStateRecord {
    /// A new unconfirmed state, not yet linked to a proposal.
    pub fn draft(
        account: UAddress,
        key: PolicyKey,
        threshold: u16,
        approvers: Vec<Address>,
    ) -> Self {
        Self {
            id: 0,
            account,
            key,
            threshold,
            approvers,
            hooks: Vec::new(),
            is_removed: false,
            is_account_init_state: false,
            proposal: None,
            activation_block: None,
        }
    }

    /// Flags the state as part of the account's genesis policies.
    pub fn init_state(mut self) -> Self {
        self.is_account_init_state = true;
        self
    }

    /// Links the state to the proposal applying it.
    pub fn with_proposal(mut self, proposal: ProposalId) -> Self {
        self.proposal = Some(proposal);
        self
    }

    pub fn with_hooks(mut self, hooks: Vec<Hook>) -> Self {
        self.hooks = hooks;
        self
    }

    /// A state that removes the policy.
    pub fn removal(mut self) -> Self {
        self.is_removed = true;
        self
    }

    pub fn is_active(&self) -> bool {
        self.activation_block.is_some()
    }

    /// Converts the stored configuration into its on-chain encoding.
    pub fn to_policy(&self) -> Result<Policy, PolicyError> {
        if self.is_removed {
            return Err(PolicyError::Removed);
        }
        Policy::new(self.key, self.threshold, &self.approvers, &self.hooks)
    }
}

/// A set of pending changes awaiting approval, executed by one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRecord {
    pub id: ProposalId,
    pub account: UAddress,
    pub transaction: Option<H256>,
}

/// A policy with its confirmed state and pending draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyView {
    pub policy: PolicyRecord,
    /// Latest state with an activation block.
    pub state: Option<PolicyStateRecord>,
    /// Latest state still waiting for its activation block.
    pub draft: Option<PolicyStateRecord>,
}

/// The account fields read when deciding on and building an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountActivation {
    pub is_active: bool,
    pub implementation: Address,
    pub salt: H256,
    /// Cached activation fee, in wei.
    pub activation_eth_fee: Option<U256>,
    pub init_policies: Vec<PolicyStateRecord>,
}

/// Selects the policy states a chain event confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStateFilter {
    pub account: UAddress,
    pub key: PolicyKey,
    /// Hash of the transaction that emitted the event.
    pub transaction_hash: H256,
    /// When set, the state's policy hash must equal it.
    pub state_hash: Option<H256>,
}

impl PolicyStateFilter {
    /// Whether `state` is an unconfirmed state this event confirms.
    ///
    /// `proposal_transaction` is the transaction of the state's proposal, if
    /// any. A genesis state matches any event for its account and key.
    pub fn matches(
        &self,
        state: &PolicyStateRecord,
        proposal_transaction: Option<H256>,
    ) -> bool {
        if state.activation_block.is_some()
            || state.account != self.account
            || state.key != self.key
        {
            return false;
        }
        let from_proposal = proposal_transaction == Some(self.transaction_hash);
        if !from_proposal && !state.is_account_init_state {
            return false;
        }
        match self.state_hash {
            None => true,
            Some(hash) => state
                .to_policy()
                .map(|policy| policy.hash() == hash)
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> UAddress {
        "zksync:0x00000000000000000000000000000000000000aa"
            .parse()
            .unwrap()
    }

    fn filter(state_hash: Option<H256>) -> PolicyStateFilter {
        PolicyStateFilter {
            account: account(),
            key: PolicyKey(1),
            transaction_hash: H256::repeat_byte(0x01),
            state_hash,
        }
    }

    #[test]
    fn matches_proposal_transaction() {
        let state = PolicyStateRecord::draft(
            account(),
            PolicyKey(1),
            1,
            vec![Address::repeat_byte(1)],
        )
        .with_proposal(7);
        assert!(filter(None).matches(&state, Some(H256::repeat_byte(0x01))));
        assert!(!filter(None).matches(&state, Some(H256::repeat_byte(0x02))));
        assert!(!filter(None).matches(&state, None));
    }

    #[test]
    fn genesis_matches_any_transaction() {
        let state = PolicyStateRecord::draft(
            account(),
            PolicyKey(1),
            1,
            vec![Address::repeat_byte(1)],
        )
        .init_state();
        assert!(filter(None).matches(&state, None));

        let mut other_key = state.clone();
        other_key.key = PolicyKey(2);
        assert!(!filter(None).matches(&other_key, None));
    }

    #[test]
    fn confirmed_states_never_match() {
        let mut state = PolicyStateRecord::draft(
            account(),
            PolicyKey(1),
            1,
            vec![Address::repeat_byte(1)],
        )
        .init_state();
        state.activation_block = Some(10);
        assert!(!filter(None).matches(&state, None));
    }

    #[test]
    fn state_hash_narrows_the_match() {
        let state = PolicyStateRecord::draft(
            account(),
            PolicyKey(1),
            1,
            vec![Address::repeat_byte(1)],
        )
        .init_state();
        let hash = state.to_policy().unwrap().hash();
        assert!(filter(Some(hash)).matches(&state, None));
        assert!(!filter(Some(H256::zero())).matches(&state, None));
    }

    #[test]
    fn removal_has_no_encoding() {
        let state =
            PolicyStateRecord::draft(account(), PolicyKey(1), 0, vec![])
                .removal();
        assert_eq!(state.to_policy(), Err(PolicyError::Removed));
    }
}
