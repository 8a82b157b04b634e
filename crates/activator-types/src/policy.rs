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

use std::collections::BTreeSet;
use std::fmt;

use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, H256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use crate::contracts::{HookStruct, PolicyStruct};

/// Identifies a policy within its account.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PolicyKey(pub u16);

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for PolicyKey {
    fn from(key: u16) -> Self {
        Self(key)
    }
}

/// A hook run by the account when a policy is checked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    pub selector: u8,
    pub config: Bytes,
}

/// Reasons a policy configuration has no on-chain encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("threshold {threshold} exceeds the {approvers} approvers")]
    ThresholdExceedsApprovers { threshold: u16, approvers: usize },
    #[error("threshold {0} does not fit in a byte")]
    ThresholdOverflow(u16),
    #[error("approver {0:?} is listed more than once")]
    DuplicateApprover(Address),
    #[error("hook selector {0} is listed more than once")]
    DuplicateHook(u8),
    #[error("a removed policy has no configuration")]
    Removed,
}

/// A policy as the account contract sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    pub key: PolicyKey,
    pub threshold: u8,
    pub approvers: BTreeSet<Address>,
    pub hooks: Vec<Hook>,
}

impl Policy {
    /// Validates a stored configuration and builds its on-chain form.
    ///
    /// Approvers are kept sorted, as the contract expects.
    pub fn new(
        key: PolicyKey,
        threshold: u16,
        approvers: &[Address],
        hooks: &[Hook],
    ) -> Result<Self, PolicyError> {
        let threshold_byte = u8::try_from(threshold)
            .map_err(|_| PolicyError::ThresholdOverflow(threshold))?;

        let mut unique = BTreeSet::new();
        for approver in approvers {
            if !unique.insert(*approver) {
                return Err(PolicyError::DuplicateApprover(*approver));
            }
        }
        if usize::from(threshold) > unique.len() {
            return Err(PolicyError::ThresholdExceedsApprovers {
                threshold,
                approvers: unique.len(),
            });
        }

        let mut hooks = hooks.to_vec();
        hooks.sort_by_key(|h| h.selector);
        let duplicate =
            hooks.windows(2).find(|w| w[0].selector == w[1].selector);
        if let Some(w) = duplicate {
            return Err(PolicyError::DuplicateHook(w[0].selector));
        }

        Ok(Self {
            key,
            threshold: threshold_byte,
            approvers: unique,
            hooks,
        })
    }

    /// `keccak256(abi.encode(policy))`, the hash carried by `PolicyAdded`.
    pub fn hash(&self) -> H256 {
        H256(keccak256(PolicyStruct::from(self).encode()))
    }
}

impl From<&Policy> for PolicyStruct {
    fn from(policy: &Policy) -> Self {
        PolicyStruct {
            key: policy.key.0,
            threshold: policy.threshold,
            approvers: policy.approvers.iter().copied().collect(),
            hooks: policy
                .hooks
                .iter()
                .map(|h| HookStruct {
                    selector: h.selector,
                    config: h.config.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approvers(n: u8) -> Vec<Address> {
        (1..=n).map(Address::repeat_byte).collect()
    }

    #[test]
    fn sorts_approvers_and_hooks() {
        let mut list = approvers(3);
        list.reverse();
        let hooks = vec![
            Hook {
                selector: 2,
                config: Bytes::default(),
            },
            Hook {
                selector: 1,
                config: Bytes::from(vec![0xff]),
            },
        ];
        let policy = Policy::new(PolicyKey(1), 2, &list, &hooks).unwrap();
        let sorted: Vec<_> = policy.approvers.iter().copied().collect();
        assert_eq!(sorted, approvers(3));
        assert_eq!(policy.hooks[0].selector, 1);
    }

    #[test]
    fn rejects_invalid_configurations() {
        assert_eq!(
            Policy::new(PolicyKey(1), 3, &approvers(2), &[]),
            Err(PolicyError::ThresholdExceedsApprovers {
                threshold: 3,
                approvers: 2
            })
        );
        assert_eq!(
            Policy::new(PolicyKey(1), 300, &approvers(2), &[]),
            Err(PolicyError::ThresholdOverflow(300))
        );
        let dup = vec![Address::repeat_byte(1), Address::repeat_byte(1)];
        assert_eq!(
            Policy::new(PolicyKey(1), 1, &dup, &[]),
            Err(PolicyError::DuplicateApprover(Address::repeat_byte(1)))
        );
        let hooks = vec![Hook::default(), Hook::default()];
        assert_eq!(
            Policy::new(PolicyKey(1), 1, &approvers(1), &hooks),
            Err(PolicyError::DuplicateHook(0))
        );
    }

    #[test]
    fn hash_depends_on_configuration() {
        let a = Policy::new(PolicyKey(1), 1, &approvers(2), &[]).unwrap();
        let b = Policy::new(PolicyKey(1), 2, &approvers(2), &[]).unwrap();
        let c = Policy::new(PolicyKey(1), 1, &approvers(2), &[]).unwrap();
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), c.hash());
    }
}
