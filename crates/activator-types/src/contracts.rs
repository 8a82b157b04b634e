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

//! Solidity bindings of the smart account and its proxy factory.
//!
//! ```solidity
//! struct Hook { uint8 selector; bytes config; }
//! struct Policy { uint16 key; uint8 threshold; address[] approvers; Hook[] hooks; }
//!
//! function initialize(Policy[] policies) external;
//! function deploy(address implementation, bytes initializer, bytes32 salt) external returns (address);
//!
//! event PolicyAdded(uint16 indexed key, bytes32 hash);
//! event PolicyRemoved(uint16 indexed key);
//! ```
#![allow(missing_docs)]

use ethers::abi::RawLog;
use ethers::contract::{
    EthAbiCodec, EthAbiType, EthCall, EthEvent, EthLogDecode,
};
use ethers::types::{Address, Bytes};

#[derive(
    Clone, EthAbiType, EthAbiCodec, Default, Debug, PartialEq, Eq, Hash,
)]
pub struct HookStruct {
    pub selector: u8,
    pub config: Bytes,
}

#[derive(
    Clone, EthAbiType, EthAbiCodec, Default, Debug, PartialEq, Eq, Hash,
)]
pub struct PolicyStruct {
    pub key: u16,
    pub threshold: u8,
    pub approvers: Vec<Address>,
    pub hooks: Vec<HookStruct>,
}

#[derive(Clone, EthCall, Default, Debug, PartialEq, Eq, Hash)]
#[ethcall(
    name = "initialize",
    abi = "initialize((uint16,uint8,address[],(uint8,bytes)[])[])"
)]
pub struct InitializeCall {
    pub policies: Vec<PolicyStruct>,
}

#[derive(Clone, EthCall, Default, Debug, PartialEq, Eq, Hash)]
#[ethcall(name = "deploy", abi = "deploy(address,bytes,bytes32)")]
pub struct DeployCall {
    pub implementation: Address,
    pub initializer: Bytes,
    pub salt: [u8; 32],
}

#[derive(Clone, EthEvent, Default, Debug, PartialEq, Eq, Hash)]
#[ethevent(name = "PolicyAdded", abi = "PolicyAdded(uint16,bytes32)")]
pub struct PolicyAddedFilter {
    #[ethevent(indexed)]
    pub key: u16,
    pub hash: [u8; 32],
}

#[derive(Clone, EthEvent, Default, Debug, PartialEq, Eq, Hash)]
#[ethevent(name = "PolicyRemoved", abi = "PolicyRemoved(uint16)")]
pub struct PolicyRemovedFilter {
    #[ethevent(indexed)]
    pub key: u16,
}

/// Policy events emitted by a smart account.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccountEvents {
    PolicyAddedFilter(PolicyAddedFilter),
    PolicyRemovedFilter(PolicyRemovedFilter),
}

impl AccountEvents {
    /// The policy key carried by the event.
    pub fn key(&self) -> u16 {
        match self {
            Self::PolicyAddedFilter(e) => e.key,
            Self::PolicyRemovedFilter(e) => e.key,
        }
    }
}

impl EthLogDecode for AccountEvents {
    fn decode_log(log: &RawLog) -> Result<Self, ethers::abi::Error>
    where
        Self: Sized,
    {
        if let Ok(decoded) =
            <PolicyAddedFilter as EthEvent>::decode_log(log)
        {
            return Ok(AccountEvents::PolicyAddedFilter(decoded));
        }
        if let Ok(decoded) =
            <PolicyRemovedFilter as EthEvent>::decode_log(log)
        {
            return Ok(AccountEvents::PolicyRemovedFilter(decoded));
        }
        Err(ethers::abi::Error::InvalidData)
    }
}

#[cfg(test)]
mod tests {
    use ethers::abi::{AbiEncode, Token};
    use ethers::types::{H256, U256};

    use super::*;

    #[test]
    fn decodes_policy_events() {
        let hash = H256::repeat_byte(0xab);
        let added = RawLog {
            topics: vec![
                PolicyAddedFilter::signature(),
                H256::from_low_u64_be(7),
            ],
            data: ethers::abi::encode(&[Token::FixedBytes(hash.0.to_vec())]),
        };
        let event =
            <AccountEvents as EthLogDecode>::decode_log(&added).unwrap();
        assert_eq!(
            event,
            AccountEvents::PolicyAddedFilter(PolicyAddedFilter {
                key: 7,
                hash: hash.0
            })
        );

        let removed = RawLog {
            topics: vec![
                PolicyRemovedFilter::signature(),
                H256::from_low_u64_be(3),
            ],
            data: vec![],
        };
        let event =
            <AccountEvents as EthLogDecode>::decode_log(&removed).unwrap();
        assert_eq!(event.key(), 3);
    }

    #[test]
    fn unknown_topic_is_rejected() {
        let log = RawLog {
            topics: vec![H256::zero()],
            data: vec![],
        };
        assert!(<AccountEvents as EthLogDecode>::decode_log(&log).is_err());
    }

    #[test]
    fn deploy_calldata_starts_with_selector() {
        let call = DeployCall {
            implementation: Address::repeat_byte(1),
            initializer: Bytes::from(vec![1, 2, 3]),
            salt: [0u8; 32],
        };
        let encoded = call.clone().encode();
        assert_eq!(&encoded[..4], &DeployCall::selector()[..]);
        // implementation word follows the selector
        assert_eq!(
            U256::from_big_endian(&encoded[4..36]),
            U256::from_big_endian(Address::repeat_byte(1).as_bytes())
        );
    }
}
