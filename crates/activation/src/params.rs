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

use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, H256};
use wallet_activator_types::contracts::{
    DeployCall, InitializeCall, PolicyStruct,
};
use wallet_activator_types::Policy;
use wallet_chain_gateway::ContractRequest;

/// Everything needed to deploy an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationParams {
    /// The account factory of the account's chain.
    pub factory: Address,
    pub salt: H256,
    /// The account implementation the proxy points to.
    pub implementation: Address,
    /// The policies the account is initialized with.
    pub policies: Vec<Policy>,
}

impl ActivationParams {
    /// Calldata of `initialize(Policy[])`.
    pub fn initializer(&self) -> Bytes {
        InitializeCall {
            policies: self.policies.iter().map(PolicyStruct::from).collect(),
        }
        .encode()
        .into()
    }

    /// The factory call deploying and initializing the account.
    pub fn deploy_request(&self) -> ContractRequest {
        let call = DeployCall {
            implementation: self.implementation,
            initializer: self.initializer(),
            salt: self.salt.0,
        };
        ContractRequest::new(self.factory, call.encode())
    }
}
