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

use std::collections::HashMap;

use ethers::types::{Bytes, TransactionReceipt, H256, U256, U64};
use parking_lot::Mutex;
use wallet_activator_types::Chain;
use wallet_activator_utils::{Error, Result};

use crate::{ChainGateway, ContractRequest};

/// A [`ChainGateway`] answering from canned values and recording calls.
#[derive(Debug)]
pub struct MockGateway {
    chain: Chain,
    gas_estimate: Mutex<U256>,
    gas_price: Mutex<U256>,
    simulation_error: Mutex<Option<String>>,
    redeployment_error: Mutex<Option<String>>,
    estimated: Mutex<Vec<ContractRequest>>,
    sent: Mutex<Vec<ContractRequest>>,
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
}

impl MockGateway {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            gas_estimate: Mutex::new(U256::from(100_000u64)),
            gas_price: Mutex::new(U256::from(1u64)),
            simulation_error: Mutex::new(None),
            redeployment_error: Mutex::new(None),
            estimated: Mutex::default(),
            sent: Mutex::default(),
            receipts: Mutex::default(),
        }
    }

    pub fn set_gas_estimate(&self, gas: U256) {
        *self.gas_estimate.lock() = gas;
    }

    pub fn set_gas_price(&self, price: U256) {
        *self.gas_price.lock() = price;
    }

    /// Makes every following simulation revert with `reason`.
    pub fn fail_simulation(&self, reason: &str) {
        *self.simulation_error.lock() = Some(reason.to_owned());
    }

    /// Makes gas estimation revert with `reason` once something was sent,
    /// the way a deployed account cannot be deployed again.
    pub fn revert_redeployments(&self, reason: &str) {
        *self.redeployment_error.lock() = Some(reason.to_owned());
    }

    /// Mines a sent transaction with the given status and gas price. It uses
    /// the current gas estimate as gas.
    pub fn mine(&self, hash: H256, success: bool, effective_gas_price: U256) {
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            status: Some(U64::from(u64::from(success))),
            effective_gas_price: Some(effective_gas_price),
            gas_used: Some(*self.gas_estimate.lock()),
            block_number: Some(U64::from(1u64)),
            ..Default::default()
        };
        self.receipts.lock().insert(hash, receipt);
    }

    /// Requests passed to `estimate_contract_gas`.
    pub fn estimated(&self) -> Vec<ContractRequest> {
        self.estimated.lock().clone()
    }

    /// Requests broadcast with `send`.
    pub fn sent(&self) -> Vec<ContractRequest> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl ChainGateway for MockGateway {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    async fn estimate_contract_gas(
        &self,
        request: &ContractRequest,
    ) -> Result<U256> {
        self.estimated.lock().push(request.clone());
        if !self.sent.lock().is_empty() {
            if let Some(reason) = self.redeployment_error.lock().clone() {
                return Err(Error::Middleware(reason));
            }
        }
        Ok(*self.gas_estimate.lock())
    }

    async fn simulate(&self, _request: &ContractRequest) -> Result<Bytes> {
        match self.simulation_error.lock().clone() {
            Some(reason) => Err(Error::SimulationFailed(reason)),
            None => Ok(Bytes::default()),
        }
    }

    async fn send(&self, request: &ContractRequest) -> Result<H256> {
        let mut sent = self.sent.lock();
        sent.push(request.clone());
        Ok(H256::from_low_u64_be(sent.len() as u64))
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>> {
        Ok(self.receipts.lock().get(&hash).cloned())
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(*self.gas_price.lock())
    }
}
