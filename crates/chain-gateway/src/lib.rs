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

//! The chain gateway: the only way the activator talks to a chain.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, TransactionReceipt, TransactionRequest, H256, U256,
};
use wallet_activator_types::Chain;
use wallet_activator_utils::{probe, Error, Result};

/// A test gateway recording what it is asked to do.
#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// A contract call: target and calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRequest {
    pub to: Address,
    pub data: Bytes,
}

impl ContractRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
        }
    }

    fn to_transaction(&self, from: Option<Address>) -> TypedTransaction {
        let mut tx =
            TransactionRequest::new().to(self.to).data(self.data.clone());
        if let Some(from) = from {
            tx = tx.from(from);
        }
        tx.into()
    }
}

/// Gas estimation, simulation and broadcasting on one chain.
#[async_trait::async_trait]
pub trait ChainGateway: Send + Sync + std::fmt::Debug {
    /// The chain this gateway talks to.
    fn chain(&self) -> &Chain;
    /// Gas units the call would consume.
    async fn estimate_contract_gas(
        &self,
        request: &ContractRequest,
    ) -> Result<U256>;
    /// Runs the call without broadcasting it.
    ///
    /// A revert is reported as [`Error::SimulationFailed`].
    async fn simulate(&self, request: &ContractRequest) -> Result<Bytes>;
    /// Signs and broadcasts the call, returning the transaction hash.
    async fn send(&self, request: &ContractRequest) -> Result<H256>;
    /// The receipt of a mined transaction, `None` while it is pending.
    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>>;
    /// Current gas price of the chain.
    async fn gas_price(&self) -> Result<U256>;
}

/// A [`ChainGateway`] backed by an ethers [`Middleware`].
#[derive(Debug)]
pub struct EthersGateway<M> {
    chain: Chain,
    client: Arc<M>,
}

impl<M: Middleware> EthersGateway<M> {
    pub fn new(chain: Chain, client: Arc<M>) -> Self {
        Self { chain, client }
    }

    fn middleware_error(err: M::Error) -> Error {
        Error::Middleware(err.to_string())
    }
}

#[async_trait::async_trait]
impl<M> ChainGateway for EthersGateway<M>
where
    M: Middleware + 'static,
{
    fn chain(&self) -> &Chain {
        &self.chain
    }

    #[tracing::instrument(skip(self), fields(chain = %self.chain))]
    async fn estimate_contract_gas(
        &self,
        request: &ContractRequest,
    ) -> Result<U256> {
        let tx = request.to_transaction(self.client.default_sender());
        self.client
            .estimate_gas(&tx, None)
            .await
            .map_err(Self::middleware_error)
    }

    #[tracing::instrument(skip(self), fields(chain = %self.chain))]
    async fn simulate(&self, request: &ContractRequest) -> Result<Bytes> {
        let tx = request.to_transaction(self.client.default_sender());
        match self.client.call(&tx, None).await {
            Ok(output) => Ok(output),
            Err(err) => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Activation,
                    chain = %self.chain,
                    dry_run = "failed",
                    error = %err,
                );
                Err(Error::SimulationFailed(err.to_string()))
            }
        }
    }

    #[tracing::instrument(skip(self), fields(chain = %self.chain))]
    async fn send(&self, request: &ContractRequest) -> Result<H256> {
        let tx = request.to_transaction(self.client.default_sender());
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(Self::middleware_error)?;
        let hash = pending.tx_hash();
        tracing::info!(
            chain = %self.chain,
            tx_hash = ?hash,
            "Tx is submitted and pending!",
        );
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>> {
        self.client
            .get_transaction_receipt(hash)
            .await
            .map_err(Self::middleware_error)
    }

    async fn gas_price(&self) -> Result<U256> {
        self.client
            .get_gas_price()
            .await
            .map_err(Self::middleware_error)
    }
}

/// The gateway of every enabled chain.
#[derive(Debug, Clone, Default)]
pub struct ChainGateways {
    gateways: HashMap<Chain, Arc<dyn ChainGateway>>,
}

impl ChainGateways {
    /// Registers a gateway under its own chain.
    pub fn insert(&mut self, gateway: Arc<dyn ChainGateway>) {
        self.gateways.insert(gateway.chain().clone(), gateway);
    }

    pub fn with(mut self, gateway: Arc<dyn ChainGateway>) -> Self {
        self.insert(gateway);
        self
    }

    /// The gateway of `chain`.
    pub fn get(&self, chain: &Chain) -> Result<Arc<dyn ChainGateway>> {
        self.gateways
            .get(chain)
            .cloned()
            .ok_or_else(|| Error::ChainNotFound {
                chain: chain.to_string(),
            })
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.gateways.keys()
    }
}

#[cfg(test)]
mod tests {
    use ethers::providers::{MockProvider, Provider};

    use super::*;

    fn request() -> ContractRequest {
        ContractRequest::new(Address::repeat_byte(0xfa), vec![0xde, 0xad])
    }

    fn gateway() -> (EthersGateway<Provider<MockProvider>>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        let chain = "zksync-local".parse().unwrap();
        (EthersGateway::new(chain, Arc::new(provider)), mock)
    }

    #[tokio::test]
    async fn estimates_gas() {
        let (gateway, mock) = gateway();
        mock.push::<U256, _>(U256::from(250_000u64)).unwrap();
        let gas = gateway.estimate_contract_gas(&request()).await.unwrap();
        assert_eq!(gas, U256::from(250_000u64));
    }

    #[tokio::test]
    async fn simulation_failure_is_reported() {
        let (gateway, mock) = gateway();
        mock.push::<Bytes, _>(Bytes::from(vec![0x01])).unwrap();
        let output = gateway.simulate(&request()).await.unwrap();
        assert_eq!(output, Bytes::from(vec![0x01]));

        // nothing left to answer with
        let err = gateway.simulate(&request()).await.unwrap_err();
        assert!(matches!(err, Error::SimulationFailed(_)));
    }

    #[tokio::test]
    async fn pending_transaction_has_no_receipt() {
        let (gateway, mock) = gateway();
        let pending: Option<TransactionReceipt> = None;
        mock.push::<Option<TransactionReceipt>, _>(pending).unwrap();
        let receipt = gateway
            .transaction_receipt(H256::repeat_byte(1))
            .await
            .unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn gas_price() {
        let (gateway, mock) = gateway();
        mock.push::<U256, _>(U256::from(25u64)).unwrap();
        assert_eq!(gateway.gas_price().await.unwrap(), U256::from(25u64));
    }

    #[test]
    fn unknown_chain() {
        let (gateway, _mock) = gateway();
        let gateways = ChainGateways::default().with(Arc::new(gateway));
        assert!(gateways.get(&"zksync-local".parse().unwrap()).is_ok());
        let missing = gateways.get(&"zksync".parse().unwrap());
        assert!(matches!(missing, Err(Error::ChainNotFound { .. })));
    }
}
