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

use std::sync::Arc;

use ethers::types::U256;
use ethers::utils::format_ether;
use wallet_activator_store::{ActivationStore, JobStore};
use wallet_activator_types::{FactoryRegistry, UAddress};
use wallet_activator_utils::metric::Metrics;
use wallet_activator_utils::{probe, Error, Result};
use wallet_chain_gateway::ChainGateways;
use wallet_job_queue::{
    FlowJob, Job, JobData, JobNode, JobQueue, ACTIVATIONS_QUEUE,
    TRANSACTIONS_QUEUE,
};

use crate::ActivationParams;

/// Works out deployment parameters and fees, and enqueues activations.
#[derive(Debug)]
pub struct ActivationOrchestrator<S> {
    pub(crate) store: Arc<S>,
    pub(crate) gateways: ChainGateways,
    factories: FactoryRegistry,
    pub(crate) metrics: Arc<Metrics>,
}

impl<S> ActivationOrchestrator<S>
where
    S: ActivationStore,
{
    pub fn new(
        store: Arc<S>,
        gateways: ChainGateways,
        factories: FactoryRegistry,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            gateways,
            factories,
            metrics,
        }
    }

    /// The deployment parameters of `address`, or `None` once it is active.
    ///
    /// Init policy states that do not convert to a valid on-chain policy are
    /// left out, so the account is deployed without them.
    pub fn compute_params(
        &self,
        address: &UAddress,
    ) -> Result<Option<ActivationParams>> {
        let account = self.store.select_account(address)?.ok_or_else(|| {
            Error::AccountNotFound {
                address: address.to_string(),
            }
        })?;
        if account.is_active {
            return Ok(None);
        }
        let factory = self.factories.get(address.chain())?;
        let policies = account
            .init_policies
            .iter()
            .filter_map(|state| match state.to_policy() {
                Ok(policy) => Some(policy),
                Err(e) => {
                    tracing::warn!(
                        account = %address,
                        key = %state.key,
                        state = state.id,
                        %e,
                        "Dropping invalid init policy",
                    );
                    self.metrics.policy_conversions_dropped.inc();
                    None
                }
            })
            .collect();
        Ok(Some(ActivationParams {
            factory,
            salt: account.salt,
            implementation: account.implementation,
            policies,
        }))
    }

    /// The activation fee of `address` in wei, or `None` once it is active.
    ///
    /// A cached fee is returned as is. With `consume` it is also cleared, and
    /// only the caller that actually cleared it gets it back: the others get
    /// a fresh estimate, `deploy gas * fee_per_gas`.
    pub async fn estimate_fee(
        &self,
        address: &UAddress,
        fee_per_gas: U256,
        consume: bool,
    ) -> Result<Option<U256>> {
        let account = self.store.get_account(address)?.ok_or_else(|| {
            Error::AccountNotFound {
                address: address.to_string(),
            }
        })?;
        if account.is_active {
            return Ok(None);
        }

        if let Some(fee) = self.store.activation_fee(address)? {
            if !consume {
                return Ok(Some(fee));
            }
            if self.store.clear_activation_fee_if(address, fee)? {
                return Ok(Some(fee));
            }
            tracing::debug!(
                account = %address,
                "Cached fee consumed concurrently, estimating a new one",
            );
        }

        let Some(params) = self.compute_params(address)? else {
            return Ok(None);
        };
        let gateway = self.gateways.get(address.chain())?;
        let gas = gateway
            .estimate_contract_gas(&params.deploy_request())
            .await?;
        let fee = gas.checked_mul(fee_per_gas).ok_or(Error::FeeOverflow)?;
        tracing::trace!(
            account = %address,
            %gas,
            %fee_per_gas,
            "Estimated activation fee: {} ETH",
            format_ether(fee),
        );
        Ok(Some(fee))
    }

    /// Quotes the activation fee of `address` and caches it, so the charge
    /// made once the deployment is mined needs no new estimate. An already
    /// cached fee is kept.
    pub async fn quote_fee(
        &self,
        address: &UAddress,
        fee_per_gas: U256,
    ) -> Result<Option<U256>> {
        if let Some(fee) = self.store.activation_fee(address)? {
            return Ok(Some(fee));
        }
        let fee = self.estimate_fee(address, fee_per_gas, false).await?;
        if let Some(fee) = fee {
            self.store.set_activation_fee(address, Some(fee))?;
            tracing::debug!(
                account = %address,
                "Quoted activation fee of {} ETH",
                format_ether(fee),
            );
        }
        Ok(fee)
    }

    /// Takes the fee to charge for the now active `address`: its cached fee,
    /// cleared so nobody takes it twice, else `spent` (the fee paid by the
    /// deployment receipt).
    pub fn take_fee(
        &self,
        address: &UAddress,
        spent: Option<U256>,
    ) -> Result<Option<U256>> {
        if let Some(fee) = self.store.activation_fee(address)? {
            if self.store.clear_activation_fee_if(address, fee)? {
                return Ok(Some(fee));
            }
        }
        Ok(spent)
    }

    /// The flow activating `account`: its deployment, then the transaction
    /// confirming it.
    pub fn build_job_description(&self, account: &UAddress) -> FlowJob {
        let activation = FlowJob::new(
            ACTIVATIONS_QUEUE,
            "Activation",
            JobData::Activation {
                account: account.clone(),
            },
        );
        FlowJob::new(
            TRANSACTIONS_QUEUE,
            "Transaction",
            JobData::Transaction {
                chain: account.chain().clone(),
            },
        )
        .with_child(activation)
    }

    /// Enqueues the activation of `account`.
    pub fn activate<Q>(
        &self,
        queue: &JobQueue<Q>,
        account: &UAddress,
    ) -> Result<JobNode>
    where
        Q: JobStore<Job>,
    {
        if self.store.get_account(account)?.is_none() {
            return Err(Error::AccountNotFound {
                address: account.to_string(),
            });
        }
        let node = queue.add_flow(self.build_job_description(account))?;
        self.metrics.activations_enqueued.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Activation,
            %account,
            job = node.id,
            enqueued = true,
        );
        Ok(node)
    }
}
