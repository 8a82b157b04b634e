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

use ethers::types::U64;
use ethers::utils::format_ether;
use wallet_activator_store::ActivationStore;
use wallet_activator_utils::{probe, Error, Result};
use wallet_job_queue::{
    ActiveJob, JobData, JobOutput, JobProcessor, ACTIVATIONS_QUEUE,
    TRANSACTIONS_QUEUE,
};

use crate::ActivationOrchestrator;

fn unexpected(queue: &str, job: &ActiveJob) -> Error {
    Error::UnexpectedJob {
        queue: queue.to_owned(),
        name: job.job.name.clone(),
    }
}

/// Sends the deployment of an account (`Activations` queue).
#[derive(Debug)]
pub struct ActivationJobProcessor<S> {
    orchestrator: Arc<ActivationOrchestrator<S>>,
}

impl<S> ActivationJobProcessor<S> {
    pub fn new(orchestrator: Arc<ActivationOrchestrator<S>>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait::async_trait]
impl<S> JobProcessor for ActivationJobProcessor<S>
where
    S: ActivationStore + 'static,
{
    fn queue_name(&self) -> &'static str {
        ACTIVATIONS_QUEUE
    }

    #[tracing::instrument(skip_all, fields(job = job.id))]
    async fn process(
        &self,
        job: &ActiveJob,
        _children: &[JobOutput],
    ) -> Result<JobOutput> {
        let JobData::Activation { account } = &job.job.data else {
            return Err(unexpected(ACTIVATIONS_QUEUE, job));
        };
        let Some(params) = self.orchestrator.compute_params(account)? else {
            tracing::debug!(%account, "Account already active, skipping");
            return Ok(JobOutput::Skipped {
                account: account.clone(),
            });
        };
        let gateway = self.orchestrator.gateways.get(account.chain())?;
        let request = params.deploy_request();
        // a deployment that would revert is never sent.
        gateway.simulate(&request).await?;
        // once deployed, the deployment can no longer be estimated.
        let quote = match gateway.gas_price().await {
            Ok(fee_per_gas) => {
                self.orchestrator.quote_fee(account, fee_per_gas).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = quote {
            tracing::warn!(
                %account,
                %e,
                "Could not quote activation fee, charging the receipt",
            );
        }
        let transaction = gateway.send(&request).await?;
        self.orchestrator.metrics.accounts_deployed.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Activation,
            %account,
            tx = ?transaction,
            deployed = true,
        );
        Ok(JobOutput::Deployed {
            account: account.clone(),
            transaction,
        })
    }
}

/// Confirms the deployments of its children, marks the accounts active and
/// charges their fee (`Transactions` queue).
#[derive(Debug)]
pub struct TransactionJobProcessor<S> {
    orchestrator: Arc<ActivationOrchestrator<S>>,
}

impl<S> TransactionJobProcessor<S> {
    pub fn new(orchestrator: Arc<ActivationOrchestrator<S>>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait::async_trait]
impl<S> JobProcessor for TransactionJobProcessor<S>
where
    S: ActivationStore + 'static,
{
    fn queue_name(&self) -> &'static str {
        TRANSACTIONS_QUEUE
    }

    #[tracing::instrument(skip_all, fields(job = job.id))]
    async fn process(
        &self,
        job: &ActiveJob,
        children: &[JobOutput],
    ) -> Result<JobOutput> {
        if !matches!(job.job.data, JobData::Transaction { .. }) {
            return Err(unexpected(TRANSACTIONS_QUEUE, job));
        }
        let mut accounts = Vec::new();
        for output in children {
            let JobOutput::Deployed {
                account,
                transaction,
            } = output
            else {
                continue;
            };
            let gateway = self.orchestrator.gateways.get(account.chain())?;
            let receipt = gateway
                .transaction_receipt(*transaction)
                .await?
                .ok_or(Error::TransactionPending(*transaction))?;
            if receipt.status == Some(U64::zero()) {
                return Err(Error::DeploymentReverted(*transaction));
            }
            // a retry finds the account active and charges nothing twice.
            if !self.orchestrator.store.mark_account_active(account)? {
                accounts.push(account.clone());
                continue;
            }
            self.orchestrator.metrics.accounts_activated.inc();
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Activation,
                %account,
                tx = ?transaction,
                active = true,
            );
            let fee_per_gas = match receipt.effective_gas_price {
                Some(price) => Some(price),
                None => gateway.gas_price().await.ok(),
            };
            let spent = receipt
                .gas_used
                .zip(fee_per_gas)
                .and_then(|(gas, price)| gas.checked_mul(price));
            match self.orchestrator.take_fee(account, spent)? {
                Some(fee) => {
                    self.orchestrator.metrics.activation_fees_charged.inc_by(
                        u128::try_from(fee).map_or(f64::MAX, |f| f as f64),
                    );
                    tracing::info!(
                        %account,
                        "Charging activation fee of {} ETH",
                        format_ether(fee),
                    );
                }
                None => tracing::warn!(
                    %account,
                    tx = ?transaction,
                    "No activation fee to charge",
                ),
            }
            accounts.push(account.clone());
        }
        Ok(JobOutput::Confirmed { accounts })
    }
}
