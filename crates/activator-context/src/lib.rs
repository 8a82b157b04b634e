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

#![warn(missing_docs)]
//! # Activator Context Module 🕸️
//!
//! A module for managing the context of the wallet activator.

use std::sync::Arc;
use std::time::Duration;

use ethers::middleware::SignerMiddleware;
use ethers::providers::{
    Http, HttpRateLimitRetryPolicy, Provider, RetryClient, RetryClientBuilder,
};
use ethers::signers::{LocalWallet, Signer};
use tokio::sync::broadcast;
use wallet_activator_config::ActivatorConfig;
use wallet_activator_types::Chain;
use wallet_activator_utils::metric::Metrics;
use wallet_activator_utils::{Error, Result};
use wallet_chain_gateway::{ChainGateways, EthersGateway};

/// Ethereum client using Ethers, that includes a retry strategy.
pub type EthersClient = Provider<RetryClient<Http>>;

/// Ethereum client signing with the activator's wallet.
pub type SignerClient = SignerMiddleware<EthersClient, LocalWallet>;

/// ActivatorContext contains the activator's configuration, metrics and
/// shutdown signal.
#[derive(Clone)]
pub struct ActivatorContext {
    /// The configuration of the activator.
    pub config: ActivatorConfig,
    /// Broadcasts a shutdown signal to all running tasks.
    ///
    /// Every spawned task holds a [`Shutdown`] subscribed to this sender and
    /// stops once a `()` is sent through it.
    notify_shutdown: broadcast::Sender<()>,
    /// Represents the metrics for the activator
    pub metrics: Arc<Metrics>,
}

impl ActivatorContext {
    /// Creates a new ActivatorContext.
    pub fn new(config: ActivatorConfig) -> Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Arc::new(Metrics::new()?);
        Ok(Self {
            config,
            notify_shutdown,
            metrics,
        })
    }

    /// Returns a broadcast receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends a shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }

    /// Returns a new `EthereumProvider` for `chain`, retrying rate limited
    /// requests.
    pub fn evm_provider(&self, chain: &Chain) -> Result<EthersClient> {
        let chain_config = self.config.chain(chain)?;
        let http = Http::new(chain_config.http_endpoint.as_url().clone());
        let client = RetryClientBuilder::default()
            .rate_limit_retries(10)
            .timeout_retries(3)
            .initial_backoff(Duration::from_millis(500))
            .build(http, Box::<HttpRateLimitRetryPolicy>::default());
        let provider =
            Provider::new(client).interval(Duration::from_millis(500u64));
        Ok(provider)
    }

    /// Sets up and returns the EVM wallet deploying accounts on `chain`.
    pub fn evm_wallet(&self, chain: &Chain) -> Result<LocalWallet> {
        let chain_config = self.config.chain(chain)?;
        let private_key = chain_config
            .private_key
            .as_ref()
            .ok_or(Error::MissingSecrets)?;
        let wallet = LocalWallet::from_bytes(private_key.as_bytes())?
            .with_chain_id(chain_config.chain_id);
        Ok(wallet)
    }

    /// A gateway, signing with the activator's wallet, for every
    /// configured chain.
    pub fn gateways(&self) -> Result<ChainGateways> {
        let mut gateways = ChainGateways::default();
        for chain_config in self.config.chains.values() {
            let chain: Chain = chain_config.name.parse()?;
            let client = SignerMiddleware::new(
                self.evm_provider(&chain)?,
                self.evm_wallet(&chain)?,
            );
            tracing::debug!(
                %chain,
                endpoint = %chain_config.http_endpoint,
                "Chain gateway ready",
            );
            gateways.insert(Arc::new(EthersGateway::new(
                chain,
                Arc::new(client),
            )));
        }
        Ok(gateways)
    }
}

/// Listens for the shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, every
/// task should stop.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal has
/// been received. Callers may query for whether the shutdown signal has been
/// received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,
    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Returns `true` if the shutdown signal has been received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str =
        "0x8f2a55949038a9610f50fb23b5883af3b4ecb3c3bb792cbcefbd1542c692be63";

    fn context() -> ActivatorContext {
        let config: ActivatorConfig = serde_json::from_value(serde_json::json!({
            "chains": {
                "zksync": {
                    "name": "zksync",
                    "enabled": true,
                    "http-endpoint": "http://localhost:8545",
                    "chain-id": 324,
                    "private-key": KEY,
                    "account-factory": "0x00000000000000000000000000000000000000fa",
                }
            }
        }))
        .unwrap();
        ActivatorContext::new(config).unwrap()
    }

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber() {
        let ctx = context();
        let mut first = ctx.shutdown_signal();
        let mut second = ctx.shutdown_signal();
        assert!(!first.is_shutdown());
        ctx.shutdown();
        first.recv().await;
        second.recv().await;
        assert!(first.is_shutdown());
        // already received, returns right away
        first.recv().await;
    }

    #[test]
    fn wallet_signs_for_the_configured_chain() {
        let ctx = context();
        let wallet = ctx.evm_wallet(&"zksync".parse().unwrap()).unwrap();
        assert_eq!(wallet.chain_id(), 324);
    }

    #[test]
    fn unknown_chains_are_errors() {
        let ctx = context();
        let chain: Chain = "scroll".parse().unwrap();
        assert!(matches!(
            ctx.evm_provider(&chain),
            Err(Error::ChainNotFound { .. })
        ));
        assert!(matches!(
            ctx.evm_wallet(&chain),
            Err(Error::ChainNotFound { .. })
        ));
    }

    #[test]
    fn one_gateway_per_chain() {
        let ctx = context();
        let gateways = ctx.gateways().unwrap();
        let chains: Vec<_> = gateways.chains().cloned().collect();
        assert_eq!(chains, vec!["zksync".parse::<Chain>().unwrap()]);
    }
}
