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

use ethers::types::Address;
use serde::Deserialize;
use wallet_activator_types::private_key::PrivateKey;
use wallet_activator_types::rpc_url::RpcUrl;

use crate::event_watcher::EventsWatcherConfig;

/// ChainConfig is the configuration of a chain accounts are deployed on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// Boolean indicating the chain is enabled or not.
    #[serde(default)]
    pub enabled: bool,
    /// Http(s) Endpoint for quick Req/Res
    pub http_endpoint: RpcUrl,
    /// chain specific id.
    pub chain_id: u64,
    /// The Private Key of the account deploying smart accounts.
    ///
    /// Accepts a `0x` prefixed hex string or `$ENV_VAR`.
    pub private_key: Option<PrivateKey>,
    /// The proxy factory deploying smart accounts.
    pub account_factory: Address,
    /// Block confirmations
    #[serde(default)]
    pub block_confirmations: u8,
    /// Logs watcher of the account events.
    #[serde(default)]
    pub events_watcher: EventsWatcherConfig,
}
