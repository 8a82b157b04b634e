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

//! # Activator Configuration Module 🕸️
//!
//! A module for configuring the wallet activator.
//!
//! ## Overview
//!
//! Possible configuration include:
//! * `chains`: the chains accounts are deployed on, with their RPC endpoint,
//!   signer, account factory and logs watcher settings.
//! * `policy-events`: how chain events are matched to policy states.
//! * `job-queue`: polling and retry settings of the job workers.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Default values of optional settings.
pub mod defaults;
/// Chain configuration
pub mod evm;
/// Event watcher configuration
pub mod event_watcher;
/// Utils for processing configuration
pub mod utils;

use std::collections::HashMap;

use ethers::types::Address;
use evm::ChainConfig;
use serde::Deserialize;
use wallet_activator_types::{Chain, FactoryRegistry};
use wallet_activator_utils::{Error, Result};

/// ActivatorConfig is the configuration of the wallet activator.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ActivatorConfig {
    /// A map between chain name and its configuration.
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
    /// Policy events reconciliation settings.
    #[serde(default)]
    pub policy_events: PolicyEventsConfig,
    /// Job workers settings.
    #[serde(default)]
    pub job_queue: JobQueueConfig,
}

impl ActivatorConfig {
    /// The configuration of `chain`.
    pub fn chain(&self, chain: &Chain) -> Result<&ChainConfig> {
        self.chains
            .get(chain.as_str())
            .ok_or_else(|| Error::ChainNotFound {
                chain: chain.to_string(),
            })
    }

    /// The account factory of every configured chain.
    pub fn factories(&self) -> Result<FactoryRegistry> {
        self.chains
            .values()
            .map(|c| -> Result<(Chain, Address)> {
                Ok((c.name.parse()?, c.account_factory))
            })
            .collect()
    }
}

/// How `PolicyAdded`/`PolicyRemoved` events are matched to policy states.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyEventsConfig {
    /// Also require the policy hash carried by `PolicyAdded` to match the
    /// state.
    ///
    /// Off by default: two states of one policy applied by the same proposal
    /// are then both confirmed by either event.
    #[serde(default)]
    pub match_state_hash: bool,
}

/// Job workers settings.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct JobQueueConfig {
    /// How long an idle worker waits before polling again, in milliseconds.
    #[serde(default = "defaults::job_poll_interval")]
    pub poll_interval: u64,
    /// Attempts per job before it is failed.
    #[serde(default = "defaults::job_max_attempts")]
    pub max_attempts: u32,
    /// Delay before a failed attempt is retried, in milliseconds.
    #[serde(default = "defaults::job_retry_delay")]
    pub retry_delay: u64,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: defaults::job_poll_interval(),
            max_attempts: defaults::job_max_attempts(),
            retry_delay: defaults::job_retry_delay(),
        }
    }
}
