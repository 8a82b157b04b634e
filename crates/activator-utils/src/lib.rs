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

//! Shared building blocks for every crate of the wallet activator: the error
//! type, retry policies, probe targets and prometheus metrics.

use ethers::types::H256;

/// Metrics functionality
pub mod metric;
/// A module used for debugging the activator lifecycle, sync state, or job progress.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered while activating
/// accounts or reconciling policy events.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Elliptic Curve error.
    #[error(transparent)]
    EllipticCurve(#[from] ethers::core::k256::elliptic_curve::Error),
    /// Ethers Provider error.
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Ethers wallet error.
    #[error(transparent)]
    EthersWallet(#[from] ethers::signers::WalletError),
    /// ABI encoding or decoding error.
    #[error(transparent)]
    Abi(#[from] ethers::abi::Error),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Prometheus registry error.
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    /// Error reported by a generic ethers middleware.
    #[error("Middleware error: {0}")]
    Middleware(String),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// Config parse error, with the path of the offending key.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// No account is stored under the requested address.
    #[error("Account not found: {address}")]
    AccountNotFound {
        /// The requested account address.
        address: String,
    },
    /// Chain not found in the configured chains.
    #[error("Chain Not Found: {}", chain)]
    ChainNotFound {
        /// The chain name.
        chain: String,
    },
    /// No account factory is registered for the chain.
    #[error("Account factory not found for chain: {}", chain)]
    FactoryNotFound {
        /// The chain name.
        chain: String,
    },
    /// The deployment call reverted while being simulated.
    #[error("Simulation failed: {0}")]
    SimulationFailed(String),
    /// The transaction has not been mined yet.
    #[error("Transaction {0:?} is still pending")]
    TransactionPending(H256),
    /// The deployment transaction was mined but reverted.
    #[error("Deployment transaction {0:?} reverted")]
    DeploymentReverted(H256),
    /// Gas estimate multiplied by fee per gas does not fit 256 bits.
    #[error("Activation fee overflowed")]
    FeeOverflow,
    /// A chain log is missing metadata that is only absent on pending logs.
    #[error("Log is missing its {0}")]
    MissingLogMetadata(&'static str),
    /// Job not found in the job store.
    #[error("Job {0} not found")]
    JobNotFound(u64),
    /// A job processor received a job it does not handle.
    #[error("Unexpected job {name} on queue {queue}")]
    UnexpectedJob {
        /// The queue the job was pulled from.
        queue: String,
        /// The job name.
        name: String,
    },
    /// Missing Secrets in the config, like a private key.
    #[error("Missing required private-key in the config")]
    MissingSecrets,
    /// a backgorund task failed and force restarted.
    #[error("Task Force Restarted from an error")]
    ForceRestart,
    /// a backgorund task failed and stopped abnormally.
    #[error("Task Stopped Apnormally")]
    TaskStoppedAbnormally,
}

/// A type alias for the result used across the wallet activator.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_not_found_names_the_address() {
        let err = Error::AccountNotFound {
            address: "zksync:0x0000000000000000000000000000000000000001"
                .to_string(),
        };
        assert!(err
            .to_string()
            .contains("zksync:0x0000000000000000000000000000000000000001"));
    }
}
