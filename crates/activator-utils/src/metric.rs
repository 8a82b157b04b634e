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

use prometheus::core::{AtomicF64, GenericCounter};
use prometheus::{Encoder, Opts, Registry, TextEncoder};

/// A struct definition for collecting metrics in the activator.
///
/// Every instance owns its own [`Registry`], so several services (or tests)
/// can live in the same process.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Activation flows handed to the job queue.
    pub activations_enqueued: GenericCounter<AtomicF64>,
    /// Deployment transactions sent to the chain.
    pub accounts_deployed: GenericCounter<AtomicF64>,
    /// Accounts marked active after their deployment was confirmed.
    pub accounts_activated: GenericCounter<AtomicF64>,
    /// Activation fees charged, in wei.
    pub activation_fees_charged: GenericCounter<AtomicF64>,
    /// Init policy states dropped because they have no on-chain encoding.
    pub policy_conversions_dropped: GenericCounter<AtomicF64>,
    /// Policy states whose activation block was set from a chain event.
    pub policy_states_activated: GenericCounter<AtomicF64>,
    /// Policy logs skipped because they could not be decoded.
    pub policy_logs_skipped: GenericCounter<AtomicF64>,
    /// Event handlers that failed after exhausting their retries.
    pub handler_failures: GenericCounter<AtomicF64>,
    /// Logs watcher back off metric
    pub logs_watcher_back_off: GenericCounter<AtomicF64>,
    /// Job queue back off metric
    pub job_queue_back_off: GenericCounter<AtomicF64>,
    registry: Registry,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the counters and
    /// registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| {
            let counter = GenericCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(counter.clone()))?;
            Ok::<_, prometheus::Error>(counter)
        };

        Ok(Self {
            activations_enqueued: counter(
                "activations_enqueued",
                "The total number of activation flows enqueued",
            )?,
            accounts_deployed: counter(
                "accounts_deployed",
                "The total number of account deployment transactions sent",
            )?,
            accounts_activated: counter(
                "accounts_activated",
                "The total number of accounts marked active",
            )?,
            activation_fees_charged: counter(
                "activation_fees_charged",
                "Total activation fees charged (in wei)",
            )?,
            policy_conversions_dropped: counter(
                "policy_conversions_dropped",
                "Init policy states dropped from deployment parameters",
            )?,
            policy_states_activated: counter(
                "policy_states_activated",
                "Policy states confirmed by a chain event",
            )?,
            policy_logs_skipped: counter(
                "policy_logs_skipped",
                "Policy logs skipped as undecodable",
            )?,
            handler_failures: counter(
                "handler_failures",
                "Event handlers failing after all retries",
            )?,
            logs_watcher_back_off: counter(
                "logs_watcher_back_off",
                "specifies how many times the logs watcher backed off",
            )?,
            job_queue_back_off: counter(
                "job_queue_back_off",
                "specifies how many times a job was put back on its queue",
            )?,
            registry: registry.clone(),
        })
    }

    /// Gathers the whole activator metrics in the prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, GatherMetricsError> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatherMetricsError {
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    #[error(transparent)]
    FromUtf8Error(#[from] std::string::FromUtf8Error),
}
