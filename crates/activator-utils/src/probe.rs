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

use derive_more::Display;
/// Target for logger
pub const TARGET: &str = "wallet_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the activator changes, like starting or shutting down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Logs watcher sync state on a specific chain.
    #[display(fmt = "sync")]
    Sync,
    /// Job queue state for a specific queue.
    #[display(fmt = "job_queue")]
    JobQueue,
    /// Account activation progress.
    #[display(fmt = "activation")]
    Activation,
    /// Policy state reconciliation from chain events.
    #[display(fmt = "policy_events")]
    PolicyEvents,
    /// When the activator will retry to do something.
    #[display(fmt = "retry")]
    Retry,
}
