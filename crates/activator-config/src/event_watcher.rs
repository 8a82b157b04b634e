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

use serde::Deserialize;

use crate::defaults;

/// EventsWatcherConfiguration is the configuration for the logs watcher of a chain.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct EventsWatcherConfig {
    /// A flag for enabling the logs watcher.
    #[serde(default = "defaults::enable_events_watcher")]
    pub enabled: bool,
    /// Polling interval in milliseconds
    #[serde(default = "defaults::polling_interval")]
    pub polling_interval: u64,
    /// The maximum number of blocks to fetch logs for in one request.
    #[serde(default = "defaults::max_blocks_per_step")]
    pub max_blocks_per_step: u64,
    /// print sync progress frequency in milliseconds
    /// if it is zero, means no progress will be printed.
    #[serde(default = "defaults::print_progress_interval")]
    pub print_progress_interval: u64,
    /// Block to start syncing from on the first run.
    #[serde(default)]
    pub sync_blocks_from: Option<u64>,
}

impl Default for EventsWatcherConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enable_events_watcher(),
            polling_interval: defaults::polling_interval(),
            max_blocks_per_step: defaults::max_blocks_per_step(),
            print_progress_interval: defaults::print_progress_interval(),
            sync_blocks_from: None,
        }
    }
}
