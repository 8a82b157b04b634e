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

/// Idle workers poll every `500` milliseconds by default.
pub const fn job_poll_interval() -> u64 {
    500
}
/// A job gets `10` attempts by default.
pub const fn job_max_attempts() -> u32 {
    10
}
/// Failed attempts are retried after `3_000` milliseconds by default.
pub const fn job_retry_delay() -> u64 {
    3_000
}
/// Logs watchers are enabled by default.
pub const fn enable_events_watcher() -> bool {
    true
}
/// Logs are polled every `7_000` milliseconds by default.
pub const fn polling_interval() -> u64 {
    7_000
}
/// The maximum blocks per `eth_getLogs` request is set to `500` by default.
pub const fn max_blocks_per_step() -> u64 {
    500
}
/// The print progress interval is set to `7_000` by default.
pub const fn print_progress_interval() -> u64 {
    7_000
}
