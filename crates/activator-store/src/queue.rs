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

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use wallet_activator_utils::Result;

/// Id of a stored job.
pub type JobId = u64;

/// A Queue item that wraps the inner item and maintains its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem<T> {
    /// The inner value wrapped by the Queue Item.
    inner: T,
    /// The current state of the item in the queue.
    state: QueueItemState,
    /// The time when the item was enqueued, in milliseconds since the epoch.
    enqueued_at: u128,
    /// How many times the item was handed to a worker.
    attempts: u32,
}

impl<T> QueueItem<T> {
    /// Creates a new QueueItem with the provided inner value.
    pub fn new(inner: T) -> Self {
        let enqueued_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        Self {
            inner,
            state: Default::default(),
            enqueued_at,
            attempts: 0,
        }
    }

    /// Returns the state of the QueueItem.
    pub fn state(&self) -> QueueItemState {
        self.state.clone()
    }

    /// set item state.
    pub fn set_state(&mut self, state: QueueItemState) {
        self.state = state;
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwraps the QueueItem and returns the inner value.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn enqueued_at(&self) -> u128 {
        self.enqueued_at
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Counts one more hand-off to a worker.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }
}

/// The status of the item in the queue.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum QueueItemState {
    /// The current item is pending and waiting in the queue to be dequeued and processed.
    #[default]
    Pending,
    /// The item waits for its children to be processed before it can be queued.
    WaitingChildren {
        /// Children not processed yet.
        pending: usize,
    },
    /// The item is being processed.
    Processing {
        /// A meaningful step for the current item state.
        step: String,
        /// A meaningful progress percentage for the current item state (0 to 1).
        progress: Option<f32>,
    },
    /// The item failed to be processed.
    Failed {
        /// The error message.
        reason: String,
    },
    /// The item was successfully processed.
    Processed,
}

/// A Job Store keeps job items by id plus one FIFO list of ready job ids per
/// named queue.
pub trait JobStore<Item>: Clone + Send + Sync
where
    Item: Serialize + DeserializeOwned + Clone,
{
    /// Reserves a fresh job id.
    fn next_job_id(&self) -> Result<JobId>;
    /// Inserts or replaces a job.
    fn insert_job(&self, id: JobId, item: &QueueItem<Item>) -> Result<()>;
    /// Gets a job by id.
    fn get_job(&self, id: JobId) -> Result<Option<QueueItem<Item>>>;
    /// Updates a job in-place, atomically with respect to other updates.
    ///
    /// Returns `false` if the job does not exist.
    fn update_job<F>(&self, id: JobId, f: F) -> Result<bool>
    where
        F: FnMut(&mut QueueItem<Item>) -> Result<()>;
    /// Appends a job id to the ready list of `queue`.
    fn push_ready(&self, queue: &str, id: JobId) -> Result<()>;
    /// Takes the oldest job id off the ready list of `queue`.
    fn pop_ready(&self, queue: &str) -> Result<Option<JobId>>;
    /// Ids of every stored job, lowest first.
    fn job_ids(&self) -> Result<Vec<JobId>>;
    /// The ready list of `queue`, oldest first.
    fn ready_ids(&self, queue: &str) -> Result<Vec<JobId>>;
}
