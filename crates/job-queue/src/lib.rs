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

//! # Job Queue
//!
//! Jobs are grouped in flows: a parent job with children, possibly nested.
//! Children are queued first and a parent only becomes ready once all of its
//! children are processed. A child that fails for good leaves its parent
//! waiting.
//!
//! Every job lives on a named queue, consumed by a [`JobWorker`] running a
//! [`JobProcessor`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ethers::types::H256;
use serde::{Deserialize, Serialize};
use wallet_activator_store::{JobId, JobStore, QueueItem, QueueItemState};
use wallet_activator_types::{Chain, UAddress};
use wallet_activator_utils::{Error, Result};

mod worker;

pub use worker::{JobProcessor, JobWorker};

/// Queue of the jobs submitting a transaction on a chain.
pub const TRANSACTIONS_QUEUE: &str = "Transactions";
/// Queue of the jobs deploying an account.
pub const ACTIVATIONS_QUEUE: &str = "Activations";

/// The payload of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobData {
    /// A transaction on `chain`, waiting on its children.
    Transaction { chain: Chain },
    /// The deployment of `account`.
    Activation { account: UAddress },
}

/// What a processed job produced, read by its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobOutput {
    /// The account deployment was sent in `transaction`.
    Deployed { account: UAddress, transaction: H256 },
    /// The account was already active, nothing was sent.
    Skipped { account: UAddress },
    /// Deployments confirmed and the accounts marked active.
    Confirmed { accounts: Vec<UAddress> },
}

/// A flow description: a job and the jobs it waits on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowJob {
    pub queue_name: String,
    pub name: String,
    pub data: JobData,
    #[serde(default)]
    pub children: Vec<FlowJob>,
}

impl FlowJob {
    pub fn new(
        queue_name: impl Into<String>,
        name: impl Into<String>,
        data: JobData,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            name: name.into(),
            data,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: FlowJob) -> Self {
        self.children.push(child);
        self
    }
}

/// A stored job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub queue_name: String,
    pub name: String,
    pub data: JobData,
    pub parent: Option<JobId>,
    pub children: Vec<JobId>,
    pub output: Option<JobOutput>,
}

/// Ids assigned to a flow once it is added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNode {
    pub id: JobId,
    pub children: Vec<JobNode>,
}

/// A job handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveJob {
    pub id: JobId,
    pub job: Job,
    /// Attempts so far, this one included.
    pub attempts: u32,
}

/// Adds flows and moves their jobs through their states.
#[derive(Debug)]
pub struct JobQueue<S> {
    store: Arc<S>,
}

impl<S> Clone for JobQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> JobQueue<S>
where
    S: JobStore<Job>,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Stores the flow. Leaves are queued right away, parents wait for
    /// their children.
    #[tracing::instrument(
        skip_all,
        fields(queue = %flow.queue_name, name = %flow.name),
    )]
    pub fn add_flow(&self, flow: FlowJob) -> Result<JobNode> {
        let id = self.store.next_job_id()?;
        self.insert_node(id, flow, None)
    }

    fn insert_node(
        &self,
        id: JobId,
        flow: FlowJob,
        parent: Option<JobId>,
    ) -> Result<JobNode> {
        let FlowJob {
            queue_name,
            name,
            data,
            children,
        } = flow;
        let child_ids = children
            .iter()
            .map(|_| self.store.next_job_id())
            .collect::<Result<Vec<_>>>()?;

        let mut item = QueueItem::new(Job {
            queue_name: queue_name.clone(),
            name,
            data,
            parent,
            children: child_ids.clone(),
            output: None,
        });
        if !children.is_empty() {
            item.set_state(QueueItemState::WaitingChildren {
                pending: children.len(),
            });
        }
        // The parent is stored before its children so a fast child always
        // finds it.
        self.store.insert_job(id, &item)?;

        let nodes = children
            .into_iter()
            .zip(child_ids)
            .map(|(child, child_id)| {
                self.insert_node(child_id, child, Some(id))
            })
            .collect::<Result<Vec<_>>>()?;
        if nodes.is_empty() {
            self.store.push_ready(&queue_name, id)?;
        }
        Ok(JobNode {
            id,
            children: nodes,
        })
    }

    /// Takes the next ready job of `queue` and marks it processing.
    pub fn next(&self, queue: &str) -> Result<Option<ActiveJob>> {
        while let Some(id) = self.store.pop_ready(queue)? {
            let mut claimed = None;
            self.store.update_job(id, |item| {
                item.record_attempt();
                item.set_state(QueueItemState::Processing {
                    step: "Job picked, processing".to_string(),
                    progress: Some(0.0),
                });
                claimed = Some((item.inner().clone(), item.attempts()));
                Ok(())
            })?;
            if let Some((job, attempts)) = claimed {
                return Ok(Some(ActiveJob { id, job, attempts }));
            }
            tracing::warn!(id, queue, "Ready job is missing from the store");
        }
        Ok(None)
    }

    /// Stores the output of a job. The parent is queued once its last
    /// child completes.
    pub fn complete(&self, id: JobId, output: JobOutput) -> Result<()> {
        let mut parent = None;
        let mut newly_processed = false;
        let found = self.store.update_job(id, |item| {
            newly_processed = item.state() != QueueItemState::Processed;
            parent = item.inner().parent;
            item.inner_mut().output = Some(output.clone());
            item.set_state(QueueItemState::Processed);
            Ok(())
        })?;
        if !found {
            return Err(Error::JobNotFound(id));
        }
        let Some(parent_id) = parent.filter(|_| newly_processed) else {
            return Ok(());
        };

        let mut ready_on = None;
        self.store.update_job(parent_id, |item| {
            ready_on = None;
            if let QueueItemState::WaitingChildren { pending } = item.state() {
                let pending = pending.saturating_sub(1);
                if pending == 0 {
                    item.set_state(QueueItemState::Pending);
                    ready_on = Some(item.inner().queue_name.clone());
                } else {
                    item.set_state(QueueItemState::WaitingChildren { pending });
                }
            }
            Ok(())
        })?;
        if let Some(queue) = ready_on {
            tracing::debug!(
                parent = parent_id,
                %queue,
                "All children processed",
            );
            self.store.push_ready(&queue, parent_id)?;
        }
        Ok(())
    }

    /// Puts the job back on its queue for another attempt.
    pub fn retry(&self, id: JobId, reason: &str) -> Result<()> {
        let mut queue = None;
        self.store.update_job(id, |item| {
            item.set_state(QueueItemState::Processing {
                step: format!("Retrying after: {reason}"),
                progress: None,
            });
            queue = Some(item.inner().queue_name.clone());
            Ok(())
        })?;
        let queue = queue.ok_or(Error::JobNotFound(id))?;
        self.store.push_ready(&queue, id)
    }

    /// Marks the job failed. It is not queued again.
    pub fn fail(&self, id: JobId, reason: &str) -> Result<()> {
        let found = self.store.update_job(id, |item| {
            item.set_state(QueueItemState::Failed {
                reason: reason.to_owned(),
            });
            Ok(())
        })?;
        if found {
            Ok(())
        } else {
            Err(Error::JobNotFound(id))
        }
    }

    /// Queues again the jobs a stopped worker left behind: jobs pending or
    /// processing that sit on no ready list, and parents whose children are
    /// all processed. Only safe while no worker runs.
    pub fn recover(&self) -> Result<usize> {
        let mut queued: HashMap<String, HashSet<JobId>> = HashMap::new();
        let mut recovered = 0;
        for id in self.store.job_ids()? {
            let Some(item) = self.store.get_job(id)? else {
                continue;
            };
            let requeue = match item.state() {
                QueueItemState::Pending
                | QueueItemState::Processing { .. } => true,
                QueueItemState::WaitingChildren { .. } => {
                    self.children_processed(item.inner())?
                }
                QueueItemState::Failed { .. } | QueueItemState::Processed => {
                    false
                }
            };
            if !requeue {
                continue;
            }
            let queue = item.into_inner().queue_name;
            if !queued.contains_key(&queue) {
                let ready = self.store.ready_ids(&queue)?;
                queued.insert(queue.clone(), ready.into_iter().collect());
            }
            let ready = queued.entry(queue.clone()).or_default();
            if !ready.insert(id) {
                continue;
            }
            self.store.update_job(id, |item| {
                item.set_state(QueueItemState::Pending);
                Ok(())
            })?;
            self.store.push_ready(&queue, id)?;
            tracing::info!(id, %queue, "Recovered interrupted job");
            recovered += 1;
        }
        Ok(recovered)
    }

    fn children_processed(&self, job: &Job) -> Result<bool> {
        for child in &job.children {
            let item =
                self.store.get_job(*child)?.ok_or(Error::JobNotFound(*child))?;
            if item.state() != QueueItemState::Processed {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn get(&self, id: JobId) -> Result<Option<QueueItem<Job>>> {
        self.store.get_job(id)
    }

    /// Outputs of the processed children of `job`.
    pub fn children_outputs(&self, job: &Job) -> Result<Vec<JobOutput>> {
        let mut outputs = Vec::with_capacity(job.children.len());
        for child in &job.children {
            let item = self
                .store
                .get_job(*child)?
                .ok_or(Error::JobNotFound(*child))?;
            if let Some(output) = item.into_inner().output {
                outputs.push(output);
            }
        }
        Ok(outputs)
    }
}
