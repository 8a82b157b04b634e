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

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use wallet_activator_config::JobQueueConfig;
use wallet_activator_store::JobStore;
use wallet_activator_utils::metric::Metrics;
use wallet_activator_utils::{probe, Result};

use crate::{ActiveJob, Job, JobOutput, JobQueue};

/// Processes the jobs of one queue.
#[async_trait::async_trait]
pub trait JobProcessor: Send + Sync {
    /// The queue this processor consumes.
    fn queue_name(&self) -> &'static str;
    /// Runs one job. `children` holds the outputs of its processed children.
    ///
    /// An error puts the job back on its queue until it runs out of attempts.
    async fn process(
        &self,
        job: &ActiveJob,
        children: &[JobOutput],
    ) -> Result<JobOutput>;
}

/// Pulls jobs off one queue and hands them to a [`JobProcessor`].
pub struct JobWorker<S, P> {
    queue: JobQueue<S>,
    processor: P,
    config: JobQueueConfig,
    metrics: Arc<Metrics>,
}

impl<S, P> JobWorker<S, P>
where
    S: JobStore<Job>,
    P: JobProcessor,
{
    pub fn new(
        queue: JobQueue<S>,
        processor: P,
        config: JobQueueConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            queue,
            processor,
            config,
            metrics,
        }
    }

    /// Processes at most one job. Returns `false` if the queue was empty.
    pub async fn run_once(&self) -> Result<bool> {
        let queue_name = self.processor.queue_name();
        let Some(active) = self.queue.next(queue_name)? else {
            return Ok(false);
        };
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::JobQueue,
            queue = queue_name,
            job = active.id,
            name = %active.job.name,
            attempt = active.attempts,
        );
        let children = self.queue.children_outputs(&active.job)?;
        match self.processor.process(&active, &children).await {
            Ok(output) => {
                tracing::debug!(
                    queue = queue_name,
                    job = active.id,
                    ?output,
                    "Job processed",
                );
                self.queue.complete(active.id, output)?;
            }
            Err(err) if active.attempts < self.config.max_attempts => {
                tracing::warn!(
                    queue = queue_name,
                    job = active.id,
                    attempt = active.attempts,
                    %err,
                    "Job failed, retrying",
                );
                self.metrics.job_queue_back_off.inc();
                self.queue.retry(active.id, &err.to_string())?;
                let delay = Duration::from_millis(self.config.retry_delay);
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                tracing::error!(
                    queue = queue_name,
                    job = active.id,
                    %err,
                    "Job failed after {} attempts",
                    active.attempts,
                );
                self.queue.fail(active.id, &err.to_string())?;
            }
        }
        Ok(true)
    }

    /// Runs forever, idling `poll-interval` whenever the queue is empty.
    ///
    /// Store errors are not fatal: the worker backs off and tries again.
    pub async fn run(self) -> Result<()> {
        let queue_name = self.processor.queue_name();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::JobQueue,
            queue = queue_name,
            starting = true,
        );
        let poll_interval = Duration::from_millis(self.config.poll_interval);
        let mut backoff = backoff::ExponentialBackoff {
            initial_interval: poll_interval,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: None,
            ..Default::default()
        };
        loop {
            match self.run_once().await {
                Ok(true) => backoff.reset(),
                Ok(false) => {
                    backoff.reset();
                    tokio::time::sleep(poll_interval).await;
                }
                Err(e) => {
                    let wait = backoff.next_backoff().unwrap_or(poll_interval);
                    tracing::warn!(
                        queue = queue_name,
                        %e,
                        "Job queue error, backing off for {}ms",
                        wait.as_millis(),
                    );
                    self.metrics.job_queue_back_off.inc();
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
