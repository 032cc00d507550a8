// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use anyhow::{Error as AnyhowErr, Result as AnyhowRes};
use thiserror::Error;
use tokio::task::JoinSet;

#[derive(Error, Debug)]
pub enum SupervisorErr {
    /// Restart / replace the task after failure
    #[error("Recoverable error: {0}")]
    Recover(AnyhowErr),
    /// Hard failure and exit the task set
    #[error("Hard failure: {0}")]
    Fault(AnyhowErr),
}

pub type RetryRes = Pin<Box<dyn Future<Output = Result<(), SupervisorErr>> + Send + 'static>>;

pub trait RetryTask {
    /// Defines how to spawn a task to be monitored for restarts
    fn spawn(&self) -> RetryRes;
}

/// Flat delay restart policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before every restart
    pub delay: Duration,
    /// Maximum number of restarts before giving up (None for unlimited)
    pub max_retries: Option<usize>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { delay: Duration::from_secs(5), max_retries: None }
    }
}

/// Restarts a task on recoverable failures, gives up on faults
pub struct Supervisor<T: RetryTask> {
    task: Arc<T>,
    retry_policy: RetryPolicy,
}

impl<T> Supervisor<T>
where
    T: RetryTask + Send,
{
    pub fn new(task: Arc<T>) -> Self {
        Self { task, retry_policy: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Run the supervisor until the task exits cleanly or fails for good
    pub async fn spawn(self) -> AnyhowRes<()> {
        let mut tasks = JoinSet::new();
        let mut retry_count = 0;

        tracing::debug!("Spawning task");
        tasks.spawn(self.task.spawn());

        while let Some(res) = tasks.join_next().await {
            match res {
                Ok(Ok(())) => tracing::debug!("Task exited cleanly"),
                Ok(Err(SupervisorErr::Recover(err))) => {
                    if let Some(max) = self.retry_policy.max_retries {
                        if retry_count >= max {
                            tracing::error!("Exceeded maximum retries ({max}) for task");
                            anyhow::bail!("Exceeded maximum retries for task");
                        }
                    }
                    retry_count += 1;

                    let delay = self.retry_policy.delay;
                    tracing::warn!(
                        "Recoverable failure detected: {err:?}, restarting in {delay:?} (retry {retry_count})"
                    );
                    let task = self.task.spawn();
                    tasks.spawn(async move {
                        tokio::time::sleep(delay).await;
                        task.await
                    });
                }
                Ok(Err(SupervisorErr::Fault(err))) => {
                    tracing::error!("FAULT: Hard failure detected: {err:?}");
                    anyhow::bail!("Hard failure in supervisor task");
                }
                Err(err) if err.is_cancelled() => {
                    tracing::warn!("Task was canceled, treating it like a clean exit");
                }
                Err(err) => {
                    tracing::error!("ABORT: supervisor join failed");
                    anyhow::bail!(err);
                }
            }
        }

        Ok(())
    }
}
