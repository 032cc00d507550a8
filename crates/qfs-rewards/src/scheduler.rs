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

//! Runs reward cycles back to back, one at a time, until cancelled.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ConfigLock, CycleConfig},
    cycle::{CycleError, CycleOutcome, RewardCycle},
    task::{RetryRes, RetryTask, SupervisorErr},
};

/// Something that runs one reward cycle.
#[async_trait]
pub trait CycleRunner {
    async fn run_cycle(&self) -> Result<CycleOutcome, CycleError>;
}

#[async_trait]
impl CycleRunner for RewardCycle {
    async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        RewardCycle::run_cycle(self).await
    }
}

/// Delay before the next cycle: the full interval after a payout, the retry delay otherwise.
pub fn next_delay(outcome: &Result<CycleOutcome, CycleError>, cycle: &CycleConfig) -> Duration {
    match outcome {
        Ok(CycleOutcome::Completed(_)) => Duration::from_secs(cycle.interval_secs),
        Ok(CycleOutcome::PoolUnresolved | CycleOutcome::EmptyLeaderboard) | Err(_) => {
            Duration::from_secs(cycle.retry_secs)
        }
    }
}

#[derive(Clone)]
pub struct RewardScheduler {
    runner: Arc<dyn CycleRunner + Send + Sync>,
    config: ConfigLock,
    cancel_token: CancellationToken,
}

impl RewardScheduler {
    pub fn new(
        runner: Arc<dyn CycleRunner + Send + Sync>,
        config: ConfigLock,
        cancel_token: CancellationToken,
    ) -> Self {
        Self { runner, config, cancel_token }
    }

    async fn run(self) -> Result<(), SupervisorErr> {
        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            let outcome = self.runner.run_cycle().await;
            match &outcome {
                Ok(CycleOutcome::Completed(summary)) => tracing::info!(
                    "Week {} completed: {} paid to {} players",
                    summary.week,
                    summary.pool,
                    summary.transfers
                ),
                Ok(CycleOutcome::PoolUnresolved) => tracing::info!("Reward pool not found"),
                Ok(CycleOutcome::EmptyLeaderboard) => tracing::info!("No high scores this week"),
                Err(CycleError::Config(_)) => {}
                Err(err) if err.is_transient() => {
                    tracing::warn!("Reward cycle interrupted by node failure: {err:?}")
                }
                Err(err) => tracing::error!("Reward cycle failed: {err:?}"),
            }
            if let Err(CycleError::Config(err)) = outcome {
                return Err(SupervisorErr::Recover(err.into()));
            }

            let delay = {
                let config = self
                    .config
                    .lock_all()
                    .map_err(|err| SupervisorErr::Recover(err.into()))?;
                next_delay(&outcome, &config.cycle)
            };
            tracing::debug!("Next reward cycle in {delay:?}");

            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Reward scheduler stopped");
        Ok(())
    }
}

impl RetryTask for RewardScheduler {
    fn spawn(&self) -> RetryRes {
        Box::pin(self.clone().run())
    }
}
