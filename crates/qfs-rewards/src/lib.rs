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

//! Weekly reward distribution for the Quest For Skateboarding leaderboard.
//!
//! Every cycle claims the account's pending author rewards, takes the payout of the previous
//! announcement post as the pool, splits it across the top 15 high scores, sends a flat token to
//! the top scores and best times, publishes the next announcement and resets the leaderboard.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    config::ConfigWatcher,
    cycle::RewardCycle,
    db::{DbObj, SqliteDb},
    ledger::{HiveClient, KeyChain, LedgerObj, PrivateKey},
    post::PostRenderer,
    scheduler::RewardScheduler,
    scores::ScoreBoard,
    task::Supervisor,
};

pub mod config;
pub mod cycle;
pub mod db;
pub mod errors;
pub mod ledger;
pub mod post;
pub mod scheduler;
pub mod scores;
pub mod shares;
pub mod task;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Command line arguments
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Hive account that holds the pool and publishes the weekly post
    #[clap(long, env)]
    pub account: String,
    /// Posting key (WIF) used for claims and posts
    #[clap(long, env, hide_env_values = true)]
    pub posting_key: PrivateKey,
    /// Active key (WIF) used for transfers and token batches
    #[clap(long, env, hide_env_values = true)]
    pub active_key: PrivateKey,
    /// Hive API nodes, tried in order
    #[clap(
        long = "rpc-url",
        env = "RPC_URLS",
        value_delimiter = ',',
        default_value = "https://api.hive.blog,https://api.deathwing.me,https://anyx.io"
    )]
    pub rpc_urls: Vec<Url>,
    /// Timeout of a single RPC request, in seconds
    #[clap(long, default_value_t = 30)]
    pub rpc_timeout: u64,
    /// DB connection string
    #[clap(long, env = "DATABASE_URL", default_value = "sqlite:qfs-rewards.db")]
    pub db_url: String,
    /// Config file path
    #[clap(short, long, default_value = "qfs-rewards.toml")]
    pub config_file: PathBuf,
    /// Log JSON
    #[clap(long, env, default_value_t = false)]
    pub log_json: bool,
}

/// Wires the store, ledger client and scheduler together.
pub struct RewardService {
    args: Args,
    config_watcher: ConfigWatcher,
    db: DbObj,
    ledger: LedgerObj,
}

impl RewardService {
    pub async fn new(args: Args, config_watcher: ConfigWatcher) -> Result<Self> {
        let db: DbObj = Arc::new(
            SqliteDb::new(&args.db_url)
                .await
                .with_context(|| format!("Failed to open database {}", args.db_url))?,
        );
        let keys = KeyChain { posting: args.posting_key.clone(), active: args.active_key.clone() };
        let ledger: LedgerObj = Arc::new(
            HiveClient::new(args.rpc_urls.clone(), keys, Duration::from_secs(args.rpc_timeout))
                .context("Failed to create Hive client")?,
        );

        Ok(Self { args, config_watcher, db, ledger })
    }

    /// Read side of the leaderboard for the game server.
    pub fn score_board(&self) -> ScoreBoard {
        ScoreBoard::new(self.db.clone())
    }

    async fn load_renderer(&self) -> Result<PostRenderer> {
        let template_path = {
            let config = self.config_watcher.config.lock_all().context("Failed to read config")?;
            config.post.template_path.clone()
        };
        let Some(path) = template_path else {
            return Ok(PostRenderer::default());
        };
        let template = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read post template {path:?}"))?;
        tracing::info!("Using post template {path:?}");
        Ok(PostRenderer::new(template))
    }

    /// Runs reward cycles until `cancel_token` fires.
    pub async fn start_service(self, cancel_token: CancellationToken) -> Result<()> {
        tracing::info!(
            "Starting reward service for @{} with {} RPC node(s)",
            self.args.account,
            self.args.rpc_urls.len()
        );

        let renderer = self.load_renderer().await?;
        let cycle = RewardCycle::new(
            self.ledger.clone(),
            self.db.clone(),
            self.args.account.clone(),
            self.config_watcher.config.clone(),
        )
        .with_renderer(renderer);
        let scheduler = Arc::new(RewardScheduler::new(
            Arc::new(cycle),
            self.config_watcher.config.clone(),
            cancel_token,
        ));

        Supervisor::new(scheduler).spawn().await.context("Reward scheduler failed")?;

        tracing::info!("Reward service stopped");
        Ok(())
    }
}
