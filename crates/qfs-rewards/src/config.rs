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

use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use crate::{errors::CodedError, impl_coded_debug};
use anyhow::{Context, Result};
use notify::{EventKind, Watcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    fs,
    task::JoinHandle,
    time::{timeout, Duration},
};

#[derive(Error)]
pub enum ConfigErr {
    #[error("{code} Failed to lock internal config structure", code = self.code())]
    LockFailed,

    #[error("{code} Invalid configuration: {0}", code = self.code())]
    InvalidConfig(String),
}

impl_coded_debug!(ConfigErr);

impl CodedError for ConfigErr {
    fn code(&self) -> &str {
        match self {
            ConfigErr::LockFailed => "[Q-CON-001]",
            ConfigErr::InvalidConfig(_) => "[Q-CON-002]",
        }
    }
}

pub mod defaults {
    pub const fn interval_secs() -> u64 {
        60 * 60
    }

    pub const fn retry_secs() -> u64 {
        5 * 60
    }

    pub const fn history_page_size() -> u32 {
        30
    }

    pub const fn max_history_pages() -> u32 {
        1
    }

    pub const fn max_boundary_resumes() -> u32 {
        1
    }

    pub fn transfer_memo() -> String {
        "@{account} weekly reward for high score of {highscore}".into()
    }

    pub fn token_app_id() -> String {
        "ssc-mainnet-hive".into()
    }

    pub fn token_contract() -> String {
        "tokens".into()
    }

    pub fn token_action() -> String {
        "transfer".into()
    }

    pub fn token_symbol() -> String {
        "GNAR".into()
    }

    pub fn token_quantity() -> String {
        "1.000".into()
    }

    pub fn token_label() -> String {
        "Gnar Coin".into()
    }

    pub fn score_token_memo() -> String {
        "@{account} GnarCoin reward for highscore of {highscore}".into()
    }

    pub fn time_token_memo() -> String {
        "@{account} GNAR token reward for completing Quest For Stoken with a time of {time} seconds"
            .into()
    }

    pub fn community() -> String {
        "hive-173115".into()
    }

    pub fn permlink_prefix() -> String {
        "the-quest-for-stoken".into()
    }

    pub fn title_prefix() -> String {
        "Quest For Skateboarding".into()
    }

    pub fn app() -> String {
        "qfs-server".into()
    }

    pub fn description() -> String {
        "This week's Quest for Skateboarding!".into()
    }

    pub fn tags() -> Vec<String> {
        [
            "hive-173115",
            "hivegaming",
            "web3gaming",
            "play2earn",
            "gamedev",
            "proofofbrain",
            "hive-engine",
            "gamemaker",
            "alienarthive",
            "stoken",
            "neoxian",
            "hivegc",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    pub fn images() -> Vec<String> {
        [
            "https://images.hive.blog/0x0/https://files.peakd.com/file/peakd-hive/stoken.quest/EoCfjfPAMovDWgmWdX9uWvfkvFmyizXwNnvct4ddahvsdpzU6fXUMJCqe6RHoUHyPuv.gif",
            "https://files.peakd.com/file/peakd-hive/stoken.quest/EoCi4Y43qwmdZRjtY9fEBHMTG1zocqyRhiQhrk6VKfv8MUrgcZ5okKUcZBTKLqLqLEe.png",
            "https://files.peakd.com/file/peakd-hive/stoken.quest/AJehWC6tQG9NVwqsQ9ozkTDRyFafPX6cKPf6B2KUTkQZaRzb6BuFeL4MV8nTwng.gif",
            "https://files.peakd.com/file/peakd-hive/stoken.quest/23wgHJjHUQD6iaZmxn2fTVFNC9PgpSVaWKXsdGCuPFia9RV5KKVZvhcBba6PiRjCzdTd2.png",
            "https://files.peakd.com/file/peakd-hive/stoken.quest/23vsUyQtaxW4iNEyKLxbbMjTDRQFTBK1VMqaXxc7LN9ARpmZYY5DwwTiwZyWEcZekiHUZ.gif",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }
}

/// Scheduling and pool lookup
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CycleConfig {
    /// Delay after a completed cycle (in seconds)
    #[serde(default = "defaults::interval_secs")]
    pub interval_secs: u64,
    /// Delay after a failed or skipped cycle (in seconds)
    ///
    /// Must be shorter than `interval_secs`.
    #[serde(default = "defaults::retry_secs")]
    pub retry_secs: u64,
    /// Number of author reward entries requested per history page
    #[serde(default = "defaults::history_page_size")]
    pub history_page_size: u32,
    /// Number of history pages scanned, newest first, when looking for the pool
    #[serde(default = "defaults::max_history_pages")]
    pub max_history_pages: u32,
    /// How often a history scan may restart from the sequence reported by the node
    #[serde(default = "defaults::max_boundary_resumes")]
    pub max_boundary_resumes: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval_secs(),
            retry_secs: defaults::retry_secs(),
            history_page_size: defaults::history_page_size(),
            max_history_pages: defaults::max_history_pages(),
            max_boundary_resumes: defaults::max_boundary_resumes(),
        }
    }
}

/// Currency transfers to the top scores
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PayoutConfig {
    /// Transfer memo, `{account}` and `{highscore}` are substituted
    #[serde(default = "defaults::transfer_memo")]
    pub memo: String,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self { memo: defaults::transfer_memo() }
    }
}

/// Flat token award sent through the sidechain custom json
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TokenConfig {
    #[serde(default = "defaults::token_app_id")]
    pub app_id: String,
    #[serde(default = "defaults::token_contract")]
    pub contract: String,
    #[serde(default = "defaults::token_action")]
    pub action: String,
    #[serde(default = "defaults::token_symbol")]
    pub symbol: String,
    /// Quantity sent to each winner, as the contract expects it
    #[serde(default = "defaults::token_quantity")]
    pub quantity: String,
    /// Name of the token in the announcement post
    #[serde(default = "defaults::token_label")]
    pub label: String,
    /// Memo for score winners, `{account}` and `{highscore}` are substituted
    #[serde(default = "defaults::score_token_memo")]
    pub score_memo: String,
    /// Memo for time winners, `{account}` and `{time}` are substituted
    #[serde(default = "defaults::time_token_memo")]
    pub time_memo: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            app_id: defaults::token_app_id(),
            contract: defaults::token_contract(),
            action: defaults::token_action(),
            symbol: defaults::token_symbol(),
            quantity: defaults::token_quantity(),
            label: defaults::token_label(),
            score_memo: defaults::score_token_memo(),
            time_memo: defaults::time_token_memo(),
        }
    }
}

/// Weekly announcement post
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PostConfig {
    /// Community the post is published in
    #[serde(default = "defaults::community")]
    pub community: String,
    /// Permlinks are `<prefix>-week-<week>`
    #[serde(default = "defaults::permlink_prefix")]
    pub permlink_prefix: String,
    /// Titles are `<prefix> week <week>`
    #[serde(default = "defaults::title_prefix")]
    pub title_prefix: String,
    #[serde(default = "defaults::app")]
    pub app: String,
    #[serde(default = "defaults::description")]
    pub description: String,
    #[serde(default = "defaults::tags")]
    pub tags: Vec<String>,
    /// First image is used as the thumbnail
    #[serde(default = "defaults::images")]
    pub images: Vec<String>,
    /// Markdown template replacing the built in one
    pub template_path: Option<PathBuf>,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            community: defaults::community(),
            permlink_prefix: defaults::permlink_prefix(),
            title_prefix: defaults::title_prefix(),
            app: defaults::app(),
            description: defaults::description(),
            tags: defaults::tags(),
            images: defaults::images(),
            template_path: None,
        }
    }
}

/// Top level config for the reward service
#[derive(Clone, Deserialize, Serialize, Default, Debug)]
pub struct Config {
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub payout: PayoutConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub post: PostConfig,
}

impl Config {
    /// Load and validate the config from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .await
            .context(format!("Failed to read config file from {path:?}"))?;
        let config: Self =
            toml::from_str(&data).context(format!("Failed to parse toml file from {path:?}"))?;
        config.validate().context(format!("Rejected config file {path:?}"))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigErr> {
        let cycle = &self.cycle;
        if cycle.retry_secs == 0 || cycle.retry_secs >= cycle.interval_secs {
            return Err(ConfigErr::InvalidConfig(format!(
                "cycle.retry_secs ({}) must be positive and shorter than cycle.interval_secs ({})",
                cycle.retry_secs, cycle.interval_secs
            )));
        }
        if cycle.history_page_size == 0 || cycle.max_history_pages == 0 {
            return Err(ConfigErr::InvalidConfig(
                "cycle.history_page_size and cycle.max_history_pages must be positive".into(),
            ));
        }
        if self.post.permlink_prefix.is_empty() || self.post.community.is_empty() {
            return Err(ConfigErr::InvalidConfig(
                "post.permlink_prefix and post.community must not be empty".into(),
            ));
        }
        if self.token.symbol.is_empty() {
            return Err(ConfigErr::InvalidConfig("token.symbol must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Default, Debug)]
pub struct ConfigLock {
    config: Arc<RwLock<Config>>,
}

impl ConfigLock {
    pub fn new(config: Config) -> Self {
        Self { config: Arc::new(RwLock::new(config)) }
    }

    pub fn lock_all(&self) -> Result<std::sync::RwLockReadGuard<'_, Config>, ConfigErr> {
        self.config.read().map_err(|_| ConfigErr::LockFailed)
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn load_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Config>, ConfigErr> {
        self.config.write().map_err(|_| ConfigErr::LockFailed)
    }
}

/// Max number of pending filesystem events from the config file
const FILE_MONITOR_EVENT_BUFFER: usize = 32;

/// Watches the config file and swaps in every valid revision
pub struct ConfigWatcher {
    /// Current config data
    pub config: ConfigLock,
    _monitor: JoinHandle<Result<()>>,
}

impl ConfigWatcher {
    pub async fn new(config_path: &Path) -> Result<Self> {
        let config = ConfigLock::new(Config::load(config_path).await?);
        let config_copy = config.clone();
        let config_path_copy = config_path.to_path_buf();

        let startup_notification = Arc::new(tokio::sync::Notify::new());
        let startup_notification_copy = startup_notification.clone();

        let monitor = tokio::spawn(async move {
            let (tx, mut rx) = tokio::sync::mpsc::channel(FILE_MONITOR_EVENT_BUFFER);

            let mut watcher = notify::recommended_watcher(move |res| match res {
                Ok(event) => {
                    if let Err(err) = tx.try_send(event) {
                        tracing::debug!("Failed to send filesystem event to channel: {err:?}");
                    }
                }
                Err(err) => tracing::error!("Failed to watch config file: {err:?}"),
            })
            .context("Failed to construct watcher")?;

            watcher
                .watch(&config_path_copy, notify::RecursiveMode::NonRecursive)
                .context("Failed to start watcher")?;
            startup_notification_copy.notify_one();

            while let Some(event) = rx.recv().await {
                match event.kind {
                    EventKind::Modify(_) => {
                        tracing::debug!("Reloading modified config file");
                        let new_config = match Config::load(&config_path_copy).await {
                            Ok(val) => val,
                            Err(err) => {
                                tracing::error!("Keeping previous config: {err:?}");
                                continue;
                            }
                        };
                        let mut config = match config_copy.config.write() {
                            Ok(val) => val,
                            Err(err) => {
                                tracing::error!(
                                    "Failed to lock config, previously poisoned? {err:?}"
                                );
                                continue;
                            }
                        };
                        *config = new_config;
                        tracing::info!("Config reloaded from {config_path_copy:?}");
                    }
                    _ => {
                        tracing::debug!("unsupported config file event: {event:?}");
                    }
                }
            }

            watcher.unwatch(&config_path_copy).context("Failed to stop watching config")?;

            Ok(())
        });

        if let Err(err) = timeout(Duration::from_secs(1), startup_notification.notified()).await {
            tracing::error!("Failed to get notification from config monitor startup in: {err}");
            monitor.await.context("Config watcher startup failed")??;
            anyhow::bail!("Config watcher exited during startup");
        }
        tracing::debug!("Config watcher started");

        Ok(Self { config, _monitor: monitor })
    }
}
