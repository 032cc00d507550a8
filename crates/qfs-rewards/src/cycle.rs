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

//! One weekly reward cycle: claim, locate the pool, rank, pay out, publish and rotate.

use serde_json::json;
use thiserror::Error;

use crate::{
    config::{Config, ConfigErr, ConfigLock, CycleConfig, TokenConfig},
    db::{CyclePointer, DbError, DbObj, TimeRecord},
    errors::CodedError,
    impl_coded_debug,
    ledger::{Asset, Comment, LedgerError, LedgerObj, OpFilter, AUTHOR_REWARD_OP},
    post::{PostContext, PostRenderer},
    shares::{allocate_rewards, compute_shares, rank_times, RewardEntry, ShareError},
};

#[derive(Error)]
pub enum CycleError {
    #[error("{code} Failed to claim pending rewards: {0}", code = self.code())]
    Claim(#[source] LedgerError),

    #[error("{code} Failed to read account history: {0}", code = self.code())]
    History(#[source] LedgerError),

    #[error("{code} Failed to read leaderboard: {0}", code = self.code())]
    Ranking(#[source] DbError),

    #[error("{code} Failed to transfer reward to @{to}: {source}", code = self.code())]
    Transfer { to: String, source: LedgerError },

    #[error("{code} Failed to send token batch: {0}", code = self.code())]
    TokenBatch(#[source] LedgerError),

    #[error("{code} Failed to publish announcement: {0}", code = self.code())]
    Publish(#[source] LedgerError),

    #[error("{code} Failed to rotate cycle state: {0}", code = self.code())]
    Rotate(#[source] DbError),

    #[error("{code} Config error: {0}", code = self.code())]
    Config(#[from] ConfigErr),

    #[error("{code} Failed to read cycle pointer: {0}", code = self.code())]
    Pointer(#[source] DbError),

    #[error("{code} Failed to compute reward shares: {0}", code = self.code())]
    Shares(#[from] ShareError),
}

impl_coded_debug!(CycleError);

impl CodedError for CycleError {
    fn code(&self) -> &str {
        match self {
            CycleError::Claim(_) => "[Q-CYC-001]",
            CycleError::History(_) => "[Q-CYC-002]",
            CycleError::Ranking(_) => "[Q-CYC-003]",
            CycleError::Transfer { .. } => "[Q-CYC-004]",
            CycleError::TokenBatch(_) => "[Q-CYC-005]",
            CycleError::Publish(_) => "[Q-CYC-006]",
            CycleError::Rotate(_) => "[Q-CYC-007]",
            CycleError::Config(_) => "[Q-CYC-008]",
            CycleError::Pointer(_) => "[Q-CYC-009]",
            CycleError::Shares(_) => "[Q-CYC-010]",
        }
    }
}

impl CycleError {
    /// Failures caused by an unreachable or slow node.
    pub fn is_transient(&self) -> bool {
        match self {
            CycleError::Claim(err)
            | CycleError::History(err)
            | CycleError::TokenBatch(err)
            | CycleError::Publish(err)
            | CycleError::Transfer { source: err, .. } => err.is_transient(),
            _ => false,
        }
    }
}

/// Payout of the previous announcement, funding this cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct RewardPool {
    pub amount: Asset,
    /// Week of the post that earned the pool, 0 when bootstrapping
    pub week: u64,
    pub permlink: String,
}

/// What a completed cycle did.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleSummary {
    /// Week announced by this cycle
    pub week: u64,
    pub permlink: String,
    pub pool: Asset,
    pub rewards: Vec<RewardEntry>,
    pub time_winners: Vec<TimeRecord>,
    pub claimed: bool,
    /// Number of currency transfers sent
    pub transfers: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleSummary),
    /// The pool post has no recorded payout yet
    PoolUnresolved,
    /// Nobody submitted a score
    EmptyLeaderboard,
}

pub struct RewardCycle {
    ledger: LedgerObj,
    db: DbObj,
    account: String,
    config: ConfigLock,
    renderer: PostRenderer,
}

impl RewardCycle {
    pub fn new(
        ledger: LedgerObj,
        db: DbObj,
        account: impl Into<String>,
        config: ConfigLock,
    ) -> Self {
        Self { ledger, db, account: account.into(), config, renderer: PostRenderer::default() }
    }

    pub fn with_renderer(mut self, renderer: PostRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Runs a single cycle. Nothing is persisted unless the outcome is `Completed`.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let config: Config = self.config.lock_all()?.clone();

        let claimed = self.claim_rewards().await?;

        let Some(pool) = self.locate_pool(&config.cycle).await? else {
            tracing::info!("Reward pool for @{} is not resolvable yet", self.account);
            return Ok(CycleOutcome::PoolUnresolved);
        };
        tracing::info!("Reward pool is {} for @{}/{}", pool.amount, self.account, pool.permlink);

        let scores = self.db.get_scores().await.map_err(CycleError::Ranking)?;
        if scores.is_empty() {
            tracing::info!("No high scores found, skipping payout");
            return Ok(CycleOutcome::EmptyLeaderboard);
        }
        let times = self.db.get_times().await.map_err(CycleError::Ranking)?;

        let rewards = allocate_rewards(compute_shares(scores)?, pool.amount.amount());
        let time_winners = rank_times(times);
        for entry in &rewards {
            tracing::debug!(
                "#{} @{} score {} share {}% reward {}",
                entry.share.rank,
                entry.share.username,
                entry.share.highscore,
                entry.share.share_percent,
                entry.reward
            );
        }

        let transfers = self.pay_rewards(&config, &pool, &rewards).await?;
        self.send_tokens(&config.token, &rewards, &time_winners).await?;

        let week = pool.week + 1;
        let permlink = format!("{}-week-{week}", config.post.permlink_prefix);
        self.publish(&config, &pool, week, &permlink, &rewards, &time_winners).await?;

        self.db
            .rotate_cycle(&CyclePointer { link: permlink.clone(), week })
            .await
            .map_err(CycleError::Rotate)?;
        tracing::info!("Rotated to week {week}, pool post is now @{}/{permlink}", self.account);

        Ok(CycleOutcome::Completed(CycleSummary {
            week,
            permlink,
            pool: pool.amount,
            rewards,
            time_winners,
            claimed,
            transfers,
        }))
    }

    async fn claim_rewards(&self) -> Result<bool, CycleError> {
        let account = self.ledger.get_account(&self.account).await.map_err(CycleError::Claim)?;
        if !account.has_pending_rewards() {
            tracing::debug!("No pending rewards to claim");
            return Ok(false);
        }

        let confirmation = self
            .ledger
            .claim_reward_balance(
                &self.account,
                &account.reward_hive_balance,
                &account.reward_hbd_balance,
                &account.reward_vesting_balance,
            )
            .await
            .map_err(CycleError::Claim)?;
        tracing::info!(
            "@{} claimed {} {} {} - {}",
            self.account,
            account.reward_hbd_balance,
            account.reward_hive_balance,
            account.reward_vesting_balance,
            confirmation.id
        );
        Ok(true)
    }

    /// Scans author rewards newest first for the payout of the pointer's post.
    ///
    /// Without a pointer the newest payout bootstraps week 0.
    async fn locate_pool(&self, cycle: &CycleConfig) -> Result<Option<RewardPool>, CycleError> {
        let pointer = self.db.get_cycle_pointer().await.map_err(CycleError::Pointer)?;
        let filter = OpFilter::only(&[AUTHOR_REWARD_OP]);

        let mut start: i64 = -1;
        let mut pages = 0;
        let mut resumes = 0;
        while pages < cycle.max_history_pages {
            // nodes reject a start below limit - 1
            let limit = if start >= 0 {
                (start + 1).min(i64::from(cycle.history_page_size)) as u32
            } else {
                cycle.history_page_size
            };
            let page = match self
                .ledger
                .get_account_history(&self.account, start, limit, filter)
                .await
            {
                Ok(page) => page,
                Err(LedgerError::HistoryBoundary { resume_sequence })
                    if resumes < cycle.max_boundary_resumes =>
                {
                    resumes += 1;
                    tracing::info!("History scan from {start} rejected, resuming at {resume_sequence}");
                    start = i64::try_from(resume_sequence).unwrap_or(i64::MAX);
                    continue;
                }
                Err(err) => return Err(CycleError::History(err)),
            };
            pages += 1;

            let mut candidates =
                page.iter().rev().filter_map(|entry| entry.author_reward().map(|r| (entry, r)));
            let found = match &pointer {
                None => candidates.next().map(|(_, reward)| (reward, 0)),
                Some(pointer) => candidates
                    .find(|(_, reward)| reward.permlink == pointer.link)
                    .map(|(_, reward)| (reward, pointer.week)),
            };
            if let Some((reward, week)) = found {
                return Ok(Some(RewardPool {
                    amount: reward.hbd_payout,
                    week,
                    permlink: reward.permlink,
                }));
            }

            match page.first() {
                Some(oldest) if oldest.sequence > 0 && page.len() >= limit as usize => {
                    start = i64::try_from(oldest.sequence - 1).unwrap_or(i64::MAX);
                }
                _ => break,
            }
        }

        if let Some(pointer) = &pointer {
            tracing::info!("No payout recorded yet for @{}/{}", self.account, pointer.link);
        }
        Ok(None)
    }

    async fn pay_rewards(
        &self,
        config: &Config,
        pool: &RewardPool,
        rewards: &[RewardEntry],
    ) -> Result<usize, CycleError> {
        let mut sent = 0;
        for entry in rewards.iter().filter(|entry| entry.is_payable()) {
            let to = &entry.share.username;
            let amount = Asset::new(entry.reward, pool.amount.symbol())
                .map_err(|source| CycleError::Transfer { to: to.clone(), source })?;
            let memo = config
                .payout
                .memo
                .replace("{account}", &self.account)
                .replace("{highscore}", &entry.share.highscore.to_string());

            let confirmation = self
                .ledger
                .transfer(&self.account, to, &amount, &memo)
                .await
                .map_err(|source| CycleError::Transfer { to: to.clone(), source })?;
            tracing::info!("Sent {amount} to @{to} - {}", confirmation.id);
            sent += 1;
        }
        Ok(sent)
    }

    async fn send_tokens(
        &self,
        token: &TokenConfig,
        rewards: &[RewardEntry],
        time_winners: &[TimeRecord],
    ) -> Result<(), CycleError> {
        let score_batch = rewards.iter().map(|entry| {
            let memo = token
                .score_memo
                .replace("{account}", &self.account)
                .replace("{highscore}", &entry.share.highscore.to_string());
            token_action(token, &entry.share.username, memo)
        });
        self.broadcast_tokens(token, score_batch.collect(), "top scores").await?;

        if time_winners.is_empty() {
            tracing::info!("No best times this week, skipping time token batch");
            return Ok(());
        }
        let time_batch = time_winners.iter().map(|record| {
            let memo = token
                .time_memo
                .replace("{account}", &self.account)
                .replace("{time}", &record.time.to_string());
            token_action(token, &record.username, memo)
        });
        self.broadcast_tokens(token, time_batch.collect(), "best times").await
    }

    async fn broadcast_tokens(
        &self,
        token: &TokenConfig,
        actions: Vec<serde_json::Value>,
        winners: &str,
    ) -> Result<(), CycleError> {
        let count = actions.len();
        let payload = serde_json::Value::Array(actions).to_string();
        let confirmation = self
            .ledger
            .custom_json(&[self.account.clone()], &[], &token.app_id, &payload)
            .await
            .map_err(CycleError::TokenBatch)?;
        tracing::info!(
            "Sent {} {} to each of the {count} {winners} - {}",
            token.quantity,
            token.symbol,
            confirmation.id
        );
        Ok(())
    }

    async fn publish(
        &self,
        config: &Config,
        pool: &RewardPool,
        week: u64,
        permlink: &str,
        rewards: &[RewardEntry],
        time_winners: &[TimeRecord],
    ) -> Result<(), CycleError> {
        let post = &config.post;
        let body = self.renderer.render(&PostContext {
            week,
            pool: &pool.amount,
            rewards,
            time_winners,
            token_label: &config.token.label,
        });
        let json_metadata = json!({
            "app": post.app,
            "tags": post.tags,
            "description": post.description,
            "format": "markdown",
            "image": post.images,
        });

        let comment = Comment {
            parent_author: String::new(),
            parent_permlink: post.community.clone(),
            author: self.account.clone(),
            permlink: permlink.to_string(),
            title: format!("{} week {week}", post.title_prefix),
            body,
            json_metadata: json_metadata.to_string(),
        };
        let confirmation = self.ledger.post_comment(&comment).await.map_err(CycleError::Publish)?;
        tracing::info!("Posted weekly rewards @{}/{permlink} - {}", self.account, confirmation.id);
        Ok(())
    }
}

fn token_action(token: &TokenConfig, to: &str, memo: String) -> serde_json::Value {
    json!({
        "contractName": token.contract,
        "contractAction": token.action,
        "contractPayload": {
            "symbol": token.symbol,
            "to": to,
            "quantity": token.quantity,
            "memo": memo,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{ScoreRecord, SqliteDb},
        test_utils::{LedgerCall, MockLedger},
    };
    use rust_decimal::Decimal;
    use sqlx::SqlitePool;
    use std::sync::Arc;
    use tracing_test::traced_test;

    const ACCOUNT: &str = "stoken.quest";

    async fn setup(
        pool: SqlitePool,
        ledger: MockLedger,
        config: ConfigLock,
    ) -> (Arc<MockLedger>, DbObj, RewardCycle) {
        let ledger = Arc::new(ledger);
        let db: DbObj = Arc::new(SqliteDb::from_pool(pool).await.unwrap());
        let cycle = RewardCycle::new(ledger.clone(), db.clone(), ACCOUNT, config);
        (ledger, db, cycle)
    }

    async fn add_scores(db: &DbObj, scores: &[(&str, f64)]) {
        for (idx, (username, highscore)) in scores.iter().enumerate() {
            let record = ScoreRecord {
                username: username.to_string(),
                highscore: *highscore,
                timestamp: 1_700_000_000_000 + idx as i64,
            };
            db.set_score(username, &record).await.unwrap();
        }
    }

    async fn add_times(db: &DbObj, times: &[(&str, u64)]) {
        for (username, time) in times {
            let record =
                TimeRecord { username: username.to_string(), time: *time, timestamp: 1_700_000_000_000 };
            db.set_time(username, &record).await.unwrap();
        }
    }

    fn hbd(value: &str) -> Asset {
        format!("{value} HBD").parse().unwrap()
    }

    fn completed(outcome: CycleOutcome) -> CycleSummary {
        match outcome {
            CycleOutcome::Completed(summary) => summary,
            other => panic!("expected a completed cycle, got {other:?}"),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[traced_test]
    async fn bootstrap_cycle_pays_proportionally(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT).with_author_reward(5, "intro-post", "100.000 HBD");
        let (ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        add_scores(&db, &[("alice", 500.0), ("bob", 300.0), ("carol", 200.0)]).await;
        add_times(&db, &[("dave", 42), ("erin", 95)]).await;

        let summary = completed(cycle.run_cycle().await.unwrap());
        assert_eq!(summary.week, 1);
        assert_eq!(summary.permlink, "the-quest-for-stoken-week-1");
        assert_eq!(summary.pool, hbd("100.000"));
        assert_eq!(summary.transfers, 3);
        assert!(!summary.claimed);
        let shares: Vec<_> = summary.rewards.iter().map(|r| r.share.share_percent).collect();
        assert_eq!(shares, vec![Decimal::new(5000, 2), Decimal::new(3000, 2), Decimal::new(2000, 2)]);

        assert_eq!(
            ledger.transfers(),
            vec![
                ("alice".into(), hbd("50.000"), format!("@{ACCOUNT} weekly reward for high score of 500")),
                ("bob".into(), hbd("30.000"), format!("@{ACCOUNT} weekly reward for high score of 300")),
                ("carol".into(), hbd("20.000"), format!("@{ACCOUNT} weekly reward for high score of 200")),
            ]
        );

        let batches = ledger.custom_jsons();
        assert_eq!(batches.len(), 2);
        let score_batch = batches[0].as_array().unwrap();
        assert_eq!(score_batch.len(), 3);
        assert_eq!(score_batch[0]["contractName"], "tokens");
        assert_eq!(score_batch[0]["contractAction"], "transfer");
        assert_eq!(score_batch[0]["contractPayload"]["symbol"], "GNAR");
        assert_eq!(score_batch[0]["contractPayload"]["to"], "alice");
        assert_eq!(score_batch[0]["contractPayload"]["quantity"], "1.000");
        assert_eq!(
            score_batch[0]["contractPayload"]["memo"],
            format!("@{ACCOUNT} GnarCoin reward for highscore of 500")
        );
        let time_batch = batches[1].as_array().unwrap();
        assert_eq!(time_batch.len(), 2);
        assert_eq!(time_batch[0]["contractPayload"]["to"], "dave");
        assert!(time_batch[1]["contractPayload"]["memo"].as_str().unwrap().ends_with("time of 95 seconds"));

        let calls = ledger.calls();
        assert!(calls.iter().all(|call| match call {
            LedgerCall::CustomJson { required_auths, id, .. } =>
                required_auths == &vec![ACCOUNT.to_string()] && id == "ssc-mainnet-hive",
            _ => true,
        }));

        let comments = ledger.comments();
        assert_eq!(comments.len(), 1);
        let post = &comments[0];
        assert_eq!(post.parent_author, "");
        assert_eq!(post.parent_permlink, "hive-173115");
        assert_eq!(post.author, ACCOUNT);
        assert_eq!(post.permlink, "the-quest-for-stoken-week-1");
        assert_eq!(post.title, "Quest For Skateboarding week 1");
        assert!(post.body.contains("| 1 | @alice | 500 | 50.00% | 50.000 HBD & 1 Gnar Coin |"));
        assert!(post.body.contains("| 2 | @erin | 1m 35s | 1 Gnar Coin |"));
        let metadata: serde_json::Value = serde_json::from_str(&post.json_metadata).unwrap();
        assert_eq!(metadata["app"], "qfs-server");
        assert_eq!(metadata["format"], "markdown");
        assert_eq!(metadata["tags"][0], "hive-173115");
        assert_eq!(metadata["image"].as_array().unwrap().len(), 5);

        assert_eq!(
            db.get_cycle_pointer().await.unwrap(),
            Some(CyclePointer { link: "the-quest-for-stoken-week-1".into(), week: 1 })
        );
        assert!(db.get_scores().await.unwrap().is_empty());
        assert!(db.get_times().await.unwrap().is_empty());
        assert!(logs_contain("Rotated to week 1"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn follows_cycle_pointer(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT)
            .with_author_reward(4, "the-quest-for-stoken-week-2", "1.000 HBD")
            .with_author_reward(9, "the-quest-for-stoken-week-3", "10.000 HBD")
            .with_author_reward(12, "unrelated-post", "99.000 HBD");
        let (ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        db.set_cycle_pointer(&CyclePointer { link: "the-quest-for-stoken-week-3".into(), week: 3 })
            .await
            .unwrap();
        add_scores(&db, &[("a", 1.0), ("b", 1.0), ("c", 1.0)]).await;

        let summary = completed(cycle.run_cycle().await.unwrap());
        assert_eq!(summary.week, 4);
        assert_eq!(summary.pool, hbd("10.000"));
        for entry in &summary.rewards {
            assert_eq!(entry.share.share_percent, Decimal::new(3333, 2));
            assert_eq!(entry.reward, Decimal::new(3333, 3));
        }
        let paid: Vec<Asset> = ledger.transfers().into_iter().map(|(_, amount, _)| amount).collect();
        assert_eq!(paid, vec![hbd("3.333"); 3]);

        // no times submitted, only the score batch goes out
        assert_eq!(ledger.custom_jsons().len(), 1);
        assert!(ledger.comments()[0].body.contains("| No winners this week! |||||"));
        assert_eq!(
            db.get_cycle_pointer().await.unwrap(),
            Some(CyclePointer { link: "the-quest-for-stoken-week-4".into(), week: 4 })
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unresolved_pool_changes_nothing(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT)
            .with_author_reward(4, "the-quest-for-stoken-week-2", "1.000 HBD");
        let (ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        let pointer = CyclePointer { link: "the-quest-for-stoken-week-3".into(), week: 3 };
        db.set_cycle_pointer(&pointer).await.unwrap();
        add_scores(&db, &[("alice", 10.0)]).await;

        assert_eq!(cycle.run_cycle().await.unwrap(), CycleOutcome::PoolUnresolved);
        assert!(ledger.calls().is_empty());
        assert_eq!(db.get_cycle_pointer().await.unwrap(), Some(pointer));
        assert_eq!(db.get_scores().await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn no_history_is_unresolved(pool: SqlitePool) {
        let (ledger, db, cycle) =
            setup(pool, MockLedger::new(ACCOUNT), ConfigLock::default()).await;
        add_scores(&db, &[("alice", 10.0)]).await;

        assert_eq!(cycle.run_cycle().await.unwrap(), CycleOutcome::PoolUnresolved);
        assert!(ledger.calls().is_empty());
        assert_eq!(db.get_cycle_pointer().await.unwrap(), None);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn empty_leaderboard_skips_payout(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT).with_author_reward(5, "intro-post", "100.000 HBD");
        let (ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        add_times(&db, &[("dave", 42)]).await;

        assert_eq!(cycle.run_cycle().await.unwrap(), CycleOutcome::EmptyLeaderboard);
        assert!(ledger.calls().is_empty());
        assert_eq!(db.get_cycle_pointer().await.unwrap(), None);
        assert_eq!(db.get_times().await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn claims_pending_rewards_first(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT)
            .with_pending_rewards("0.000 HIVE", "1.234 HBD", "5.000000 VESTS")
            .with_author_reward(5, "intro-post", "100.000 HBD");
        let (ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        add_scores(&db, &[("alice", 10.0)]).await;

        let summary = completed(cycle.run_cycle().await.unwrap());
        assert!(summary.claimed);
        assert_eq!(
            ledger.calls()[0],
            LedgerCall::Claim {
                account: ACCOUNT.into(),
                hive: "0.000 HIVE".parse().unwrap(),
                hbd: hbd("1.234"),
                vests: "5.000000 VESTS".parse().unwrap(),
            }
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn claim_happens_even_without_pool(pool: SqlitePool) {
        let ledger =
            MockLedger::new(ACCOUNT).with_pending_rewards("0.001 HIVE", "0.000 HBD", "0.000000 VESTS");
        let (ledger, _db, cycle) = setup(pool, ledger, ConfigLock::default()).await;

        assert_eq!(cycle.run_cycle().await.unwrap(), CycleOutcome::PoolUnresolved);
        assert!(matches!(ledger.calls()[..], [LedgerCall::Claim { .. }]));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn resumes_after_history_boundary(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT)
            .with_history_boundary(7)
            .with_author_reward(5, "intro-post", "42.000 HBD");
        let (ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        add_scores(&db, &[("alice", 10.0)]).await;

        let summary = completed(cycle.run_cycle().await.unwrap());
        assert_eq!(summary.pool, hbd("42.000"));
        assert_eq!(ledger.history_requests(), vec![(-1, 30), (7, 8)]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn boundary_resumes_are_bounded(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT)
            .with_history_boundary(7)
            .with_author_reward(5, "intro-post", "42.000 HBD");
        let config = ConfigLock::default();
        config.load_write().unwrap().cycle.max_boundary_resumes = 0;
        let (_ledger, db, cycle) = setup(pool, ledger, config).await;
        add_scores(&db, &[("alice", 10.0)]).await;

        let err = cycle.run_cycle().await.unwrap_err();
        assert!(matches!(
            err,
            CycleError::History(LedgerError::HistoryBoundary { resume_sequence: 7 })
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn scans_older_pages(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT)
            .with_author_reward(1, "the-quest-for-stoken-week-6", "7.000 HBD")
            .with_author_reward(2, "other-a", "1.000 HBD")
            .with_author_reward(3, "other-b", "1.000 HBD")
            .with_author_reward(4, "other-c", "1.000 HBD");
        let config = ConfigLock::default();
        config.load_write().unwrap().cycle.history_page_size = 2;
        let (ledger, db, cycle) = setup(pool, ledger, config.clone()).await;
        db.set_cycle_pointer(&CyclePointer { link: "the-quest-for-stoken-week-6".into(), week: 6 })
            .await
            .unwrap();
        add_scores(&db, &[("alice", 10.0)]).await;

        // a single page only sees the two newest payouts
        assert_eq!(cycle.run_cycle().await.unwrap(), CycleOutcome::PoolUnresolved);

        config.load_write().unwrap().cycle.max_history_pages = 2;
        let summary = completed(cycle.run_cycle().await.unwrap());
        assert_eq!(summary.week, 7);
        assert_eq!(summary.pool, hbd("7.000"));
        assert_eq!(ledger.history_requests(), vec![(-1, 2), (-1, 2), (2, 2)]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn dust_reward_is_listed_not_paid(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT).with_author_reward(5, "intro-post", "0.010 HBD");
        let (ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        add_scores(&db, &[("alice", 91.0), ("bob", 9.0)]).await;

        let summary = completed(cycle.run_cycle().await.unwrap());
        assert_eq!(summary.rewards[0].reward, Decimal::new(9, 3));
        assert_eq!(summary.rewards[1].reward, Decimal::ZERO);
        assert_eq!(summary.transfers, 1);
        assert_eq!(ledger.transfers().len(), 1);
        assert_eq!(ledger.transfers()[0].0, "alice");

        // still gets the token
        assert_eq!(ledger.custom_jsons()[0].as_array().unwrap().len(), 2);
        assert!(ledger.comments()[0].body.contains("| 2 | @bob | 9 | 9.00% | 0.000 HBD & 1 Gnar Coin |"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn transfer_failure_keeps_state(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT)
            .with_author_reward(5, "intro-post", "100.000 HBD")
            .with_transfer_failure("bob");
        let (ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        add_scores(&db, &[("alice", 500.0), ("bob", 300.0), ("carol", 200.0)]).await;

        let err = cycle.run_cycle().await.unwrap_err();
        assert!(matches!(&err, CycleError::Transfer { to, .. } if to == "bob"));
        let logged = format!("{err:?}");
        assert!(logged.starts_with("[Q-CYC-004] Failed to transfer reward to @bob"), "{logged}");
        assert_eq!(logged.matches("[Q-CYC-004]").count(), 1);

        // alice was paid before the failure, nothing after it happened
        assert_eq!(ledger.transfers().len(), 1);
        assert!(ledger.custom_jsons().is_empty());
        assert!(ledger.comments().is_empty());
        assert_eq!(db.get_cycle_pointer().await.unwrap(), None);
        assert_eq!(db.get_scores().await.unwrap().len(), 3);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unrankable_score_pays_nobody(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT).with_author_reward(5, "intro-post", "100.000 HBD");
        let (ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        add_scores(&db, &[("whale", 1e30), ("alice", 10.0)]).await;

        let err = cycle.run_cycle().await.unwrap_err();
        assert!(matches!(
            &err,
            CycleError::Shares(ShareError::InvalidScore { username, .. }) if username == "whale"
        ));
        assert!(format!("{err:?}").starts_with("[Q-CYC-010] "));
        assert!(ledger.transfers().is_empty());
        assert!(ledger.custom_jsons().is_empty());
        assert!(ledger.comments().is_empty());
        assert_eq!(db.get_cycle_pointer().await.unwrap(), None);
        assert_eq!(db.get_scores().await.unwrap().len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn history_failure_is_an_error(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT).with_history_failure();
        let (ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        add_scores(&db, &[("alice", 10.0)]).await;

        assert!(matches!(cycle.run_cycle().await, Err(CycleError::History(_))));
        assert!(ledger.calls().is_empty());
        assert_eq!(db.get_scores().await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn publish_failure_keeps_pointer(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT)
            .with_author_reward(5, "intro-post", "100.000 HBD")
            .with_comment_failure();
        let (_ledger, db, cycle) = setup(pool, ledger, ConfigLock::default()).await;
        add_scores(&db, &[("alice", 10.0)]).await;

        assert!(matches!(cycle.run_cycle().await, Err(CycleError::Publish(_))));
        assert_eq!(db.get_cycle_pointer().await.unwrap(), None);
        assert_eq!(db.get_scores().await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn configured_post_fields(pool: SqlitePool) {
        let ledger = MockLedger::new(ACCOUNT).with_author_reward(5, "intro-post", "1.000 HBD");
        let config = ConfigLock::default();
        {
            let mut config = config.load_write().unwrap();
            config.post.permlink_prefix = "qfs".into();
            config.post.title_prefix = "QFS".into();
            config.token.label = "Skate Coin".into();
        }
        let (ledger, db, cycle) = setup(pool, ledger, config).await;
        let cycle = cycle.with_renderer(PostRenderer::new("{{pool}} / {{table}}"));
        add_scores(&db, &[("alice", 10.0)]).await;

        completed(cycle.run_cycle().await.unwrap());
        let post = &ledger.comments()[0];
        assert_eq!(post.permlink, "qfs-week-1");
        assert_eq!(post.title, "QFS week 1");
        assert_eq!(post.body, "1.000 HBD / | 1 | @alice | 10 | 100.00% | 1.000 HBD & 1 Skate Coin |");
    }
}
