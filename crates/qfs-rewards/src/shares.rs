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

//! Ranking and proportional reward math for the weekly leaderboard.
//!
//! Percentages are rounded half-up to 2 decimals while currency amounts are truncated to 3
//! decimals, so the sum of paid rewards may fall slightly short of the pool.

use std::cmp::Ordering;

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::{
    db::{ScoreRecord, TimeRecord},
    errors::CodedError,
    impl_coded_debug,
};

/// Number of players rewarded per leaderboard.
pub const TOP_WINNERS: usize = 15;

/// Smallest currency amount that can be transferred (0.001).
pub const MIN_PAYOUT: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Largest high score accepted on the board.
///
/// Fifteen of these still sum well inside [Decimal]'s range.
pub const MAX_HIGHSCORE: f64 = 1e15;

#[derive(Error)]
pub enum ShareError {
    #[error("{code} High score {highscore} of @{username} cannot be ranked", code = self.code())]
    InvalidScore { username: String, highscore: f64 },

    #[error("{code} Score total overflowed while computing shares", code = self.code())]
    Overflow,
}

impl_coded_debug!(ShareError);

impl CodedError for ShareError {
    fn code(&self) -> &str {
        match self {
            ShareError::InvalidScore { .. } => "[Q-SHR-001]",
            ShareError::Overflow => "[Q-SHR-002]",
        }
    }
}

/// A ranked player and its percentage of the top-15 score total.
#[derive(Clone, Debug, PartialEq)]
pub struct ShareEntry {
    /// 1-based position on the leaderboard
    pub rank: usize,
    pub username: String,
    pub highscore: f64,
    pub timestamp: i64,
    /// Share of the pool in percent, 2 decimals
    pub share_percent: Decimal,
}

/// A [ShareEntry] with its currency amount for a given pool.
#[derive(Clone, Debug, PartialEq)]
pub struct RewardEntry {
    pub share: ShareEntry,
    /// Reward in pool currency, 3 decimals, zero when below [MIN_PAYOUT]
    pub reward: Decimal,
}

impl RewardEntry {
    /// Whether this entry receives a currency transfer.
    pub fn is_payable(&self) -> bool {
        self.reward >= MIN_PAYOUT
    }
}

// Higher score first. Equal scores go to whoever got there first.
fn by_highscore(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    b.highscore
        .total_cmp(&a.highscore)
        .then(a.timestamp.cmp(&b.timestamp))
        .then_with(|| a.username.cmp(&b.username))
}

fn by_time(a: &TimeRecord, b: &TimeRecord) -> Ordering {
    a.time
        .cmp(&b.time)
        .then(a.timestamp.cmp(&b.timestamp))
        .then_with(|| a.username.cmp(&b.username))
}

fn to_decimal(record: &ScoreRecord) -> Result<Decimal, ShareError> {
    let invalid = || ShareError::InvalidScore {
        username: record.username.clone(),
        highscore: record.highscore,
    };
    if !record.highscore.is_finite() || record.highscore < 0.0 {
        return Err(invalid());
    }
    Decimal::try_from(record.highscore).map_err(|_| invalid())
}

/// Sorts scores descending and keeps the top [TOP_WINNERS].
pub fn rank_scores(mut records: Vec<ScoreRecord>) -> Vec<ScoreRecord> {
    records.sort_by(by_highscore);
    records.truncate(TOP_WINNERS);
    records
}

/// Sorts times ascending (fastest first) and keeps the top [TOP_WINNERS].
pub fn rank_times(mut records: Vec<TimeRecord>) -> Vec<TimeRecord> {
    records.sort_by(by_time);
    records.truncate(TOP_WINNERS);
    records
}

/// Ranks the scores and computes each winner's share of the top-15 total.
///
/// When the total is zero every share is zero. Scores that are negative, not finite or too large
/// for [Decimal] fail the whole computation instead of being dropped from the total.
pub fn compute_shares(records: Vec<ScoreRecord>) -> Result<Vec<ShareEntry>, ShareError> {
    let top = rank_scores(records);
    let scores = top.iter().map(to_decimal).collect::<Result<Vec<_>, _>>()?;
    let total = scores
        .iter()
        .try_fold(Decimal::ZERO, |acc, score| acc.checked_add(*score))
        .ok_or(ShareError::Overflow)?;

    top.into_iter()
        .zip(scores)
        .enumerate()
        .map(|(idx, (record, score))| {
            let share_percent = if total.is_zero() {
                Decimal::ZERO
            } else {
                // divide first, the ratio is at most 1 so the scaling cannot overflow
                score
                    .checked_div(total)
                    .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                    .ok_or(ShareError::Overflow)?
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            };
            Ok(ShareEntry {
                rank: idx + 1,
                username: record.username,
                highscore: record.highscore,
                timestamp: record.timestamp,
                share_percent,
            })
        })
        .collect()
}

/// Splits `pool` according to the shares, truncating each reward to 3 decimals.
pub fn allocate_rewards(shares: Vec<ShareEntry>, pool: Decimal) -> Vec<RewardEntry> {
    shares
        .into_iter()
        .map(|share| {
            let reward = (pool * share.share_percent / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(3, RoundingStrategy::ToZero);
            let reward = if reward < MIN_PAYOUT { Decimal::ZERO } else { reward };
            RewardEntry { share, reward }
        })
        .collect()
}
