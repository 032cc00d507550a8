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

//! Score submission and leaderboard reads backing the game's HTTP layer.

use serde::Serialize;
use thiserror::Error;

use crate::{
    db::{CyclePointer, DbError, DbObj, ScoreRecord, TimeRecord},
    errors::CodedError,
    impl_coded_debug,
    shares::{rank_scores, rank_times, MAX_HIGHSCORE},
};

#[derive(Error)]
pub enum ScoreError {
    #[error("{code} Invalid username: {0:?}", code = self.code())]
    InvalidUsername(String),

    #[error("{code} Invalid high score: {0}", code = self.code())]
    InvalidScore(f64),

    #[error("{code} Store error: {0}", code = self.code())]
    Store(#[from] DbError),
}

impl_coded_debug!(ScoreError);

impl CodedError for ScoreError {
    fn code(&self) -> &str {
        match self {
            ScoreError::InvalidUsername(_) => "[Q-SCR-001]",
            ScoreError::InvalidScore(_) => "[Q-SCR-002]",
            ScoreError::Store(_) => "[Q-SCR-003]",
        }
    }
}

/// Echo of an accepted submission.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Submission {
    pub username: String,
    pub highscore: f64,
    pub time: u64,
    pub timestamp: i64,
}

/// Current week standing of one player, zero where nothing was submitted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerStanding {
    pub username: String,
    pub highscore: f64,
    pub time: u64,
}

/// Strips the characters that cannot appear in a store key.
pub fn sanitize_username(username: &str) -> String {
    username.chars().filter(|c| !matches!(c, '.' | ',' | '#' | '$' | '[' | ']' | '/')).collect()
}

pub struct ScoreBoard {
    db: DbObj,
}

impl ScoreBoard {
    pub fn new(db: DbObj) -> Self {
        Self { db }
    }

    /// Records a player's latest run.
    ///
    /// A positive `highscore` replaces the stored score and a positive `time` replaces the stored
    /// time, each stamped with `now_ms`. Zero or missing values leave the stored record alone.
    /// Scores above [MAX_HIGHSCORE] are rejected so the weekly share math stays in range.
    pub async fn submit(
        &self,
        username: &str,
        highscore: Option<f64>,
        time: Option<u64>,
        now_ms: i64,
    ) -> Result<Submission, ScoreError> {
        let key = sanitize_username(username);
        if key.is_empty() {
            return Err(ScoreError::InvalidUsername(username.to_string()));
        }
        let highscore = highscore.unwrap_or(0.0);
        if !(0.0..=MAX_HIGHSCORE).contains(&highscore) {
            return Err(ScoreError::InvalidScore(highscore));
        }
        let time = time.unwrap_or(0);

        if highscore > 0.0 {
            let record = match self.db.get_score(&key).await? {
                Some(existing) => ScoreRecord { highscore, timestamp: now_ms, ..existing },
                None => ScoreRecord { username: username.to_string(), highscore, timestamp: now_ms },
            };
            self.db.set_score(&key, &record).await?;
        }
        if time > 0 {
            let record = match self.db.get_time(&key).await? {
                Some(existing) => TimeRecord { time, timestamp: now_ms, ..existing },
                None => TimeRecord { username: username.to_string(), time, timestamp: now_ms },
            };
            self.db.set_time(&key, &record).await?;
        }
        tracing::debug!("Submission from {username}: score {highscore} time {time}");

        Ok(Submission { username: username.to_string(), highscore, time, timestamp: now_ms })
    }

    /// Top 15 scores of the week.
    pub async fn leaderboard(&self) -> Result<Vec<ScoreRecord>, ScoreError> {
        Ok(rank_scores(self.db.get_scores().await?))
    }

    /// Top 15 times of the week.
    pub async fn best_times(&self) -> Result<Vec<TimeRecord>, ScoreError> {
        Ok(rank_times(self.db.get_times().await?))
    }

    pub async fn all_scores(&self) -> Result<Vec<ScoreRecord>, ScoreError> {
        let mut scores = self.db.get_scores().await?;
        scores.sort_by(|a, b| b.highscore.total_cmp(&a.highscore));
        Ok(scores)
    }

    pub async fn all_times(&self) -> Result<Vec<TimeRecord>, ScoreError> {
        let mut times = self.db.get_times().await?;
        times.sort_by_key(|record| record.time);
        Ok(times)
    }

    pub async fn player(&self, username: &str) -> Result<PlayerStanding, ScoreError> {
        let key = sanitize_username(username);
        let highscore = self.db.get_score(&key).await?.map_or(0.0, |record| record.highscore);
        let time = self.db.get_time(&key).await?.map_or(0, |record| record.time);
        Ok(PlayerStanding { username: username.to_string(), highscore, time })
    }

    /// Post whose payout funds the running week, if any cycle completed yet.
    pub async fn reward_pointer(&self) -> Result<Option<CyclePointer>, ScoreError> {
        Ok(self.db.get_cycle_pointer().await?)
    }
}
