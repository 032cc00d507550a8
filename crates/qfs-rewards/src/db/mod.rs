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

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use thiserror::Error;

use crate::{errors::CodedError, impl_coded_debug};

#[derive(Error)]
pub enum DbError {
    #[error("{code} SQL error: {0}", code = self.code())]
    SqlErr(#[from] sqlx::Error),

    #[error("{code} SQL Migration error: {0}", code = self.code())]
    MigrateErr(#[from] sqlx::migrate::MigrateError),

    #[error("{code} Invalid record for {0}: {1}", code = self.code())]
    InvalidRecord(String, String),
}

impl_coded_debug!(DbError);

impl CodedError for DbError {
    fn code(&self) -> &str {
        match self {
            DbError::SqlErr(_) => "[Q-DB-001]",
            DbError::MigrateErr(_) => "[Q-DB-002]",
            DbError::InvalidRecord(_, _) => "[Q-DB-003]",
        }
    }
}

/// Best score of a player for the running week.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub username: String,
    pub highscore: f64,
    /// Unix time of the last submission, in milliseconds
    pub timestamp: i64,
}

/// Best quest completion time of a player for the running week.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecord {
    pub username: String,
    /// Completion time in seconds
    pub time: u64,
    /// Unix time of the last submission, in milliseconds
    pub timestamp: i64,
}

/// Reference to the latest published announcement post.
///
/// The payout of that post funds the next cycle, and `week` numbers the cycles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclePointer {
    pub link: String,
    pub week: u64,
}

#[async_trait]
pub trait ScoreStore {
    async fn get_scores(&self) -> Result<Vec<ScoreRecord>, DbError>;
    async fn get_score(&self, key: &str) -> Result<Option<ScoreRecord>, DbError>;
    async fn set_score(&self, key: &str, record: &ScoreRecord) -> Result<(), DbError>;
    async fn clear_scores(&self) -> Result<(), DbError>;

    async fn get_times(&self) -> Result<Vec<TimeRecord>, DbError>;
    async fn get_time(&self, key: &str) -> Result<Option<TimeRecord>, DbError>;
    async fn set_time(&self, key: &str, record: &TimeRecord) -> Result<(), DbError>;
    async fn clear_times(&self) -> Result<(), DbError>;

    async fn get_cycle_pointer(&self) -> Result<Option<CyclePointer>, DbError>;
    async fn set_cycle_pointer(&self, pointer: &CyclePointer) -> Result<(), DbError>;

    /// Writes the new pointer and wipes both score tables in a single transaction.
    async fn rotate_cycle(&self, pointer: &CyclePointer) -> Result<(), DbError>;
}

pub type DbObj = Arc<dyn ScoreStore + Send + Sync>;

const POINTER_KEY: i64 = 0;

const UPSERT_POINTER: &str = "INSERT INTO cycle_pointer (id, link, week) VALUES (?, ?, ?) \
     ON CONFLICT (id) DO UPDATE SET link = excluded.link, week = excluded.week";

pub struct SqliteDb {
    pool: SqlitePool,
}

impl SqliteDb {
    /// Constructs a [SqliteDb] from an existing [SqlitePool]
    ///
    /// This method applies database migrations
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Construct a new [SqliteDb] from a connection string, creating the file if needed
    pub async fn new(conn_str: &str) -> Result<Self, DbError> {
        let opts = SqliteConnectOptions::from_str(conn_str)?.create_if_missing(true);
        // Every connection to an in-memory database opens a fresh, empty database.
        let max_connections = if conn_str.contains(":memory:") { 1 } else { 5 };
        let pool =
            SqlitePoolOptions::new().max_connections(max_connections).connect_with(opts).await?;

        Self::from_pool(pool).await
    }
}

#[derive(sqlx::FromRow)]
struct DbScore {
    username: String,
    highscore: f64,
    timestamp: i64,
}

impl From<DbScore> for ScoreRecord {
    fn from(row: DbScore) -> Self {
        Self { username: row.username, highscore: row.highscore, timestamp: row.timestamp }
    }
}

#[derive(sqlx::FromRow)]
struct DbTime {
    username: String,
    time: i64,
    timestamp: i64,
}

impl TryFrom<DbTime> for TimeRecord {
    type Error = DbError;

    fn try_from(row: DbTime) -> Result<Self, DbError> {
        let time = u64::try_from(row.time).map_err(|_| {
            DbError::InvalidRecord(row.username.clone(), format!("negative time {}", row.time))
        })?;
        Ok(Self { username: row.username, time, timestamp: row.timestamp })
    }
}

#[async_trait]
impl ScoreStore for SqliteDb {
    async fn get_scores(&self) -> Result<Vec<ScoreRecord>, DbError> {
        let rows: Vec<DbScore> =
            sqlx::query_as("SELECT username, highscore, timestamp FROM scores ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(ScoreRecord::from).collect())
    }

    async fn get_score(&self, key: &str) -> Result<Option<ScoreRecord>, DbError> {
        let row: Option<DbScore> =
            sqlx::query_as("SELECT username, highscore, timestamp FROM scores WHERE id = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(ScoreRecord::from))
    }

    async fn set_score(&self, key: &str, record: &ScoreRecord) -> Result<(), DbError> {
        tracing::trace!("Setting score for {key}: {}", record.highscore);
        sqlx::query(
            "INSERT INTO scores (id, username, highscore, timestamp) VALUES (?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET username = excluded.username, \
             highscore = excluded.highscore, timestamp = excluded.timestamp",
        )
        .bind(key)
        .bind(&record.username)
        .bind(record.highscore)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_scores(&self) -> Result<(), DbError> {
        sqlx::query("DELETE FROM scores").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_times(&self) -> Result<Vec<TimeRecord>, DbError> {
        let rows: Vec<DbTime> =
            sqlx::query_as("SELECT username, time, timestamp FROM times ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TimeRecord::try_from).collect()
    }

    async fn get_time(&self, key: &str) -> Result<Option<TimeRecord>, DbError> {
        let row: Option<DbTime> =
            sqlx::query_as("SELECT username, time, timestamp FROM times WHERE id = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TimeRecord::try_from).transpose()
    }

    async fn set_time(&self, key: &str, record: &TimeRecord) -> Result<(), DbError> {
        tracing::trace!("Setting time for {key}: {}s", record.time);
        let time = i64::try_from(record.time).map_err(|_| {
            DbError::InvalidRecord(record.username.clone(), format!("time {} too large", record.time))
        })?;
        sqlx::query(
            "INSERT INTO times (id, username, time, timestamp) VALUES (?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET username = excluded.username, \
             time = excluded.time, timestamp = excluded.timestamp",
        )
        .bind(key)
        .bind(&record.username)
        .bind(time)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_times(&self) -> Result<(), DbError> {
        sqlx::query("DELETE FROM times").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_cycle_pointer(&self) -> Result<Option<CyclePointer>, DbError> {
        let res = sqlx::query("SELECT link, week FROM cycle_pointer WHERE id = ?")
            .bind(POINTER_KEY)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = res else {
            return Ok(None);
        };

        let link: String = row.try_get("link")?;
        let week: i64 = row.try_get("week")?;
        let week = u64::try_from(week)
            .map_err(|_| DbError::InvalidRecord(link.clone(), format!("negative week {week}")))?;

        Ok(Some(CyclePointer { link, week }))
    }

    async fn set_cycle_pointer(&self, pointer: &CyclePointer) -> Result<(), DbError> {
        sqlx::query(UPSERT_POINTER)
            .bind(POINTER_KEY)
            .bind(&pointer.link)
            .bind(pointer.week as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn rotate_cycle(&self, pointer: &CyclePointer) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT_POINTER)
            .bind(POINTER_KEY)
            .bind(&pointer.link)
            .bind(pointer.week as i64)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM scores").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM times").execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }
}
