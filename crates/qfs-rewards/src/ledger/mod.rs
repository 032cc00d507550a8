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

//! Client side of the Hive blockchain as used by the reward cycle.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{errors::CodedError, impl_coded_debug};

mod asset;
mod rpc;
mod tx;

pub use asset::{Asset, Symbol};
pub use rpc::{DynamicGlobalProperties, HiveClient, KeyChain};
pub use tx::{
    ClaimRewardBalanceOperation, CustomJsonOperation, Operation, PrivateKey, SignedTransaction,
    Transaction, TransferOperation, HIVE_CHAIN_ID,
};

/// Index of the `author_reward` virtual operation in the Hive operation list.
pub const AUTHOR_REWARD_OP: u32 = 51;

#[derive(Error)]
pub enum LedgerError {
    #[error("{code} HTTP error: {0}", code = self.code())]
    Http(#[from] reqwest::Error),

    #[error("{code} RPC error {rpc_code}: {message}", code = self.code())]
    Rpc { rpc_code: i64, message: String },

    #[error("{code} Account history starts after requested sequence, resume at {resume_sequence}", code = self.code())]
    HistoryBoundary { resume_sequence: u64 },

    #[error("{code} Invalid response: {0}", code = self.code())]
    InvalidResponse(String),

    #[error("{code} Account not found: {0}", code = self.code())]
    AccountNotFound(String),

    #[error("{code} Invalid asset: {0}", code = self.code())]
    InvalidAsset(String),

    #[error("{code} Invalid private key: {0}", code = self.code())]
    InvalidKey(String),

    #[error("{code} Failed to sign transaction: {0}", code = self.code())]
    Signing(String),

    #[error("{code} No RPC nodes configured", code = self.code())]
    NoNodes,
}

impl_coded_debug!(LedgerError);

impl CodedError for LedgerError {
    fn code(&self) -> &str {
        match self {
            LedgerError::Http(_) => "[Q-LED-001]",
            LedgerError::Rpc { .. } => "[Q-LED-002]",
            LedgerError::HistoryBoundary { .. } => "[Q-LED-003]",
            LedgerError::InvalidResponse(_) => "[Q-LED-004]",
            LedgerError::AccountNotFound(_) => "[Q-LED-005]",
            LedgerError::InvalidAsset(_) => "[Q-LED-006]",
            LedgerError::InvalidKey(_) => "[Q-LED-007]",
            LedgerError::Signing(_) => "[Q-LED-008]",
            LedgerError::NoNodes => "[Q-LED-009]",
        }
    }
}

impl LedgerError {
    /// Network level failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Http(_))
    }
}

/// Balances of a Hive account relevant to the reward cycle.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Account {
    pub name: String,
    pub balance: Asset,
    pub hbd_balance: Asset,
    pub reward_hive_balance: Asset,
    pub reward_hbd_balance: Asset,
    pub reward_vesting_balance: Asset,
}

impl Account {
    /// True if any author/curation reward is waiting to be claimed.
    pub fn has_pending_rewards(&self) -> bool {
        !(self.reward_hive_balance.is_zero()
            && self.reward_hbd_balance.is_zero()
            && self.reward_vesting_balance.is_zero())
    }
}

/// Operation type bitmask used to filter account history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpFilter {
    pub low: u64,
    pub high: u64,
}

impl OpFilter {
    pub fn only(ops: &[u32]) -> Self {
        ops.iter().fold(Self::default(), |mut filter, &op| {
            if op < 64 {
                filter.low |= 1u64 << op;
            } else {
                filter.high |= 1u64 << (op - 64);
            }
            filter
        })
    }
}

/// One entry of an account's operation history.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub sequence: u64,
    pub timestamp: String,
    pub op_name: String,
    pub op: serde_json::Value,
}

impl HistoryEntry {
    /// Decodes the entry as an author reward, if it is one.
    pub fn author_reward(&self) -> Option<AuthorReward> {
        if self.op_name != "author_reward" {
            return None;
        }
        match serde_json::from_value(self.op.clone()) {
            Ok(reward) => Some(reward),
            Err(err) => {
                tracing::warn!("Malformed author_reward at sequence {}: {err}", self.sequence);
                None
            }
        }
    }
}

/// Payout of a post to its author.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AuthorReward {
    pub author: String,
    pub permlink: String,
    pub hbd_payout: Asset,
    pub hive_payout: Asset,
    pub vesting_payout: Asset,
}

/// A post or reply.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comment {
    pub parent_author: String,
    pub parent_permlink: String,
    pub author: String,
    pub permlink: String,
    pub title: String,
    pub body: String,
    pub json_metadata: String,
}

/// Acknowledgement of a broadcast transaction.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TxConfirmation {
    pub id: String,
    #[serde(default)]
    pub block_num: u64,
}

/// Chain access needed by the reward cycle.
///
/// Implementations hold the signing keys: the posting key signs claims and comments, the active
/// key signs transfers and custom json operations.
#[async_trait]
pub trait Ledger {
    async fn get_account(&self, name: &str) -> Result<Account, LedgerError>;

    /// Returns up to `limit` entries matching `filter`, walking back from sequence `start`
    /// (`-1` for the newest entry), in ascending sequence order.
    async fn get_account_history(
        &self,
        name: &str,
        start: i64,
        limit: u32,
        filter: OpFilter,
    ) -> Result<Vec<HistoryEntry>, LedgerError>;

    async fn claim_reward_balance(
        &self,
        account: &str,
        reward_hive: &Asset,
        reward_hbd: &Asset,
        reward_vests: &Asset,
    ) -> Result<TxConfirmation, LedgerError>;

    async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: &Asset,
        memo: &str,
    ) -> Result<TxConfirmation, LedgerError>;

    async fn custom_json(
        &self,
        required_auths: &[String],
        required_posting_auths: &[String],
        id: &str,
        json: &str,
    ) -> Result<TxConfirmation, LedgerError>;

    async fn post_comment(&self, comment: &Comment) -> Result<TxConfirmation, LedgerError>;
}

pub type LedgerObj = Arc<dyn Ledger + Send + Sync>;
