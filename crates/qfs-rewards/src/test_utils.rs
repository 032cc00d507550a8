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

//! In-memory [Ledger] for exercising the reward cycle without a node.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::ledger::{
    Account, Asset, Comment, HistoryEntry, Ledger, LedgerError, OpFilter, Symbol, TxConfirmation,
};

/// A broadcast recorded by [MockLedger].
#[derive(Clone, Debug, PartialEq)]
pub enum LedgerCall {
    Claim { account: String, hive: Asset, hbd: Asset, vests: Asset },
    Transfer { from: String, to: String, amount: Asset, memo: String },
    CustomJson { required_auths: Vec<String>, id: String, json: String },
    Comment(Comment),
}

#[derive(Default)]
struct MockState {
    calls: Vec<LedgerCall>,
    history_requests: Vec<(i64, u32)>,
    boundary: Option<u64>,
    next_block: u64,
}

/// Mock ledger holding one account and its author reward history.
///
/// History pages behave like a node: entries with a sequence at or below `start` (`-1` meaning the
/// newest), at most `limit` of them, in ascending order. The op filter is not applied.
///
/// # Example
///
/// ```rust,ignore
/// # use qfs_rewards::test_utils::MockLedger;
/// let ledger = MockLedger::new("stoken.quest")
///     .with_author_reward(10, "the-quest-for-stoken-week-1", "100.000 HBD");
/// ```
pub struct MockLedger {
    account: Account,
    history: Vec<HistoryEntry>,
    fail_transfer_to: Option<String>,
    fail_history: bool,
    fail_comment: bool,
    state: Mutex<MockState>,
}

impl MockLedger {
    /// Creates a ledger for `account` with no pending rewards and no history.
    pub fn new(account: &str) -> Self {
        Self {
            account: Account {
                name: account.to_string(),
                balance: Asset::zero(Symbol::Hive),
                hbd_balance: Asset::zero(Symbol::Hbd),
                reward_hive_balance: Asset::zero(Symbol::Hive),
                reward_hbd_balance: Asset::zero(Symbol::Hbd),
                reward_vesting_balance: Asset::zero(Symbol::Vests),
            },
            history: vec![],
            fail_transfer_to: None,
            fail_history: false,
            fail_comment: false,
            state: Mutex::new(MockState { next_block: 1, ..Default::default() }),
        }
    }

    /// Sets the pending reward balances, e.g. `("0.000 HIVE", "1.234 HBD", "5.000000 VESTS")`.
    pub fn with_pending_rewards(mut self, hive: &str, hbd: &str, vests: &str) -> Self {
        self.account.reward_hive_balance = parse_asset(hive);
        self.account.reward_hbd_balance = parse_asset(hbd);
        self.account.reward_vesting_balance = parse_asset(vests);
        self
    }

    /// Appends an `author_reward` entry paying `hbd` for `permlink`.
    pub fn with_author_reward(mut self, sequence: u64, permlink: &str, hbd: &str) -> Self {
        self.history.push(HistoryEntry {
            sequence,
            timestamp: "2024-01-01T00:00:00".into(),
            op_name: "author_reward".into(),
            op: json!({
                "author": self.account.name,
                "permlink": permlink,
                "hbd_payout": hbd,
                "hive_payout": "0.000 HIVE",
                "vesting_payout": "0.000000 VESTS",
            }),
        });
        self.history.sort_by_key(|entry| entry.sequence);
        self
    }

    /// The first history request starting at the newest entry fails with a boundary error.
    pub fn with_history_boundary(self, resume_sequence: u64) -> Self {
        self.lock().boundary = Some(resume_sequence);
        self
    }

    /// Every history request fails.
    pub fn with_history_failure(mut self) -> Self {
        self.fail_history = true;
        self
    }

    /// Transfers to `username` fail.
    pub fn with_transfer_failure(mut self, username: &str) -> Self {
        self.fail_transfer_to = Some(username.to_string());
        self
    }

    /// Publishing the post fails.
    pub fn with_comment_failure(mut self) -> Self {
        self.fail_comment = true;
        self
    }

    /// All successful broadcasts in order.
    pub fn calls(&self) -> Vec<LedgerCall> {
        self.lock().calls.clone()
    }

    pub fn transfers(&self) -> Vec<(String, Asset, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                LedgerCall::Transfer { to, amount, memo, .. } => Some((to, amount, memo)),
                _ => None,
            })
            .collect()
    }

    /// JSON payloads of the custom json broadcasts.
    pub fn custom_jsons(&self) -> Vec<serde_json::Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                LedgerCall::CustomJson { json, .. } => serde_json::from_str(&json).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                LedgerCall::Comment(comment) => Some(comment),
                _ => None,
            })
            .collect()
    }

    /// `(start, limit)` of every history request.
    pub fn history_requests(&self) -> Vec<(i64, u32)> {
        self.lock().history_requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: LedgerCall) -> TxConfirmation {
        let mut state = self.lock();
        let block_num = state.next_block;
        state.next_block += 1;
        state.calls.push(call);
        TxConfirmation { id: format!("{block_num:040x}"), block_num }
    }
}

fn parse_asset(value: &str) -> Asset {
    match value.parse() {
        Ok(asset) => asset,
        Err(err) => panic!("invalid asset {value}: {err}"),
    }
}

fn injected(what: &str) -> LedgerError {
    LedgerError::Rpc { rpc_code: -32000, message: format!("injected {what} failure") }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn get_account(&self, name: &str) -> Result<Account, LedgerError> {
        if name != self.account.name {
            return Err(LedgerError::AccountNotFound(name.to_string()));
        }
        Ok(self.account.clone())
    }

    async fn get_account_history(
        &self,
        name: &str,
        start: i64,
        limit: u32,
        _filter: OpFilter,
    ) -> Result<Vec<HistoryEntry>, LedgerError> {
        {
            let mut state = self.lock();
            state.history_requests.push((start, limit));
            if start < 0 {
                if let Some(resume_sequence) = state.boundary.take() {
                    return Err(LedgerError::HistoryBoundary { resume_sequence });
                }
            }
        }
        if self.fail_history {
            return Err(injected("history"));
        }
        if name != self.account.name {
            return Err(LedgerError::AccountNotFound(name.to_string()));
        }

        let upper = u64::try_from(start).unwrap_or(u64::MAX);
        let matching: Vec<&HistoryEntry> =
            self.history.iter().filter(|entry| entry.sequence <= upper).collect();
        let skip = matching.len().saturating_sub(limit as usize);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    async fn claim_reward_balance(
        &self,
        account: &str,
        reward_hive: &Asset,
        reward_hbd: &Asset,
        reward_vests: &Asset,
    ) -> Result<TxConfirmation, LedgerError> {
        Ok(self.record(LedgerCall::Claim {
            account: account.to_string(),
            hive: *reward_hive,
            hbd: *reward_hbd,
            vests: *reward_vests,
        }))
    }

    async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: &Asset,
        memo: &str,
    ) -> Result<TxConfirmation, LedgerError> {
        if self.fail_transfer_to.as_deref() == Some(to) {
            return Err(injected("transfer"));
        }
        Ok(self.record(LedgerCall::Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount: *amount,
            memo: memo.to_string(),
        }))
    }

    async fn custom_json(
        &self,
        required_auths: &[String],
        _required_posting_auths: &[String],
        id: &str,
        json: &str,
    ) -> Result<TxConfirmation, LedgerError> {
        Ok(self.record(LedgerCall::CustomJson {
            required_auths: required_auths.to_vec(),
            id: id.to_string(),
            json: json.to_string(),
        }))
    }

    async fn post_comment(&self, comment: &Comment) -> Result<TxConfirmation, LedgerError> {
        if self.fail_comment {
            return Err(injected("comment"));
        }
        Ok(self.record(LedgerCall::Comment(comment.clone())))
    }
}
