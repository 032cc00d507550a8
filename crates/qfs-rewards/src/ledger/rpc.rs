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
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::TimeDelta;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use url::Url;

use super::{
    tx::{
        ClaimRewardBalanceOperation, CustomJsonOperation, Operation, PrivateKey, Transaction,
        TransferOperation, HIVE_CHAIN_ID,
    },
    Account, Asset, Comment, HistoryEntry, Ledger, LedgerError, OpFilter, TxConfirmation,
};

const DEFAULT_EXPIRATION_SECS: i64 = 60;
const HISTORY_BOUNDARY_CODE: i64 = 10;

/// Signing keys of the reward account.
#[derive(Clone, Debug)]
pub struct KeyChain {
    pub posting: PrivateKey,
    pub active: PrivateKey,
}

/// Chain head state used as the TAPOS reference of new transactions.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DynamicGlobalProperties {
    pub head_block_number: u64,
    pub head_block_id: String,
    pub time: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct RawHistoryItem {
    timestamp: String,
    op: (String, Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Failover {
    /// Idempotent reads, any transport failure moves on to the next node.
    Read,
    /// Broadcasts only move on when the request never reached the node.
    Broadcast,
}

impl Failover {
    fn allows(self, err: &reqwest::Error) -> bool {
        match self {
            Failover::Read => true,
            Failover::Broadcast => err.is_connect(),
        }
    }
}

/// Condenser API JSON-RPC client with local transaction signing.
pub struct HiveClient {
    client: Client,
    nodes: Vec<Url>,
    keys: KeyChain,
    chain_id: [u8; 32],
    expiration: TimeDelta,
    request_id: AtomicU64,
}

impl HiveClient {
    /// Create a client trying `nodes` in order.
    pub fn new(nodes: Vec<Url>, keys: KeyChain, timeout: Duration) -> Result<Self, LedgerError> {
        if nodes.is_empty() {
            return Err(LedgerError::NoNodes);
        }
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            nodes,
            keys,
            chain_id: HIVE_CHAIN_ID,
            expiration: TimeDelta::seconds(DEFAULT_EXPIRATION_SECS),
            request_id: AtomicU64::new(1),
        })
    }

    /// Override the chain id, for testnets.
    pub fn with_chain_id(mut self, chain_id: [u8; 32]) -> Self {
        self.chain_id = chain_id;
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        failover: Failover,
    ) -> Result<T, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let mut last_err = None;
        for node in &self.nodes {
            match self.call_node(node, &body).await {
                Ok(result) => {
                    return serde_json::from_value(result).map_err(|err| {
                        LedgerError::InvalidResponse(format!("{method} from {node}: {err}"))
                    })
                }
                Err(LedgerError::Http(err)) if failover.allows(&err) => {
                    tracing::warn!("{method} failed on {node}, trying next node: {err}");
                    last_err = Some(LedgerError::Http(err));
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or(LedgerError::NoNodes))
    }

    async fn call_node(&self, node: &Url, body: &Value) -> Result<Value, LedgerError> {
        let response: RpcResponse = self
            .client
            .post(node.clone())
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(rpc_error(error));
        }
        response
            .result
            .ok_or_else(|| LedgerError::InvalidResponse(format!("no result from {node}")))
    }

    async fn broadcast(
        &self,
        operations: Vec<Operation>,
        key: &PrivateKey,
    ) -> Result<TxConfirmation, LedgerError> {
        let props: DynamicGlobalProperties = self
            .call("condenser_api.get_dynamic_global_properties", json!([]), Failover::Read)
            .await?;
        let tx = Transaction::new(&props, operations, self.expiration)?;
        let tx_id = tx.id()?;
        let signed = tx.sign(key, &self.chain_id)?;
        tracing::debug!("Broadcasting transaction {tx_id}");

        let confirmation: TxConfirmation = self
            .call(
                "condenser_api.broadcast_transaction_synchronous",
                json!([signed]),
                Failover::Broadcast,
            )
            .await?;
        if confirmation.id != tx_id {
            tracing::warn!("Node confirmed transaction {} but {tx_id} was sent", confirmation.id);
        }
        tracing::debug!(
            "Transaction {} included in block {}",
            confirmation.id,
            confirmation.block_num
        );

        Ok(confirmation)
    }
}

fn rpc_error(error: RpcErrorBody) -> LedgerError {
    if let Some(data) = &error.data {
        let sequence = data.pointer("/stack/0/data/sequence").and_then(Value::as_u64);
        if data.get("code").and_then(Value::as_i64) == Some(HISTORY_BOUNDARY_CODE) {
            if let Some(resume_sequence) = sequence {
                return LedgerError::HistoryBoundary { resume_sequence };
            }
        }
    }
    LedgerError::Rpc { rpc_code: error.code, message: error.message }
}

#[async_trait]
impl Ledger for HiveClient {
    async fn get_account(&self, name: &str) -> Result<Account, LedgerError> {
        let accounts: Vec<Account> =
            self.call("condenser_api.get_accounts", json!([[name]]), Failover::Read).await?;
        accounts
            .into_iter()
            .find(|account| account.name == name)
            .ok_or_else(|| LedgerError::AccountNotFound(name.to_string()))
    }

    async fn get_account_history(
        &self,
        name: &str,
        start: i64,
        limit: u32,
        filter: OpFilter,
    ) -> Result<Vec<HistoryEntry>, LedgerError> {
        let items: Vec<(u64, RawHistoryItem)> = self
            .call(
                "condenser_api.get_account_history",
                json!([name, start, limit, filter.low, filter.high]),
                Failover::Read,
            )
            .await?;

        Ok(items
            .into_iter()
            .map(|(sequence, item)| HistoryEntry {
                sequence,
                timestamp: item.timestamp,
                op_name: item.op.0,
                op: item.op.1,
            })
            .collect())
    }

    async fn claim_reward_balance(
        &self,
        account: &str,
        reward_hive: &Asset,
        reward_hbd: &Asset,
        reward_vests: &Asset,
    ) -> Result<TxConfirmation, LedgerError> {
        let op = Operation::ClaimRewardBalance(ClaimRewardBalanceOperation {
            account: account.to_string(),
            reward_hive: *reward_hive,
            reward_hbd: *reward_hbd,
            reward_vests: *reward_vests,
        });
        self.broadcast(vec![op], &self.keys.posting).await
    }

    async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: &Asset,
        memo: &str,
    ) -> Result<TxConfirmation, LedgerError> {
        let op = Operation::Transfer(TransferOperation {
            from: from.to_string(),
            to: to.to_string(),
            amount: *amount,
            memo: memo.to_string(),
        });
        self.broadcast(vec![op], &self.keys.active).await
    }

    async fn custom_json(
        &self,
        required_auths: &[String],
        required_posting_auths: &[String],
        id: &str,
        json: &str,
    ) -> Result<TxConfirmation, LedgerError> {
        let key = if required_auths.is_empty() { &self.keys.posting } else { &self.keys.active };
        let op = Operation::CustomJson(CustomJsonOperation {
            required_auths: required_auths.to_vec(),
            required_posting_auths: required_posting_auths.to_vec(),
            id: id.to_string(),
            json: json.to_string(),
        });
        self.broadcast(vec![op], key).await
    }

    async fn post_comment(&self, comment: &Comment) -> Result<TxConfirmation, LedgerError> {
        self.broadcast(vec![Operation::Comment(comment.clone())], &self.keys.posting).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AUTHOR_REWARD_OP;
    use httpmock::prelude::*;

    const TEST_WIF: &str = "5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTJ";

    fn keys() -> KeyChain {
        let key: PrivateKey = TEST_WIF.parse().unwrap();
        KeyChain { posting: key.clone(), active: key }
    }

    fn client(nodes: &[String]) -> HiveClient {
        let nodes = nodes.iter().map(|node| node.parse().unwrap()).collect();
        HiveClient::new(nodes, keys(), Duration::from_secs(5)).unwrap()
    }

    fn account_json() -> Value {
        json!({
            "name": "stoken.quest",
            "balance": "10.000 HIVE",
            "hbd_balance": "25.500 HBD",
            "reward_hive_balance": "0.000 HIVE",
            "reward_hbd_balance": "1.234 HBD",
            "reward_vesting_balance": "100.000000 VESTS",
            "posting_json_metadata": "",
        })
    }

    fn mock_global_properties(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST).body_contains("condenser_api.get_dynamic_global_properties");
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "head_block_number": 80_000_000u64,
                    "head_block_id": "04c4b400aabbccdd000000000000000000000000",
                    "time": "2024-06-01T00:00:00",
                    "current_supply": "400000000.000 HIVE"
                }
            }));
        })
    }

    #[test]
    fn requires_nodes() {
        assert!(matches!(
            HiveClient::new(vec![], keys(), Duration::from_secs(1)),
            Err(LedgerError::NoNodes)
        ));
    }

    #[tokio::test]
    async fn get_account() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/")
                .body_contains("condenser_api.get_accounts")
                .body_contains("stoken.quest");
            then.status(200).json_body(json!({"jsonrpc": "2.0", "id": 1, "result": [account_json()]}));
        });

        let account = client(&[server.base_url()]).get_account("stoken.quest").await.unwrap();
        mock.assert();
        assert_eq!(account.reward_hbd_balance, "1.234 HBD".parse().unwrap());
        assert!(account.has_pending_rewards());
    }

    #[tokio::test]
    async fn missing_account() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).body_contains("condenser_api.get_accounts");
            then.status(200).json_body(json!({"jsonrpc": "2.0", "id": 1, "result": []}));
        });

        let err = client(&[server.base_url()]).get_account("nobody").await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(name) if name == "nobody"));
    }

    #[tokio::test]
    async fn account_history() {
        let server = MockServer::start();
        let filter = OpFilter::only(&[AUTHOR_REWARD_OP]);
        let mock = server.mock(|when, then| {
            when.method(POST)
                .body_contains("condenser_api.get_account_history")
                .body_contains(format!("[\"stoken.quest\",-1,30,{},0]", filter.low));
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": [
                    [41, {
                        "trx_id": "0000000000000000000000000000000000000000",
                        "block": 100,
                        "timestamp": "2024-05-01T12:00:00",
                        "op": ["author_reward", {
                            "author": "stoken.quest",
                            "permlink": "the-quest-for-stoken-week-2",
                            "hbd_payout": "8.000 HBD",
                            "hive_payout": "0.000 HIVE",
                            "vesting_payout": "10.000000 VESTS"
                        }]
                    }],
                    [57, {
                        "trx_id": "0000000000000000000000000000000000000000",
                        "block": 200,
                        "timestamp": "2024-05-08T12:00:00",
                        "op": ["author_reward", {
                            "author": "stoken.quest",
                            "permlink": "the-quest-for-stoken-week-3",
                            "hbd_payout": "12.345 HBD",
                            "hive_payout": "0.000 HIVE",
                            "vesting_payout": "20.000000 VESTS"
                        }]
                    }]
                ]
            }));
        });

        let history = client(&[server.base_url()])
            .get_account_history("stoken.quest", -1, 30, filter)
            .await
            .unwrap();
        mock.assert();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].sequence, 57);
        let reward = history[1].author_reward().unwrap();
        assert_eq!(reward.permlink, "the-quest-for-stoken-week-3");
        assert_eq!(reward.hbd_payout, "12.345 HBD".parse().unwrap());
    }

    #[tokio::test]
    async fn history_boundary_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).body_contains("condenser_api.get_account_history");
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {
                    "code": -32003,
                    "message": "Assert Exception:args.start >= args.limit-1: start must be greater than or equal to limit-1 (start is 0-based index)",
                    "data": {
                        "code": 10,
                        "name": "assert_exception",
                        "message": "Assert Exception",
                        "stack": [{
                            "context": {"level": "error", "file": "account_history_api.cpp", "line": 43},
                            "format": "args.start >= args.limit-1: start must be greater than or equal to limit-1",
                            "data": {"sequence": 12}
                        }]
                    }
                }
            }));
        });

        let err = client(&[server.base_url()])
            .get_account_history("stoken.quest", -1, 30, OpFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::HistoryBoundary { resume_sequence: 12 }));
    }

    #[tokio::test]
    async fn plain_rpc_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32602, "message": "Invalid parameters"}
            }));
        });

        let err = client(&[server.base_url()]).get_account("stoken.quest").await.unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { rpc_code: -32602, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn reads_fail_over() {
        let down = MockServer::start();
        let down_mock = down.mock(|when, then| {
            when.method(POST);
            then.status(503);
        });
        let up = MockServer::start();
        let up_mock = up.mock(|when, then| {
            when.method(POST).body_contains("condenser_api.get_accounts");
            then.status(200).json_body(json!({"jsonrpc": "2.0", "id": 1, "result": [account_json()]}));
        });

        let account = client(&[down.base_url(), up.base_url()])
            .get_account("stoken.quest")
            .await
            .unwrap();
        down_mock.assert();
        up_mock.assert();
        assert_eq!(account.name, "stoken.quest");
    }

    #[tokio::test]
    async fn all_nodes_down() {
        let down = MockServer::start();
        down.mock(|when, then| {
            when.method(POST);
            then.status(502);
        });

        let err = client(&[down.base_url()]).get_account("stoken.quest").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn broadcast_transfer() {
        let server = MockServer::start();
        let props = mock_global_properties(&server);
        let broadcast = server.mock(|when, then| {
            when.method(POST)
                .body_contains("condenser_api.broadcast_transaction_synchronous")
                .body_contains("\"transfer\"")
                .body_contains("\"amount\":\"5.000 HBD\"")
                .body_contains("\"ref_block_num\":46080")
                .body_contains("\"expiration\":\"2024-06-01T00:01:00\"")
                .body_contains("signatures");
            then.status(200).json_body(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": {"id": "abc", "block_num": 80_000_001u64, "trx_num": 3, "expired": false}
            }));
        });

        let confirmation = client(&[server.base_url()])
            .transfer("stoken.quest", "alice", &"5.000 HBD".parse().unwrap(), "gg")
            .await
            .unwrap();
        props.assert();
        broadcast.assert();
        assert_eq!(confirmation, TxConfirmation { id: "abc".into(), block_num: 80_000_001 });
    }

    #[tokio::test]
    async fn broadcast_does_not_fail_over_after_delivery() {
        let first = MockServer::start();
        mock_global_properties(&first);
        let rejected = first.mock(|when, then| {
            when.method(POST).body_contains("condenser_api.broadcast_transaction_synchronous");
            then.status(500);
        });
        let second = MockServer::start();
        let second_broadcast = second.mock(|when, then| {
            when.method(POST).body_contains("condenser_api.broadcast_transaction_synchronous");
            then.status(200).json_body(json!({"jsonrpc": "2.0", "id": 2, "result": {"id": "abc"}}));
        });

        let comment = Comment {
            parent_author: String::new(),
            parent_permlink: "hive-173115".into(),
            author: "stoken.quest".into(),
            permlink: "the-quest-for-stoken-week-1".into(),
            title: "Quest For Skateboarding week 1".into(),
            body: "body".into(),
            json_metadata: "{}".into(),
        };
        let err = client(&[first.base_url(), second.base_url()])
            .post_comment(&comment)
            .await
            .unwrap_err();
        rejected.assert();
        second_broadcast.assert_hits(0);
        assert!(matches!(err, LedgerError::Http(_)));
    }

    #[tokio::test]
    async fn broadcast_fails_over_on_connect_error() {
        let server = MockServer::start();
        mock_global_properties(&server);
        let broadcast = server.mock(|when, then| {
            when.method(POST)
                .body_contains("condenser_api.broadcast_transaction_synchronous")
                .body_contains("\"custom_json\"")
                .body_contains("ssc-mainnet-hive");
            then.status(200).json_body(json!({"jsonrpc": "2.0", "id": 2, "result": {"id": "def", "block_num": 9}}));
        });

        // nothing listens on port 1
        let confirmation = client(&["http://127.0.0.1:1".to_string(), server.base_url()])
            .custom_json(&["stoken.quest".into()], &[], "ssc-mainnet-hive", "[]")
            .await
            .unwrap();
        broadcast.assert();
        assert_eq!(confirmation.block_num, 9);
    }
}
