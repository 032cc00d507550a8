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

//! Hive transaction construction, binary serialization and signing.

use std::{fmt, str::FromStr};

use chrono::{NaiveDateTime, TimeDelta};
use k256::ecdsa::{
    signature::hazmat::RandomizedPrehashSigner, RecoveryId, Signature, SigningKey, VerifyingKey,
};
use serde::{ser::SerializeTuple, Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::{Asset, Comment, DynamicGlobalProperties, LedgerError};

/// Hive mainnet chain id.
pub const HIVE_CHAIN_ID: [u8; 32] = [
    0xbe, 0xea, 0xb0, 0xde, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0,
];

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const WIF_VERSION: u8 = 0x80;
const MAX_SIGNING_ATTEMPTS: usize = 32;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransferOperation {
    pub from: String,
    pub to: String,
    pub amount: Asset,
    pub memo: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomJsonOperation {
    pub required_auths: Vec<String>,
    pub required_posting_auths: Vec<String>,
    pub id: String,
    pub json: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClaimRewardBalanceOperation {
    pub account: String,
    pub reward_hive: Asset,
    pub reward_hbd: Asset,
    pub reward_vests: Asset,
}

/// The subset of Hive operations broadcast by this service.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Comment(Comment),
    Transfer(TransferOperation),
    CustomJson(CustomJsonOperation),
    ClaimRewardBalance(ClaimRewardBalanceOperation),
}

impl Operation {
    /// Position of the operation in the chain's operation variant.
    pub fn id(&self) -> u64 {
        match self {
            Operation::Comment(_) => 1,
            Operation::Transfer(_) => 2,
            Operation::CustomJson(_) => 18,
            Operation::ClaimRewardBalance(_) => 39,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Comment(_) => "comment",
            Operation::Transfer(_) => "transfer",
            Operation::CustomJson(_) => "custom_json",
            Operation::ClaimRewardBalance(_) => "claim_reward_balance",
        }
    }

    fn encode(&self, enc: &mut Encoder) -> Result<(), LedgerError> {
        enc.varint(self.id());
        match self {
            Operation::Comment(op) => {
                enc.string(&op.parent_author);
                enc.string(&op.parent_permlink);
                enc.string(&op.author);
                enc.string(&op.permlink);
                enc.string(&op.title);
                enc.string(&op.body);
                enc.string(&op.json_metadata);
            }
            Operation::Transfer(op) => {
                enc.string(&op.from);
                enc.string(&op.to);
                enc.asset(&op.amount)?;
                enc.string(&op.memo);
            }
            Operation::CustomJson(op) => {
                enc.account_set(&op.required_auths);
                enc.account_set(&op.required_posting_auths);
                enc.string(&op.id);
                enc.string(&op.json);
            }
            Operation::ClaimRewardBalance(op) => {
                enc.string(&op.account);
                enc.asset(&op.reward_hive)?;
                enc.asset(&op.reward_hbd)?;
                enc.asset(&op.reward_vests)?;
            }
        }
        Ok(())
    }
}

// JSON form is `["<name>", {..}]`
impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(self.name())?;
        match self {
            Operation::Comment(op) => tuple.serialize_element(op)?,
            Operation::Transfer(op) => tuple.serialize_element(op)?,
            Operation::CustomJson(op) => tuple.serialize_element(op)?,
            Operation::ClaimRewardBalance(op) => tuple.serialize_element(op)?,
        }
        tuple.end()
    }
}

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn string(&mut self, value: &str) {
        self.varint(value.len() as u64);
        self.buf.extend_from_slice(value.as_bytes());
    }

    // flat_set on chain, serialized sorted
    fn account_set(&mut self, accounts: &[String]) {
        let mut sorted: Vec<&String> = accounts.iter().collect();
        sorted.sort();
        sorted.dedup();
        self.varint(sorted.len() as u64);
        for account in sorted {
            self.string(account);
        }
    }

    fn asset(&mut self, asset: &Asset) -> Result<(), LedgerError> {
        self.i64(asset.satoshis()?);
        self.u8(asset.symbol().precision() as u8);
        let mut name = [0u8; 7];
        let wire = asset.symbol().wire_name();
        name[..wire.len()].copy_from_slice(wire);
        self.buf.extend_from_slice(&name);
        Ok(())
    }
}

fn serialize_time<S: Serializer>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format(TIME_FORMAT))
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Transaction {
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    #[serde(serialize_with = "serialize_time")]
    pub expiration: NaiveDateTime,
    pub operations: Vec<Operation>,
    pub extensions: Vec<serde_json::Value>,
}

impl Transaction {
    /// Builds a transaction referencing the current head block, expiring `ttl` after head time.
    pub fn new(
        props: &DynamicGlobalProperties,
        operations: Vec<Operation>,
        ttl: TimeDelta,
    ) -> Result<Self, LedgerError> {
        let head_id = hex::decode(&props.head_block_id).map_err(|err| {
            LedgerError::InvalidResponse(format!("bad head_block_id {}: {err}", props.head_block_id))
        })?;
        let prefix: [u8; 4] = head_id
            .get(4..8)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| {
                LedgerError::InvalidResponse(format!("short head_block_id {}", props.head_block_id))
            })?;
        let head_time = NaiveDateTime::parse_from_str(&props.time, TIME_FORMAT).map_err(|err| {
            LedgerError::InvalidResponse(format!("bad head block time {}: {err}", props.time))
        })?;

        Ok(Self {
            ref_block_num: (props.head_block_number & 0xffff) as u16,
            ref_block_prefix: u32::from_le_bytes(prefix),
            expiration: head_time + ttl,
            operations,
            extensions: vec![],
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        let expiration = u32::try_from(self.expiration.and_utc().timestamp()).map_err(|_| {
            LedgerError::Signing(format!("expiration {} out of range", self.expiration))
        })?;

        let mut enc = Encoder::default();
        enc.u16(self.ref_block_num);
        enc.u32(self.ref_block_prefix);
        enc.u32(expiration);
        enc.varint(self.operations.len() as u64);
        for op in &self.operations {
            op.encode(&mut enc)?;
        }
        // extensions
        enc.varint(0);
        Ok(enc.buf)
    }

    /// Transaction id as reported by the chain: first 20 bytes of the sha256 of the body.
    pub fn id(&self) -> Result<String, LedgerError> {
        let hash = Sha256::digest(self.to_bytes()?);
        Ok(hex::encode(&hash[..20]))
    }

    pub fn digest(&self, chain_id: &[u8; 32]) -> Result<[u8; 32], LedgerError> {
        let mut hasher = Sha256::new();
        hasher.update(chain_id);
        hasher.update(self.to_bytes()?);
        Ok(hasher.finalize().into())
    }

    pub fn sign(
        self,
        key: &PrivateKey,
        chain_id: &[u8; 32],
    ) -> Result<SignedTransaction, LedgerError> {
        let signature = key.sign_digest(&self.digest(chain_id)?)?;
        Ok(SignedTransaction { transaction: self, signatures: vec![hex::encode(signature)] })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub signatures: Vec<String>,
}

/// A secp256k1 private key in Hive's WIF encoding.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

impl PrivateKey {
    pub fn from_wif(wif: &str) -> Result<Self, LedgerError> {
        let data = bs58::decode(wif.trim())
            .into_vec()
            .map_err(|err| LedgerError::InvalidKey(format!("not base58: {err}")))?;
        if data.len() != 37 || data[0] != WIF_VERSION {
            return Err(LedgerError::InvalidKey("unexpected WIF length or version".into()));
        }
        let (payload, checksum) = data.split_at(33);
        if double_sha256(payload)[..4] != *checksum {
            return Err(LedgerError::InvalidKey("checksum mismatch".into()));
        }
        let key = SigningKey::from_slice(&payload[1..])
            .map_err(|err| LedgerError::InvalidKey(err.to_string()))?;
        Ok(Self { key })
    }

    pub fn to_wif(&self) -> String {
        let mut data = Vec::with_capacity(37);
        data.push(WIF_VERSION);
        data.extend_from_slice(&self.key.to_bytes());
        let checksum = double_sha256(&data);
        data.extend_from_slice(&checksum[..4]);
        bs58::encode(data).into_string()
    }

    pub fn public_key(&self) -> VerifyingKey {
        *self.key.verifying_key()
    }

    /// Produces a 65 byte compact recoverable signature accepted by the chain.
    ///
    /// The chain only accepts signatures where neither `r` nor `s` has its high bit set or a
    /// leading zero byte, so non canonical results are re-signed with fresh nonces.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 65], LedgerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|err| LedgerError::Signing(err.to_string()))?;
        let (signature, recovery_id) = match signature.normalize_s() {
            Some(normalized) => {
                (normalized, RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()))
            }
            None => (signature, recovery_id),
        };
        if let Some(compact) = canonical_compact(&signature, recovery_id) {
            return Ok(compact);
        }

        let verifying_key = self.public_key();
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_SIGNING_ATTEMPTS {
            let signature: Signature = self
                .key
                .sign_prehash_with_rng(&mut rng, digest)
                .map_err(|err| LedgerError::Signing(err.to_string()))?;
            let signature = signature.normalize_s().unwrap_or(signature);
            let recovery_id =
                RecoveryId::trial_recovery_from_prehash(&verifying_key, digest, &signature)
                    .map_err(|err| LedgerError::Signing(err.to_string()))?;
            if let Some(compact) = canonical_compact(&signature, recovery_id) {
                return Ok(compact);
            }
        }

        Err(LedgerError::Signing(format!(
            "no canonical signature after {MAX_SIGNING_ATTEMPTS} attempts"
        )))
    }
}

impl FromStr for PrivateKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wif(s)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

fn is_canonical(sig: &[u8]) -> bool {
    sig[0] & 0x80 == 0
        && !(sig[0] == 0 && sig[1] & 0x80 == 0)
        && sig[32] & 0x80 == 0
        && !(sig[32] == 0 && sig[33] & 0x80 == 0)
}

fn canonical_compact(signature: &Signature, recovery_id: RecoveryId) -> Option<[u8; 65]> {
    let bytes = signature.to_bytes();
    if !is_canonical(&bytes) {
        return None;
    }
    let mut compact = [0u8; 65];
    // 27 + 4 marks a compressed public key
    compact[0] = recovery_id.to_byte() + 31;
    compact[1..].copy_from_slice(&bytes);
    Some(compact)
}
