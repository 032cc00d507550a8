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

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::LedgerError;

/// Native Hive assets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    Hive,
    Hbd,
    Vests,
}

impl Symbol {
    /// Number of decimals the chain stores for this asset.
    pub fn precision(self) -> u32 {
        match self {
            Symbol::Hive | Symbol::Hbd => 3,
            Symbol::Vests => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Symbol::Hive => "HIVE",
            Symbol::Hbd => "HBD",
            Symbol::Vests => "VESTS",
        }
    }

    /// Symbol name used by the binary serialization, which kept the pre-fork names.
    pub(crate) fn wire_name(self) -> &'static [u8] {
        match self {
            Symbol::Hive => b"STEEM",
            Symbol::Hbd => b"SBD",
            Symbol::Vests => b"VESTS",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Symbol {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIVE" | "STEEM" => Ok(Symbol::Hive),
            "HBD" | "SBD" => Ok(Symbol::Hbd),
            "VESTS" => Ok(Symbol::Vests),
            other => Err(LedgerError::InvalidAsset(format!("unknown symbol {other}"))),
        }
    }
}

/// An amount of a native asset, always carrying the symbol's precision (e.g. `1.000 HBD`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Asset {
    amount: Decimal,
    symbol: Symbol,
}

impl Asset {
    pub fn new(amount: Decimal, symbol: Symbol) -> Result<Self, LedgerError> {
        let precision = symbol.precision();
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(LedgerError::InvalidAsset(format!("negative amount {amount} {symbol}")));
        }
        if amount.normalize().scale() > precision {
            return Err(LedgerError::InvalidAsset(format!(
                "{amount} has more than {precision} decimals for {symbol}"
            )));
        }

        let mut amount = amount.abs();
        amount.rescale(precision);
        Ok(Self { amount, symbol })
    }

    pub fn zero(symbol: Symbol) -> Self {
        let mut amount = Decimal::ZERO;
        amount.rescale(symbol.precision());
        Self { amount, symbol }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Amount in the smallest unit of the asset.
    pub(crate) fn satoshis(&self) -> Result<i64, LedgerError> {
        i64::try_from(self.amount.mantissa())
            .map_err(|_| LedgerError::InvalidAsset(format!("{self} does not fit in 64 bits")))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.symbol)
    }
}

impl FromStr for Asset {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, symbol) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| LedgerError::InvalidAsset(format!("expected '<amount> <symbol>': {s}")))?;
        let amount = Decimal::from_str(amount)
            .map_err(|err| LedgerError::InvalidAsset(format!("bad amount in {s}: {err}")))?;
        Asset::new(amount, symbol.trim().parse()?)
    }
}

impl Serialize for Asset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Asset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
