//! Record types returned by the stamp and SRC20 indexers

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use stampline_core::Record;

/// Named categorical fields an allow-list can match against.
pub trait Fields {
    const FIELDS: &'static [&'static str];

    fn field(&self, name: &str) -> Option<&str>;
}

/// Holder of an SRC20 ticker (`holdersByTick`).
///
/// `tick` is not part of the response; it is filled in from the work item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HolderBalance {
    #[serde(default)]
    pub tick: String,
    pub address: String,
    #[serde(deserialize_with = "string_or_number")]
    pub balance: String,
    #[serde(rename = "blockHeight", deserialize_with = "u64_lenient")]
    pub block_height: u64,
}

impl Record for HolderBalance {
    type Key = (String, String);

    fn key(&self) -> Self::Key {
        (self.tick.clone(), self.address.clone())
    }
}

impl Fields for HolderBalance {
    const FIELDS: &'static [&'static str] = &["tick", "address"];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "tick" => Some(&self.tick),
            "address" => Some(&self.address),
            _ => None,
        }
    }
}

/// Holder of a stamp asset (`/stamps/{id}` → `data.holders`).
///
/// `stamp` comes from the work item, so the same wallet holding several
/// stamps of a collection yields one row per stamp.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StampHolder {
    #[serde(default)]
    pub stamp: String,
    pub address: String,
}

impl Record for StampHolder {
    type Key = (String, String);

    fn key(&self) -> Self::Key {
        (self.stamp.clone(), self.address.clone())
    }
}

impl Fields for StampHolder {
    const FIELDS: &'static [&'static str] = &["stamp", "address"];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "stamp" => Some(&self.stamp),
            "address" => Some(&self.address),
            _ => None,
        }
    }
}

/// SRC20 balance entry of a wallet (`/src20/balance/{address}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenBalance {
    pub address: String,
    pub tick: String,
    #[serde(deserialize_with = "string_or_number")]
    pub amt: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub block_time: String,
}

impl Record for TokenBalance {
    type Key = (String, String);

    fn key(&self) -> Self::Key {
        (self.address.clone(), self.tick.to_lowercase())
    }
}

impl Fields for TokenBalance {
    const FIELDS: &'static [&'static str] = &["tick", "address"];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "tick" => Some(&self.tick),
            "address" => Some(&self.address),
            _ => None,
        }
    }
}

/// One SRC20 action (deploy, mint, transfer) of a ticker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickAction {
    pub tx_hash: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub creator: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub destination: String,
    pub tick: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub amt: String,
}

impl Record for TickAction {
    type Key = String;

    fn key(&self) -> String {
        self.tx_hash.clone()
    }
}

impl Fields for TickAction {
    const FIELDS: &'static [&'static str] = &["tick", "creator", "destination"];

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "tick" => Some(&self.tick),
            "creator" => Some(&self.creator),
            "destination" => Some(&self.destination),
            _ => None,
        }
    }
}

/// Indexers send amounts as strings or bare numbers; null becomes empty.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn u64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| de::Error::custom(format!("not a block height: {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("not a block height: {s}"))),
        other => Err(de::Error::custom(format!(
            "expected block height, got {other}"
        ))),
    }
}
