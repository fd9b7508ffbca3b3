use std::{fmt, str::FromStr};

use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::{Map, Value};

/// Identifies one smart contract on one network.
///
/// The key is used as the store key for per-topic progress and, through its [`Display`] form
/// `"<network_id>.<address>"`, as the publish/subscribe filter. It travels on the wire in that
/// same string form.
///
/// [`Display`]: fmt::Display
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicKey {
    pub network_id: String,
    pub address: Address,
}

impl TopicKey {
    #[must_use]
    pub fn new(network_id: impl Into<String>, address: Address) -> Self {
        Self { network_id: network_id.into(), address }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.network_id, self.address)
    }
}

/// Error returned when a string is not a valid `"<network_id>.<address>"` key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid topic key {0:?}")]
pub struct InvalidTopicKey(pub String);

impl FromStr for TopicKey {
    type Err = InvalidTopicKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network_id, address) = s.rsplit_once('.').ok_or_else(|| InvalidTopicKey(s.into()))?;
        if network_id.is_empty() {
            return Err(InvalidTopicKey(s.into()));
        }
        let address = address.parse().map_err(|_| InvalidTopicKey(s.into()))?;
        Ok(Self::new(network_id, address))
    }
}

impl Serialize for TopicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TopicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// The subscriber's query over the SDS catalogue.
///
/// Every non-empty list narrows the selection; an empty filter selects every smart contract the
/// identity is allowed to read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub smartcontract_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub smartcontract_keys: Vec<String>,
}

impl TopicFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organizations.push(organization.into());
        self
    }

    #[must_use]
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.projects.push(project.into());
        self
    }

    #[must_use]
    pub fn network_id(mut self, network_id: impl Into<String>) -> Self {
        self.network_ids.push(network_id.into());
        self
    }

    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    #[must_use]
    pub fn smartcontract_name(mut self, name: impl Into<String>) -> Self {
        self.smartcontract_names.push(name.into());
        self
    }

    #[must_use]
    pub fn smartcontract_key(mut self, key: &TopicKey) -> Self {
        self.smartcontract_keys.push(key.to_string());
        self
    }

    /// Returns `true` if no list narrows the selection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.organizations.is_empty() &&
            self.projects.is_empty() &&
            self.network_ids.is_empty() &&
            self.groups.is_empty() &&
            self.smartcontract_names.is_empty() &&
            self.smartcontract_keys.is_empty()
    }
}

/// Per-topic progress, seeded at construction and handed by value to the topic's snapshot worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicState {
    /// Highest transaction timestamp persisted for the topic.
    pub last_synced_timestamp: u64,
    /// Topic string returned by resolution, e.g. `o:sds;p:game;n:1;g:token;s:gold`.
    pub topic_string: String,
}

/// A categorized smart-contract transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub network_id: String,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub txid: TxHash,
    pub tx_index: u64,
    pub tx_from: Address,
    pub tx_to: Address,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub value: f64,
}

/// A categorized smart-contract event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub network_id: String,
    pub txid: TxHash,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub log_index: u64,
    pub address: Address,
    #[serde(default, rename = "log")]
    pub name: String,
    #[serde(default)]
    pub output: Map<String, Value>,
}

/// A page of transactions and logs plus the timestamp the server attached to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub logs: Vec<Log>,
    pub block_timestamp: u64,
}

impl EventBatch {
    /// Highest block timestamp among the batch's transactions.
    #[must_use]
    pub fn max_transaction_timestamp(&self) -> Option<u64> {
        self.transactions.iter().map(|tx| tx.block_timestamp).max()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.logs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    #[test]
    fn topic_key_display_round_trips_through_from_str() {
        let key = TopicKey::new("1", address!("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"));

        let parsed: TopicKey = key.to_string().parse().unwrap();

        assert_eq!(parsed, key);
        assert!(key.to_string().starts_with("1.0x"));
    }

    #[test]
    fn topic_key_rejects_missing_network() {
        assert!("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".parse::<TopicKey>().is_err());
        assert!(".0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".parse::<TopicKey>().is_err());
        assert!("1.not-an-address".parse::<TopicKey>().is_err());
    }

    #[test]
    fn topic_key_travels_as_its_display_string() {
        let key = TopicKey::new("imx", address!("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"));

        let encoded = serde_json::to_value(&key).unwrap();
        assert_eq!(encoded, serde_json::Value::String(key.to_string()));

        let decoded: TopicKey = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, key);

        let object = serde_json::json!({ "network_id": "imx", "address": key.address });
        assert!(serde_json::from_value::<TopicKey>(object).is_err());
    }

    #[test]
    fn empty_filter_serializes_to_empty_object() {
        let filter = TopicFilter::new();

        assert!(filter.is_empty());
        assert_eq!(serde_json::to_string(&filter).unwrap(), "{}");

        let filter = filter.organization("sds").network_id("1");
        assert!(!filter.is_empty());
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            serde_json::json!({ "organizations": ["sds"], "network_ids": ["1"] })
        );
    }

    #[test]
    fn batch_max_timestamp_ignores_logs() {
        let batch = EventBatch { block_timestamp: 100, ..EventBatch::default() };
        assert_eq!(batch.max_transaction_timestamp(), None);
        assert!(batch.is_empty());
    }
}
