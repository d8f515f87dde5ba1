//! EIP-5792 request and response shapes.

use std::collections::BTreeMap;

use alloy::primitives::{Address, B256, Bytes, U64};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    chain::{format_chain_id, known_network_name, network_name, parse_chain_id},
    transaction::Call,
};

pub const STATUS_PENDING: u16 = 202;
pub const STATUS_CONFIRMED: u16 = 200;

/// The single parameter of `wallet_sendCalls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCallsRequest {
    pub version: String,
    pub from: Address,
    pub chain_id: U64,
    pub atomic_required: bool,
    /// Older wallets read the pre-2.0 spelling.
    pub force_atomic: bool,
    pub calls: Vec<Call>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCallsResult {
    pub id: String,
    #[serde(default)]
    pub capabilities: Option<serde_json::Value>,
}

/// Wallets predating EIP-5792 2.0 answer `wallet_sendCalls` with a bare id string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SendCallsResponse {
    Object(SendCallsResult),
    Id(String),
}

impl SendCallsResponse {
    pub fn into_id(self) -> String {
        match self {
            SendCallsResponse::Object(result) => result.id,
            SendCallsResponse::Id(id) => id,
        }
    }
}

/// Result of `wallet_getCallsStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallsStatus {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub chain_id: Option<U64>,
    pub status: u16,
    #[serde(default)]
    pub atomic: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub receipts: Vec<CallReceipt>,
}

impl CallsStatus {
    pub fn is_pending(&self) -> bool {
        self.status == STATUS_PENDING
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == STATUS_CONFIRMED
    }

    pub fn first_transaction_hash(&self) -> Option<&Bytes> {
        self.receipts.first().map(|r| &r.transaction_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReceipt {
    /// Kept as raw bytes: some wallets report shortened hashes.
    pub transaction_hash: Bytes,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub gas_used: Option<U64>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub logs: Vec<serde_json::Value>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomicStatus {
    Supported,
    Ready,
    Unsupported,
    #[serde(other)]
    Unknown,
}

impl AtomicStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, AtomicStatus::Supported | AtomicStatus::Ready)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicCapability {
    pub status: AtomicStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atomic: Option<AtomicCapability>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// Per-chain capability map returned by `wallet_getCapabilities`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    chains: BTreeMap<u64, ChainCapabilities>,
}

impl Capabilities {
    pub fn from_chains(chains: impl IntoIterator<Item = (u64, ChainCapabilities)>) -> Self {
        Self {
            chains: chains.into_iter().collect(),
        }
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainCapabilities> {
        self.chains.get(&chain_id)
    }

    pub fn chains(&self) -> impl Iterator<Item = (&u64, &ChainCapabilities)> {
        self.chains.iter()
    }

    /// True only when the chain reports `atomic` as `supported` or `ready`.
    pub fn supports_atomic(&self, chain_id: u64) -> bool {
        self.chain(chain_id)
            .and_then(|caps| caps.atomic.as_ref())
            .is_some_and(|atomic| atomic.status.is_usable())
    }

    /// One line per reported chain, as shown to the user.
    pub fn describe(&self) -> Vec<String> {
        self.chains
            .iter()
            .map(|(chain_id, caps)| {
                let atomic = match caps.atomic.as_ref().map(|a| a.status) {
                    Some(AtomicStatus::Supported) => "atomic batching supported",
                    Some(AtomicStatus::Ready) => "atomic batching ready (account upgrade on use)",
                    Some(AtomicStatus::Unsupported) => "atomic batching unsupported",
                    Some(AtomicStatus::Unknown) => "atomic batching status unknown",
                    None => "no atomic capability reported",
                };
                match known_network_name(*chain_id) {
                    Some(name) => format!("{name} ({}): {atomic}", format_chain_id(*chain_id)),
                    None => format!("{}: {atomic}", network_name(*chain_id)),
                }
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for Capabilities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, ChainCapabilities>::deserialize(deserializer)?;
        let chains = raw
            .into_iter()
            .map(|(key, caps)| {
                parse_chain_id(&key)
                    .map(|chain_id| (chain_id, caps))
                    .map_err(serde::de::Error::custom)
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { chains })
    }
}

impl Serialize for Capabilities {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.chains
                .iter()
                .map(|(chain_id, caps)| (format_chain_id(*chain_id), caps)),
        )
    }
}
