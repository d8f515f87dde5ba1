//! Block explorer lookup from public chain metadata.

use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy::primitives::Bytes;
use batchwire_core::{constants::CHAIN_METADATA_URL, error::FlowError};
use reqwest::Url;
use serde::Deserialize;

/// Where explorer base URLs come from.
pub trait ChainMetadataSource: Send + Sync + 'static {
    fn explorer_base_url(
        &self,
        chain_id: u64,
    ) -> impl Future<Output = Result<Option<String>, FlowError>> + Send;
}

/// `{base}/tx/{hash}`, tolerant of a trailing slash on `base`.
pub fn explorer_tx_url(base: &str, transaction_hash: &Bytes) -> String {
    format!("{}/tx/{transaction_hash}", base.trim_end_matches('/'))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainRecord {
    chain_id: u64,
    #[serde(default)]
    explorers: Vec<ExplorerRecord>,
}

#[derive(Debug, Deserialize)]
struct ExplorerRecord {
    url: String,
}

type ExplorerIndex = Arc<HashMap<u64, String>>;

/// First explorer of each chain in a `chains.json` document.
fn index_explorers(records: Vec<ChainRecord>) -> HashMap<u64, String> {
    records
        .into_iter()
        .filter_map(|record| {
            record
                .explorers
                .into_iter()
                .next()
                .map(|explorer| (record.chain_id, explorer.url))
        })
        .collect()
}

pub struct HttpChainMetadataBuilder {
    url: String,
    cache_ttl: Duration,
}

impl Default for HttpChainMetadataBuilder {
    fn default() -> Self {
        Self {
            url: CHAIN_METADATA_URL.to_string(),
            cache_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl HttpChainMetadataBuilder {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn build(self) -> Result<HttpChainMetadata, FlowError> {
        let url = Url::parse(&self.url).map_err(|e| FlowError::MetadataError {
            message: format!("Invalid chain metadata URL {}: {e}", self.url),
        })?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FlowError::MetadataError {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        let cache = moka::future::Cache::builder()
            .max_capacity(1)
            .time_to_live(self.cache_ttl)
            .build();

        Ok(HttpChainMetadata { url, client, cache })
    }
}

/// Downloads the chain list once per TTL and answers lookups from it.
#[derive(Clone)]
pub struct HttpChainMetadata {
    url: Url,
    client: reqwest::Client,
    cache: moka::future::Cache<Url, ExplorerIndex>,
}

impl HttpChainMetadata {
    pub fn builder() -> HttpChainMetadataBuilder {
        HttpChainMetadataBuilder::default()
    }

    async fn fetch_index(&self) -> Result<ExplorerIndex, FlowError> {
        tracing::debug!(url = %self.url, "fetching chain metadata");

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| FlowError::MetadataError {
                message: e.to_string(),
            })?;

        let records: Vec<ChainRecord> =
            response.json().await.map_err(|e| FlowError::MetadataError {
                message: format!("Malformed chain list: {e}"),
            })?;

        Ok(Arc::new(index_explorers(records)))
    }
}

impl ChainMetadataSource for HttpChainMetadata {
    async fn explorer_base_url(&self, chain_id: u64) -> Result<Option<String>, FlowError> {
        let index = self
            .cache
            .try_get_with(self.url.clone(), self.fetch_index())
            .await
            .map_err(|e: Arc<FlowError>| e.as_ref().clone())?;

        Ok(index.get(&chain_id).cloned())
    }
}

/// Fixed explorer table.
#[derive(Debug, Clone, Default)]
pub struct StaticChainMetadata {
    explorers: HashMap<u64, String>,
}

impl StaticChainMetadata {
    pub fn new(explorers: impl IntoIterator<Item = (u64, String)>) -> Self {
        Self {
            explorers: explorers.into_iter().collect(),
        }
    }
}

impl ChainMetadataSource for StaticChainMetadata {
    async fn explorer_base_url(&self, chain_id: u64) -> Result<Option<String>, FlowError> {
        Ok(self.explorers.get(&chain_id).cloned())
    }
}

/// Explorer link for a confirmed transaction; lookup failures only cost the link.
pub async fn resolve_explorer_url<M: ChainMetadataSource>(
    metadata: &M,
    chain_id: u64,
    transaction_hash: &Bytes,
) -> Option<String> {
    match metadata.explorer_base_url(chain_id).await {
        Ok(Some(base)) => Some(explorer_tx_url(&base, transaction_hash)),
        Ok(None) => {
            tracing::debug!(chain_id, "no explorer known for chain");
            None
        }
        Err(e) => {
            tracing::warn!(chain_id, error = %e, "chain metadata unavailable");
            None
        }
    }
}
