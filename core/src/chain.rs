use crate::rpc_clients::{BundlerClient, transport::SharedClientTransportBuilder};
use alloy::{
    providers::{ProviderBuilder, RootProvider},
    rpc::client::RpcClient,
    transports::http::reqwest::{ClientBuilder as HttpClientBuilder, Url, header::HeaderMap},
};

use crate::error::FlowError;

/// Networks on which a wallet is expected to execute `wallet_sendCalls` atomically.
pub const SUPPORTED_ATOMIC_NETWORKS: &[(u64, &str)] = &[
    (0x1, "Ethereum Mainnet"),
    (0xaa36a7, "Ethereum Sepolia"),
    (0x64, "Gnosis Mainnet"),
    (0x27d8, "Gnosis Chiado"),
    (0x38, "BNB Smart Chain"),
];

const KNOWN_NETWORKS: &[(u64, &str)] = &[
    (0x1, "Ethereum Mainnet"),
    (0x3, "Ropsten Testnet"),
    (0x4, "Rinkeby Testnet"),
    (0x5, "Goerli Testnet"),
    (0xaa36a7, "Sepolia Testnet"),
    (0x38, "BNB Smart Chain"),
    (0x64, "Gnosis Mainnet"),
    (0x27d8, "Gnosis Chiado"),
    (0x89, "Polygon Mainnet"),
    (0xa86a, "Avalanche Mainnet"),
    (0x14a34, "Base Sepolia"),
];

pub fn is_atomic_supported_network(chain_id: u64) -> bool {
    SUPPORTED_ATOMIC_NETWORKS
        .iter()
        .any(|(id, _)| *id == chain_id)
}

pub fn supported_atomic_network_names() -> Vec<String> {
    SUPPORTED_ATOMIC_NETWORKS
        .iter()
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Human readable network name, falling back to the raw id.
pub fn network_name(chain_id: u64) -> String {
    known_network_name(chain_id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Chain ID: {}", format_chain_id(chain_id)))
}

pub fn known_network_name(chain_id: u64) -> Option<&'static str> {
    KNOWN_NETWORKS
        .iter()
        .find(|(id, _)| *id == chain_id)
        .map(|(_, name)| *name)
}

/// Formats a chain id the way wallets report it (`0xaa36a7`).
pub fn format_chain_id(chain_id: u64) -> String {
    format!("{chain_id:#x}")
}

/// Parses a chain id given either as `0x` hex or as a decimal string.
pub fn parse_chain_id(value: &str) -> Result<u64, FlowError> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };

    parsed.map_err(|e| FlowError::ValidationError {
        message: format!("Invalid chain id `{value}`: {e}"),
    })
}

/// The node and bundler endpoints of one chain.
pub trait Chain: Send + Sync {
    fn chain_id(&self) -> u64;
    fn rpc_url(&self) -> Url;
    fn bundler_url(&self) -> Url;

    fn provider(&self) -> &RootProvider;
    fn bundler_client(&self) -> &BundlerClient;
}

pub struct NodeChainConfig<'a> {
    pub chain_id: u64,
    pub rpc_url: &'a str,
    pub bundler_url: &'a str,
    pub bundler_headers: HeaderMap,
}

#[derive(Clone)]
pub struct NodeChain {
    chain_id: u64,
    rpc_url: Url,
    bundler_url: Url,

    pub bundler_client: BundlerClient,
    pub provider: RootProvider,
}

impl Chain for NodeChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn rpc_url(&self) -> Url {
        self.rpc_url.clone()
    }

    fn bundler_url(&self) -> Url {
        self.bundler_url.clone()
    }

    fn provider(&self) -> &RootProvider {
        &self.provider
    }

    fn bundler_client(&self) -> &BundlerClient {
        &self.bundler_client
    }
}

impl NodeChain {
    /// Assembles a chain from already-built clients.
    pub fn from_parts(
        chain_id: u64,
        rpc_url: Url,
        bundler_url: Url,
        provider: RootProvider,
        bundler_client: BundlerClient,
    ) -> Self {
        Self {
            chain_id,
            rpc_url,
            bundler_url,
            bundler_client,
            provider,
        }
    }
}

impl NodeChainConfig<'_> {
    pub fn to_chain(&self) -> Result<NodeChain, FlowError> {
        let rpc_url = Url::parse(self.rpc_url).map_err(|e| FlowError::RpcConfigError {
            message: format!("Failed to parse RPC URL: {e}"),
        })?;

        let bundler_url = Url::parse(self.bundler_url).map_err(|e| FlowError::RpcConfigError {
            message: format!("Failed to parse Bundler URL: {e}"),
        })?;

        let reqwest_client =
            HttpClientBuilder::new()
                .build()
                .map_err(|e| FlowError::RpcConfigError {
                    message: format!("Failed to build HTTP client: {e}"),
                })?;

        let transport_builder = SharedClientTransportBuilder::new(reqwest_client);
        let bundler_transport =
            transport_builder.with_headers(bundler_url.clone(), self.bundler_headers.clone());
        let bundler_rpc_client = RpcClient::builder().transport(bundler_transport, false);

        Ok(NodeChain {
            chain_id: self.chain_id,
            rpc_url: rpc_url.clone(),
            bundler_url,
            bundler_client: BundlerClient::from_rpc_client(bundler_rpc_client),
            provider: ProviderBuilder::new()
                .disable_recommended_fillers()
                .connect_http(rpc_url),
        })
    }
}
