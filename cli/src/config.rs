use std::{collections::BTreeMap, env, path::Path, time::Duration};

use alloy::primitives::{Address, Bytes, U256};
use batchwire_aa_core::{factory::FactorySettings, paymaster::CirclePaymaster};
use batchwire_dex_core::DexAddresses;
use batchwire_executors::{atomic_batch::PollConfig, user_op::ReceiptWaitConfig};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BatchwireConfig {
    #[serde(default)]
    pub log_format: LogFormat,
    pub node: NodeConfig,
    pub bundler: BundlerConfig,
    #[serde(default)]
    pub wallets: Vec<WalletConfig>,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub receipt: ReceiptSettings,
    #[serde(default)]
    pub metadata: MetadataConfig,
    pub paymaster: PaymasterConfig,
    pub dex: DexConfig,
    #[serde(default)]
    pub account: AccountConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub chain_id: u64,
    pub rpc_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BundlerConfig {
    pub url: String,
    pub entrypoint: Address,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// A wallet endpoint announced to the provider registry.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub name: String,
    pub rdns: String,
    pub rpc_url: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_event_poll_ms")]
    pub event_poll_ms: u64,
}

fn default_event_poll_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        let defaults = PollConfig::default();
        Self {
            interval_ms: defaults.interval.as_millis() as u64,
            max_attempts: defaults.max_attempts,
        }
    }
}

impl From<&PollSettings> for PollConfig {
    fn from(settings: &PollSettings) -> Self {
        PollConfig {
            interval: Duration::from_millis(settings.interval_ms),
            max_attempts: settings.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiptSettings {
    pub retry_count: u32,
    pub polling_interval_ms: u64,
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        Self {
            retry_count: 7,
            polling_interval_ms: 2000,
        }
    }
}

impl From<&ReceiptSettings> for ReceiptWaitConfig {
    fn from(settings: &ReceiptSettings) -> Self {
        ReceiptWaitConfig {
            retry_count: settings.retry_count,
            polling_interval: Duration::from_millis(settings.polling_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub chains_url: String,
    pub cache_ttl_secs: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            chains_url: batchwire_core::constants::CHAIN_METADATA_URL.to_string(),
            cache_ttl_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymasterConfig {
    pub address: Address,
    pub token: Address,
    pub token_symbol: String,
    pub max_gas_in_token: U256,
}

impl From<&PaymasterConfig> for CirclePaymaster {
    fn from(config: &PaymasterConfig) -> Self {
        CirclePaymaster {
            address: config.address,
            token: config.token,
            token_symbol: config.token_symbol.clone(),
            max_gas_in_token: config.max_gas_in_token,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexConfig {
    pub factory: Address,
    pub quoter: Address,
    pub router: Address,
    pub weth: Address,
    pub fee: u32,
    pub default_slippage_bps: u16,
}

impl From<&DexConfig> for DexAddresses {
    fn from(config: &DexConfig) -> Self {
        DexAddresses {
            factory: config.factory,
            quoter: config.quoter,
            router: config.router,
            weth: config.weth,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub factory: Option<Address>,
    pub implementation: Option<Address>,
    pub salt: Bytes,
}

impl From<&AccountConfig> for FactorySettings {
    fn from(config: &AccountConfig) -> Self {
        let settings = match config.factory {
            Some(factory) => FactorySettings::for_factory(factory, config.implementation),
            None => FactorySettings::default(),
        };
        settings.with_salt(config.salt.clone())
    }
}

/// Layers `base.yaml`, `{APP_ENVIRONMENT}.yaml` and `APP__*` variables.
pub fn get_config(configuration_directory: &Path) -> anyhow::Result<BatchwireConfig> {
    let environment: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(anyhow::Error::msg)?;

    let environment_filename = format!("{}.yaml", environment.as_str());

    let config = Config::builder()
        .add_source(File::from(configuration_directory.join("base.yaml")))
        .add_source(
            File::from(configuration_directory.join(environment_filename)).required(false),
        )
        .add_source(config::Environment::with_prefix("app").separator("__"))
        .build()?;

    Ok(config.try_deserialize::<BatchwireConfig>()?)
}

/// The possible runtime environment for our application.
pub enum Environment {
    Local,
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{other} is not a supported environment. Use either `local`, `development`, or `production`."
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const BASE: &str = include_str!("../configuration/base.yaml");

    #[test]
    fn base_configuration_deserializes() {
        let config: BatchwireConfig = Config::builder()
            .add_source(File::from_str(BASE, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.node.chain_id, 84532);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.receipt.retry_count, 7);
        assert_eq!(PollConfig::from(&config.poll), PollConfig::default());
        assert_eq!(config.dex.fee, 3000);
        assert_eq!(
            CirclePaymaster::from(&config.paymaster),
            CirclePaymaster::default()
        );
        assert!(!config.wallets.is_empty());
        assert_eq!(FactorySettings::from(&config.account), FactorySettings::default());
    }

    #[test]
    fn account_section_selects_factory() {
        let config: AccountConfig = Config::builder()
            .add_source(File::from_str(
                "factory: \"0x0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f\"\nsalt: \"0x01\"",
                FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let settings = FactorySettings::from(&config);
        assert_eq!(settings.factory, Address::repeat_byte(0x0f));
        assert_eq!(settings.implementation, None);
        assert_eq!(settings.salt, Bytes::from_static(&[0x01]));
    }

    #[test]
    fn unknown_environment_is_rejected() {
        assert!(Environment::try_from("staging".to_string()).is_err());
        assert!(Environment::try_from("Production".to_string()).is_ok());
    }
}
