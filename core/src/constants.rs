use alloy::primitives::{Address, address};

pub const ENTRYPOINT_ADDRESS_V0_7: Address =
    address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

pub const DEFAULT_FACTORY_ADDRESS_V0_7: Address =
    address!("0x4bE0ddfebcA9A5A4a617dee4DeCe99E7c862dceb");

pub const DEFAULT_IMPLEMENTATION_ADDRESS_V0_7: Address =
    address!("0x94eC38a5d2EDA5A543Ab4c08D998338D4082beb2");

/// Circle Paymaster (entrypoint v0.7) on Base Sepolia.
pub const CIRCLE_PAYMASTER_BASE_SEPOLIA: Address =
    address!("0x31BE08D380A21fc740883c0BC434FcFc88740b58");

pub const USDC_BASE_SEPOLIA: Address = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");

/// Predeployed WETH on OP-stack chains.
pub const WETH_OP_STACK: Address = address!("0x4200000000000000000000000000000000000006");

pub const UNISWAP_V3_ROUTER_BASE_SEPOLIA: Address =
    address!("0x2626664c2603336E57B271c5C0b26F421741e481");

pub const UNISWAP_V3_FACTORY_BASE_SEPOLIA: Address =
    address!("0x4752ba5DBc23f44D87826276BF6Fd6b1C372aD24");

pub const UNISWAP_V3_QUOTER_V2_BASE_SEPOLIA: Address =
    address!("0xC5290058841028F1614F3A6F0F5816cAd0df5E27");

pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;

/// Upper bound, in token base units, the paymaster may charge for gas.
pub const DEFAULT_MAX_GAS_IN_TOKEN: u64 = 1_000_000;

pub const CHAIN_METADATA_URL: &str = "https://chainid.network/chains.json";

/// EIP-5792 request version sent with `wallet_sendCalls`.
pub const SEND_CALLS_VERSION: &str = "2.0.0";
