use alloy::{
    primitives::Address,
    transports::{
        RpcError as AlloyRpcError, TransportErrorKind, http::reqwest::header::InvalidHeaderValue,
    },
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::Chain;

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    /// Server returned an error response.
    #[error("server returned an error response: {0}")]
    ErrorResp(RpcErrorResponse),

    /// Server returned a null response when a non-null response was expected.
    #[error("server returned a null response when a non-null response was expected")]
    NullResp,

    /// Rpc server returned an unsupported feature.
    #[error("unsupported feature: {message}")]
    UnsupportedFeature { message: String },

    /// A local pre-processing step failed.
    #[error("local usage error: {message}")]
    InternalError { message: String },

    /// JSON serialization error.
    #[error("serialization error: {message}")]
    SerError { message: String },

    /// JSON deserialization error.
    #[error("deserialization error: {message}, text: {text}")]
    DeserError {
        message: String,
        /// The text that failed to deserialize.
        text: String,
    },

    #[error("HTTP error {status}")]
    TransportHttpError { status: u16, body: String },

    #[error("Other transport error: {message}")]
    OtherTransportError { message: String },
}

impl RpcErrorKind {
    /// The JSON-RPC error payload, when the endpoint answered with one.
    pub fn error_response(&self) -> Option<&RpcErrorResponse> {
        match self {
            RpcErrorKind::ErrorResp(resp) => Some(resp),
            _ => None,
        }
    }

    /// Failures where the endpoint never produced a usable answer.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RpcErrorKind::NullResp
                | RpcErrorKind::DeserError { .. }
                | RpcErrorKind::TransportHttpError { .. }
                | RpcErrorKind::OtherTransportError { .. }
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RpcErrorResponse {
    /// The error code.
    pub code: i64,
    /// The error message (if any).
    pub message: String,
    /// The error data (if any).
    pub data: Option<String>,
}

impl std::fmt::Display for RpcErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, ", data: {data}")?;
        }
        Ok(())
    }
}

/// A serializable contract interaction error type
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractInteractionErrorKind {
    #[error("unknown function: function {function_name} does not exist")]
    UnknownFunction {
        #[serde(rename = "functionName")]
        function_name: String,
    },

    #[error("unknown function: function with selector {function_selector} does not exist")]
    UnknownSelector {
        #[serde(rename = "functionSelector")]
        function_selector: String,
    },

    #[error(
        "contract call to `{function}` returned no data (\"0x\"); the called address might not be a contract"
    )]
    ZeroData { function: String, message: String },

    #[error("ABI error: {message}")]
    AbiError { message: String },

    #[error("transport error: {message}")]
    TransportError { message: String },

    #[error("contract error: {message}")]
    Other { message: String },
}

/// Every failure a wallet, bundler, node or metadata round-trip can end in.
///
/// Errors are caught at the initiating command and rendered as a status line,
/// so each variant carries enough context to be shown as-is.
#[derive(Error, Debug, Serialize, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum FlowError {
    #[error("Connection rejected: {message}")]
    ConnectionRejected { message: String },

    #[error("No wallet connected")]
    NotConnected,

    #[error("Invalid recipient address{}: {recipient}", index.map(|i| format!(" at call {i}")).unwrap_or_default())]
    #[serde(rename_all = "camelCase")]
    InvalidRecipient {
        index: Option<usize>,
        recipient: String,
    },

    #[error("Invalid amount `{value}`: {message}")]
    InvalidAmount { value: String, message: String },

    #[error("Cannot submit an empty batch")]
    EmptyBatch,

    #[error("Atomic batches are not supported on {network}")]
    #[serde(rename_all = "camelCase")]
    NetworkUnsupported {
        chain_id: u64,
        network: String,
        supported: Vec<String>,
    },

    #[error("Wallet does not support {method}: {message}")]
    UnsupportedMethod { method: String, message: String },

    #[error("Account upgrade required: {message}")]
    AccountUpgradeRequired { message: String },

    #[error("Batch submission failed: {message}")]
    SubmissionFailed { message: String },

    #[error("No pool for {token_in} -> {token_out} at fee tier {fee}")]
    #[serde(rename_all = "camelCase")]
    PoolNotFound {
        token_in: Address,
        token_out: Address,
        fee: u32,
    },

    #[error("Swap failed: {message}")]
    SwapFailed { message: String },

    #[error("{asset} balance of {address} is zero")]
    InsufficientBalance { asset: String, address: Address },

    #[error("RPC error on chain {chain_id} at {rpc_url}: {message}")]
    #[serde(rename_all = "camelCase")]
    RpcError {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Wallet RPC error during {method}: {message}")]
    WalletRpcError {
        method: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Bundler error on chain {chain_id} at {rpc_url}: {message}")]
    #[serde(rename_all = "camelCase")]
    BundlerError {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Paymaster error: {message}")]
    PaymasterError { message: String },

    #[error("User operation {user_op_hash} has no receipt after {attempts} attempts")]
    #[serde(rename_all = "camelCase")]
    UserOpReceiptTimeout { user_op_hash: String, attempts: u32 },

    #[error("Status polling of batch {batch_id} was cancelled")]
    #[serde(rename_all = "camelCase")]
    PollCancelled { batch_id: String },

    #[error("Contract interaction error: {message}")]
    #[serde(rename_all = "camelCase")]
    ContractInteractionError {
        contract_address: Option<Address>,
        chain_id: u64,
        message: String,
        kind: ContractInteractionErrorKind,
    },

    #[error("Signing error: {message}")]
    SigningError { message: String },

    #[error("Chain metadata error: {message}")]
    MetadataError { message: String },

    #[error("Bad RPC configuration: {message}")]
    RpcConfigError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl From<InvalidHeaderValue> for FlowError {
    fn from(err: InvalidHeaderValue) -> Self {
        FlowError::RpcConfigError {
            message: format!("Invalid header value: {err}"),
        }
    }
}

impl From<alloy::signers::Error> for FlowError {
    fn from(err: alloy::signers::Error) -> Self {
        FlowError::SigningError {
            message: err.to_string(),
        }
    }
}

pub trait AlloyRpcErrorToFlowError {
    fn to_flow_error(&self, chain: &impl Chain) -> FlowError;
    fn to_flow_bundler_error(&self, chain: &impl Chain) -> FlowError;
    fn to_flow_wallet_error(&self, method: &str) -> FlowError;
}

pub fn to_rpc_error_kind(err: &AlloyRpcError<TransportErrorKind>) -> RpcErrorKind {
    match err {
        AlloyRpcError::ErrorResp(err) => RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: err.code,
            message: err.message.to_string(),
            data: err.data.as_ref().map(|data| data.to_string()),
        }),
        AlloyRpcError::NullResp => RpcErrorKind::NullResp,
        AlloyRpcError::UnsupportedFeature(feature) => RpcErrorKind::UnsupportedFeature {
            message: feature.to_string(),
        },
        AlloyRpcError::LocalUsageError(err) => RpcErrorKind::InternalError {
            message: err.to_string(),
        },
        AlloyRpcError::SerError(err) => RpcErrorKind::SerError {
            message: err.to_string(),
        },
        AlloyRpcError::DeserError { err, text } => RpcErrorKind::DeserError {
            message: err.to_string(),
            text: text.to_string(),
        },
        AlloyRpcError::Transport(err) => match err {
            TransportErrorKind::HttpError(err) => RpcErrorKind::TransportHttpError {
                status: err.status,
                body: err.body.to_string(),
            },
            _ => RpcErrorKind::OtherTransportError {
                message: err.to_string(),
            },
        },
    }
}

impl AlloyRpcErrorToFlowError for AlloyRpcError<TransportErrorKind> {
    fn to_flow_error(&self, chain: &impl Chain) -> FlowError {
        FlowError::RpcError {
            chain_id: chain.chain_id(),
            rpc_url: chain.rpc_url().to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }

    fn to_flow_bundler_error(&self, chain: &impl Chain) -> FlowError {
        FlowError::BundlerError {
            chain_id: chain.chain_id(),
            rpc_url: chain.bundler_url().to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }

    fn to_flow_wallet_error(&self, method: &str) -> FlowError {
        FlowError::WalletRpcError {
            method: method.to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }
}

pub trait ContractErrorToFlowError {
    fn to_flow_error(self, chain_id: u64, contract_address: Option<Address>) -> FlowError;
}

impl ContractErrorToFlowError for alloy::contract::Error {
    fn to_flow_error(self, chain_id: u64, contract_address: Option<Address>) -> FlowError {
        let (message, kind) = match self {
            alloy::contract::Error::UnknownFunction(name) => (
                format!("Unknown function: {name}"),
                ContractInteractionErrorKind::UnknownFunction {
                    function_name: name,
                },
            ),
            alloy::contract::Error::UnknownSelector(selector) => (
                format!("Unknown selector: {selector}"),
                ContractInteractionErrorKind::UnknownSelector {
                    function_selector: selector.to_string(),
                },
            ),
            alloy::contract::Error::ZeroData(function, err) => (
                format!("Zero data returned from contract call to {function}"),
                ContractInteractionErrorKind::ZeroData {
                    function,
                    message: err.to_string(),
                },
            ),
            alloy::contract::Error::AbiError(err) => (
                format!("ABI error: {err}"),
                ContractInteractionErrorKind::AbiError {
                    message: err.to_string(),
                },
            ),
            alloy::contract::Error::TransportError(err) => (
                format!("Transport error: {err}"),
                ContractInteractionErrorKind::TransportError {
                    message: err.to_string(),
                },
            ),
            other => (
                other.to_string(),
                ContractInteractionErrorKind::Other {
                    message: other.to_string(),
                },
            ),
        };

        FlowError::ContractInteractionError {
            contract_address,
            chain_id,
            message,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_error_serializes_with_type_tag() {
        let err = FlowError::NetworkUnsupported {
            chain_id: 10,
            network: "Chain ID: 10".to_string(),
            supported: vec!["Ethereum Mainnet".to_string()],
        };

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "NETWORK_UNSUPPORTED");
        assert_eq!(json["chainId"], 10);
        assert_eq!(
            err.to_string(),
            "Atomic batches are not supported on Chain ID: 10"
        );
    }

    #[test]
    fn invalid_recipient_message_includes_index() {
        let err = FlowError::InvalidRecipient {
            index: Some(2),
            recipient: "0x123".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid recipient address at call 2: 0x123");

        let err = FlowError::InvalidRecipient {
            index: None,
            recipient: "nope".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid recipient address: nope");
    }

    #[test]
    fn transport_failures_are_transient() {
        let kind = to_rpc_error_kind(&TransportErrorKind::custom_str("connection reset"));
        assert!(kind.is_transient());

        let kind = RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: 4200,
            message: "Unsupported Method".to_string(),
            data: None,
        });
        assert!(!kind.is_transient());
        assert_eq!(kind.error_response().map(|r| r.code), Some(4200));
    }
}
