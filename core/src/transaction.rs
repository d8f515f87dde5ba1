use std::sync::LazyLock;

use alloy::{
    primitives::{Address, Bytes, U256, utils::parse_ether},
    sol,
    sol_types::SolCall,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{constants::SEND_CALLS_VERSION, error::FlowError};

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap());

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Checks a user-entered recipient and parses it.
///
/// Only the `0x`-prefixed 40 hex digit form is accepted, mixed case allowed.
pub fn validate_recipient(recipient: &str) -> Result<Address, FlowError> {
    if !ADDRESS_RE.is_match(recipient) {
        return Err(FlowError::InvalidRecipient {
            index: None,
            recipient: recipient.to_string(),
        });
    }

    recipient
        .parse::<Address>()
        .map_err(|_| FlowError::InvalidRecipient {
            index: None,
            recipient: recipient.to_string(),
        })
}

/// Parses a decimal ether amount (`"0.01"`) into wei.
pub fn parse_ether_amount(amount: &str) -> Result<U256, FlowError> {
    parse_ether(amount.trim()).map_err(|e| FlowError::InvalidAmount {
        value: amount.to_string(),
        message: e.to_string(),
    })
}

/// A call as entered by the user, recipient still unvalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub to: String,
    #[serde(default)]
    pub value: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

impl CallRequest {
    pub fn new(to: impl Into<String>, value: U256) -> Self {
        Self {
            to: to.into(),
            value,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = Some(data);
        self
    }

    pub fn validate(&self) -> Result<Call, FlowError> {
        Ok(Call {
            to: validate_recipient(&self.to)?,
            value: self.value,
            data: self.data.clone(),
        })
    }
}

/// One call of an EIP-5792 batch or of a smart-account `executeBatch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
}

impl Call {
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            data: None,
        }
    }

    /// A call whose data is the ABI encoding of `call`.
    pub fn contract_call<C: SolCall>(to: Address, call: &C, value: U256) -> Self {
        Self {
            to,
            value,
            data: Some(call.abi_encode().into()),
        }
    }

    pub fn erc20_transfer(token: Address, to: Address, amount: U256) -> Self {
        Self::contract_call(token, &IERC20::transferCall { to, amount }, U256::ZERO)
    }

    pub fn erc20_approve(token: Address, spender: Address, amount: U256) -> Self {
        Self::contract_call(token, &IERC20::approveCall { spender, amount }, U256::ZERO)
    }

    pub fn data_or_empty(&self) -> Bytes {
        self.data.clone().unwrap_or_default()
    }
}

impl From<Call> for CallRequest {
    fn from(call: Call) -> Self {
        Self {
            to: call.to.to_checksum(None),
            value: call.value,
            data: call.data,
        }
    }
}

/// An ordered set of calls to be submitted together.
///
/// Consumed by the submitter, never reused afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub calls: Vec<CallRequest>,
    pub version: String,
    pub atomic_required: bool,
}

impl Batch {
    pub fn new(calls: Vec<CallRequest>) -> Self {
        Self {
            calls,
            version: SEND_CALLS_VERSION.to_string(),
            atomic_required: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Validates every recipient, reporting the first offending index.
    pub fn validated_calls(&self) -> Result<Vec<Call>, FlowError> {
        self.calls
            .iter()
            .enumerate()
            .map(|(index, call)| {
                call.validate().map_err(|e| match e {
                    FlowError::InvalidRecipient { recipient, .. } => FlowError::InvalidRecipient {
                        index: Some(index),
                        recipient,
                    },
                    other => other,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn recipient_must_match_prefixed_hex_form() {
        let ok = validate_recipient("0x52908400098527886E0F7030069857D2E4169EE7").unwrap();
        assert_eq!(ok, address!("0x52908400098527886E0F7030069857D2E4169EE7"));

        for bad in [
            "52908400098527886E0F7030069857D2E4169EE7",
            "0x52908400098527886E0F7030069857D2E4169EE",
            "0x52908400098527886E0F7030069857D2E4169EE77",
            "0x52908400098527886E0F7030069857D2E4169EEG",
            " 0x52908400098527886E0F7030069857D2E4169EE7",
            "",
        ] {
            assert!(
                matches!(
                    validate_recipient(bad),
                    Err(FlowError::InvalidRecipient { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn batch_validation_reports_offending_index() {
        let batch = Batch::new(vec![
            CallRequest::new("0x0000000000000000000000000000000000000001", U256::from(1)),
            CallRequest::new("0xnothex", U256::from(2)),
        ]);

        let err = batch.validated_calls().unwrap_err();
        assert_eq!(
            err,
            FlowError::InvalidRecipient {
                index: Some(1),
                recipient: "0xnothex".to_string(),
            }
        );
    }

    #[test]
    fn calls_serialize_in_wallet_shape() {
        let call = Call::transfer(
            address!("0x0000000000000000000000000000000000000001"),
            parse_ether_amount("0.01").unwrap(),
        );
        let json = serde_json::to_value(&call).unwrap();

        assert_eq!(json["to"], "0x0000000000000000000000000000000000000001");
        assert_eq!(json["value"], "0x2386f26fc10000");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn erc20_transfer_encodes_selector() {
        let call = Call::erc20_transfer(
            address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            address!("0x0000000000000000000000000000000000000002"),
            U256::from(1_000_000u64),
        );
        let data = call.data.unwrap();

        assert_eq!(&data[..4], &IERC20::transferCall::SELECTOR);
        assert_eq!(data.len(), 4 + 32 * 2);
    }

    #[test]
    fn ether_amount_rejects_garbage() {
        assert_eq!(
            parse_ether_amount("0.02").unwrap(),
            U256::from(20_000_000_000_000_000u64)
        );
        assert!(matches!(
            parse_ether_amount("two"),
            Err(FlowError::InvalidAmount { .. })
        ));
    }
}
