use alloy::{
    primitives::{Address, B256, Bytes, ChainId, U256, keccak256},
    rpc::types::PackedUserOperation,
    sol_types::SolValue,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserOpError {
    #[error("{field} does not fit in 128 bits")]
    GasFieldOverflow { field: String },
}

fn to_u128(value: U256, field: &str) -> Result<u128, UserOpError> {
    value.try_into().map_err(|_| UserOpError::GasFieldOverflow {
        field: field.to_string(),
    })
}

/// Two 128-bit values packed high/low into one word, as the v0.7 entrypoint expects.
fn pack_u128_pair(high: U256, high_field: &str, low: U256, low_field: &str) -> Result<B256, UserOpError> {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&to_u128(high, high_field)?.to_be_bytes());
    word[16..].copy_from_slice(&to_u128(low, low_field)?.to_be_bytes());
    Ok(B256::from(word))
}

/// `factory ++ factoryData`, empty for an already deployed account.
pub fn packed_init_code(op: &PackedUserOperation) -> Bytes {
    match op.factory {
        Some(factory) if factory != Address::ZERO => {
            [&factory[..], &op.factory_data.clone().unwrap_or_default()[..]]
                .concat()
                .into()
        }
        _ => Bytes::default(),
    }
}

/// `paymaster ++ verificationGasLimit ++ postOpGasLimit ++ paymasterData`.
pub fn packed_paymaster_and_data(op: &PackedUserOperation) -> Result<Bytes, UserOpError> {
    let Some(paymaster) = op.paymaster.filter(|p| *p != Address::ZERO) else {
        return Ok(Bytes::default());
    };

    let verification = to_u128(
        op.paymaster_verification_gas_limit.unwrap_or_default(),
        "paymaster_verification_gas_limit",
    )?;
    let post_op = to_u128(
        op.paymaster_post_op_gas_limit.unwrap_or_default(),
        "paymaster_post_op_gas_limit",
    )?;

    Ok([
        &paymaster[..],
        &verification.to_be_bytes()[..],
        &post_op.to_be_bytes()[..],
        &op.paymaster_data.clone().unwrap_or_default()[..],
    ]
    .concat()
    .into())
}

/// The hash an entrypoint v0.7 account signs over.
pub fn compute_user_op_v07_hash(
    op: &PackedUserOperation,
    entrypoint: Address,
    chain_id: ChainId,
) -> Result<B256, UserOpError> {
    let account_gas_limits = pack_u128_pair(
        op.verification_gas_limit,
        "verification_gas_limit",
        op.call_gas_limit,
        "call_gas_limit",
    )?;
    let gas_fees = pack_u128_pair(
        op.max_priority_fee_per_gas,
        "max_priority_fee_per_gas",
        op.max_fee_per_gas,
        "max_fee_per_gas",
    )?;

    let packed = (
        op.sender,
        op.nonce,
        keccak256(packed_init_code(op)),
        keccak256(&op.call_data),
        account_gas_limits,
        op.pre_verification_gas,
        gas_fees,
        keccak256(packed_paymaster_and_data(op)?),
    );

    let inner_hash = keccak256(packed.abi_encode());
    Ok(keccak256(
        (inner_hash, entrypoint, U256::from(chain_id)).abi_encode(),
    ))
}
