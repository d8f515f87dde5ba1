//! ERC-20 gas payment through Circle's token paymaster.
//!
//! The smart account grants the paymaster an EIP-2612 allowance inside
//! `paymasterData`, so no separate approval transaction is needed.

pub mod permit;

use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::SolValue,
};
use batchwire_core::{
    chain::Chain,
    constants::{CIRCLE_PAYMASTER_BASE_SEPOLIA, DEFAULT_MAX_GAS_IN_TOKEN, USDC_BASE_SEPOLIA},
    error::{ContractErrorToFlowError, FlowError},
    transaction::IERC20,
};

use crate::{
    signer::{SmartAccountSigner, unwrap_erc6492},
    userop::PaymasterFields,
};

sol! {
    #[sol(rpc)]
    contract TokenPaymaster {
        function additionalGasCharge() external view returns (uint256);
    }
}

/// Paymaster mode byte for permit-based allowances.
const PERMIT_MODE: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CirclePaymaster {
    pub address: Address,
    pub token: Address,
    pub token_symbol: String,
    /// Permit allowance, in token base units, the paymaster may draw for gas.
    pub max_gas_in_token: U256,
}

impl Default for CirclePaymaster {
    fn default() -> Self {
        Self {
            address: CIRCLE_PAYMASTER_BASE_SEPOLIA,
            token: USDC_BASE_SEPOLIA,
            token_symbol: "USDC".to_string(),
            max_gas_in_token: U256::from(DEFAULT_MAX_GAS_IN_TOKEN),
        }
    }
}

impl CirclePaymaster {
    /// `uint8 mode ++ address token ++ uint256 maxGas ++ bytes permitSignature`, tightly packed.
    pub fn paymaster_data(&self, permit_signature: &Bytes) -> Bytes {
        (
            alloy::primitives::FixedBytes::<1>::from([PERMIT_MODE]),
            self.token,
            self.max_gas_in_token,
            permit_signature.clone(),
        )
            .abi_encode_packed()
            .into()
    }

    /// Gas the paymaster charges on top of its post-op execution.
    pub async fn additional_gas_charge(&self, chain: &impl Chain) -> Result<U256, FlowError> {
        TokenPaymaster::new(self.address, chain.provider().clone())
            .additionalGasCharge()
            .call()
            .await
            .map_err(|e| e.to_flow_error(chain.chain_id(), Some(self.address)))
    }

    pub async fn token_balance(&self, chain: &impl Chain, owner: Address) -> Result<U256, FlowError> {
        IERC20::new(self.token, chain.provider().clone())
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| e.to_flow_error(chain.chain_id(), Some(self.token)))
    }

    /// Signs a permit for the paymaster and returns the user operation's paymaster fields.
    ///
    /// Fails with `InsufficientBalance` when the account holds none of the token, and with
    /// `PaymasterError` when the token cannot be permitted or the paymaster will not quote.
    pub async fn prepare<C: Chain + Clone>(
        &self,
        signer: &SmartAccountSigner<C>,
    ) -> Result<PaymasterFields, FlowError> {
        let chain = signer.chain();
        let account = signer.account().address;

        let balance = self.token_balance(chain, account).await?;
        if balance.is_zero() {
            return Err(FlowError::InsufficientBalance {
                asset: self.token_symbol.clone(),
                address: account,
            });
        }

        let permit =
            permit::eip2612_permit(chain, self.token, account, self.address, self.max_gas_in_token)
                .await
                .map_err(|e| FlowError::PaymasterError {
                    message: format!("{} permit unavailable: {e}", self.token_symbol),
                })?;
        let wrapped = signer.sign_typed(&permit.message, &permit.domain).await?;
        let signature = unwrap_erc6492(&wrapped)?;

        let post_op_gas_floor = self
            .additional_gas_charge(chain)
            .await
            .map_err(|e| FlowError::PaymasterError {
                message: format!("Paymaster {} gas charge unavailable: {e}", self.address),
            })?;

        tracing::debug!(
            paymaster = %self.address,
            token = %self.token,
            %post_op_gas_floor,
            "paymaster permit signed"
        );

        Ok(PaymasterFields {
            paymaster: self.address,
            paymaster_data: self.paymaster_data(&signature),
            post_op_gas_floor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::bytes;

    #[test]
    fn paymaster_data_is_tightly_packed() {
        let paymaster = CirclePaymaster::default();
        let data = paymaster.paymaster_data(&bytes!("0xaabbcc"));

        assert_eq!(data.len(), 1 + 20 + 32 + 3);
        assert_eq!(data[0], PERMIT_MODE);
        assert_eq!(&data[1..21], paymaster.token.as_slice());
        assert_eq!(
            U256::from_be_slice(&data[21..53]),
            U256::from(DEFAULT_MAX_GAS_IN_TOKEN)
        );
        assert_eq!(&data[53..], &[0xaa, 0xbb, 0xcc]);
    }
}
