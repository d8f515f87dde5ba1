use alloy::{
    hex,
    primitives::{Address, Bytes, U256},
    rpc::types::PackedUserOperation,
};
use batchwire_core::{
    chain::Chain,
    error::{AlloyRpcErrorToFlowError, FlowError},
    rpc_clients::{GasPriceTier, UserOpGasPrice},
};

use crate::smart_account::SmartAccountHandle;

/// Placeholder signature that passes ECDSA recovery during simulation.
pub const DUMMY_SIGNATURE: [u8; 65] = hex!(
    "0xfffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeeTier {
    Slow,
    #[default]
    Standard,
    Fast,
}

impl FeeTier {
    pub fn pick(self, prices: &UserOpGasPrice) -> GasPriceTier {
        match self {
            FeeTier::Slow => prices.slow,
            FeeTier::Standard => prices.standard,
            FeeTier::Fast => prices.fast,
        }
    }
}

/// Paymaster fields of a user operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterFields {
    pub paymaster: Address,
    pub paymaster_data: Bytes,
    /// Lower bound for `paymasterPostOpGasLimit`; below it the post-op phase reverts.
    pub post_op_gas_floor: U256,
}

pub struct UserOpBuilderConfig<'a, C: Chain> {
    pub account: &'a SmartAccountHandle,
    pub entrypoint: Address,
    pub call_data: Bytes,
    pub is_deployed: bool,
    pub nonce: U256,
    pub chain: &'a C,
    pub fee_tier: FeeTier,
    pub paymaster: Option<PaymasterFields>,
}

/// Assembles an unsigned v0.7 user operation with bundler-estimated gas.
pub struct UserOpBuilder<'a, C: Chain> {
    config: UserOpBuilderConfig<'a, C>,
}

impl<'a, C: Chain> UserOpBuilder<'a, C> {
    pub fn new(config: UserOpBuilderConfig<'a, C>) -> Self {
        Self { config }
    }

    fn initial_userop(&self) -> PackedUserOperation {
        let config = &self.config;
        let (factory, factory_data) = if config.is_deployed {
            (None, None)
        } else {
            (
                Some(config.account.factory_address),
                Some(config.account.init_calldata.clone()),
            )
        };

        PackedUserOperation {
            sender: config.account.address,
            nonce: config.nonce,
            factory,
            factory_data,
            call_data: config.call_data.clone(),
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            paymaster: None,
            paymaster_data: None,
            paymaster_verification_gas_limit: None,
            paymaster_post_op_gas_limit: None,
            signature: Bytes::from(DUMMY_SIGNATURE),
        }
    }

    pub async fn build(self) -> Result<PackedUserOperation, FlowError> {
        let chain = self.config.chain;
        let mut userop = self.initial_userop();

        let prices = chain
            .bundler_client()
            .get_user_op_gas_price()
            .await
            .map_err(|e| e.to_flow_bundler_error(chain))?;
        let fees = self.config.fee_tier.pick(&prices);

        tracing::debug!(
            max_fee_per_gas = %fees.max_fee_per_gas,
            max_priority_fee_per_gas = %fees.max_priority_fee_per_gas,
            "Gas prices determined"
        );

        match &self.config.paymaster {
            Some(paymaster) => {
                // The token paymaster prices its charge off the estimation fees, so
                // simulate at 1 wei and apply real fees afterwards.
                userop.paymaster = Some(paymaster.paymaster);
                userop.paymaster_data = Some(paymaster.paymaster_data.clone());
                userop.paymaster_post_op_gas_limit = Some(paymaster.post_op_gas_floor);
                userop.max_fee_per_gas = U256::from(1);
                userop.max_priority_fee_per_gas = U256::from(1);
            }
            None => {
                userop.max_fee_per_gas = fees.max_fee_per_gas;
                userop.max_priority_fee_per_gas = fees.max_priority_fee_per_gas;
            }
        }

        let estimation = chain
            .bundler_client()
            .estimate_user_op_gas(&userop, self.config.entrypoint)
            .await
            .map_err(|e| e.to_flow_bundler_error(chain))?;

        tracing::debug!(?estimation, "Gas limits determined");

        userop.call_gas_limit = estimation.call_gas_limit;
        userop.verification_gas_limit = estimation.verification_gas_limit;
        userop.pre_verification_gas = estimation.pre_verification_gas;
        userop.max_fee_per_gas = fees.max_fee_per_gas;
        userop.max_priority_fee_per_gas = fees.max_priority_fee_per_gas;

        if let Some(paymaster) = &self.config.paymaster {
            userop.paymaster_verification_gas_limit =
                Some(estimation.paymaster_verification_gas_limit.unwrap_or_default());
            userop.paymaster_post_op_gas_limit = Some(
                estimation
                    .paymaster_post_op_gas_limit
                    .unwrap_or_default()
                    .max(paymaster.post_op_gas_floor),
            );
        }

        Ok(userop)
    }
}
