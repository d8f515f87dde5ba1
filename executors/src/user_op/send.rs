use alloy::{
    primitives::{Address, B256, U256},
    providers::Provider,
    rpc::types::UserOperationReceipt,
};
use batchwire_aa_core::{
    paymaster::CirclePaymaster,
    signer::SmartAccountSigner,
    smart_account::{SmartAccount, SmartAccountHandle},
    userop::{FeeTier, UserOpBuilder, UserOpBuilderConfig, fetch_nonce},
};
use batchwire_aa_types::compute_user_op_v07_hash;
use batchwire_core::{
    chain::Chain,
    constants::ENTRYPOINT_ADDRESS_V0_7,
    error::{AlloyRpcErrorToFlowError, ContractErrorToFlowError, FlowError},
    transaction::{Call, IERC20},
};

use super::confirm::{ReceiptWaitConfig, wait_for_user_op_receipt};

/// Sends calls from a smart account through the chain's bundler.
pub struct SmartAccountClient<C: Chain + Clone> {
    signer: SmartAccountSigner<C>,
    entrypoint: Address,
}

impl<C: Chain + Clone> SmartAccountClient<C> {
    pub fn new(signer: SmartAccountSigner<C>) -> Self {
        Self {
            signer,
            entrypoint: ENTRYPOINT_ADDRESS_V0_7,
        }
    }

    pub fn with_entrypoint(mut self, entrypoint: Address) -> Self {
        self.entrypoint = entrypoint;
        self
    }

    pub fn account(&self) -> &SmartAccountHandle {
        self.signer.account()
    }

    pub fn chain(&self) -> &C {
        self.signer.chain()
    }

    /// Estimates, signs and submits one user operation carrying `calls`.
    ///
    /// With a paymaster, gas is paid in its token; otherwise the account pays in native currency.
    #[tracing::instrument(skip_all, fields(account = %self.account().address, calls = calls.len()))]
    pub async fn estimate_and_send(
        &self,
        calls: &[Call],
        paymaster: Option<&CirclePaymaster>,
    ) -> Result<B256, FlowError> {
        if calls.is_empty() {
            return Err(FlowError::EmptyBatch);
        }

        let chain = self.chain();
        let account = self.account();

        let is_deployed = account.is_deployed(chain).await?;
        let nonce = fetch_nonce(chain, self.entrypoint, account.address).await?;
        tracing::debug!(is_deployed, %nonce, "account state fetched");

        let (paymaster_fields, fee_tier) = match paymaster {
            Some(paymaster) => (Some(paymaster.prepare(&self.signer).await?), FeeTier::Standard),
            None => (None, FeeTier::Fast),
        };

        let mut userop = UserOpBuilder::new(UserOpBuilderConfig {
            account,
            entrypoint: self.entrypoint,
            call_data: account.encode_calls(calls),
            is_deployed,
            nonce,
            chain,
            fee_tier,
            paymaster: paymaster_fields,
        })
        .build()
        .await?;

        let user_op_hash = compute_user_op_v07_hash(&userop, self.entrypoint, chain.chain_id())
            .map_err(|e| FlowError::ValidationError {
                message: e.to_string(),
            })?;
        userop.signature = self.signer.sign_user_op_hash(user_op_hash).await?;

        let submitted = chain
            .bundler_client()
            .send_user_op(&userop, self.entrypoint)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "bundler rejected user operation");
                e.to_flow_bundler_error(chain)
            })?;

        if submitted != user_op_hash {
            tracing::warn!(
                local = %user_op_hash,
                bundler = %submitted,
                "bundler returned a different user operation hash"
            );
        }
        tracing::info!(user_op_hash = %submitted, "user operation submitted");

        Ok(submitted)
    }

    pub async fn wait_for_receipt(
        &self,
        user_op_hash: B256,
        config: ReceiptWaitConfig,
    ) -> Result<UserOperationReceipt, FlowError> {
        wait_for_user_op_receipt(self.chain(), user_op_hash, config).await
    }

    /// Native balance of the smart account.
    pub async fn balance(&self) -> Result<U256, FlowError> {
        let chain = self.chain();
        chain
            .provider()
            .get_balance(self.account().address)
            .await
            .map_err(|e| e.to_flow_error(chain))
    }

    pub async fn token_balance(&self, token: Address) -> Result<U256, FlowError> {
        let chain = self.chain();
        IERC20::new(token, chain.provider().clone())
            .balanceOf(self.account().address)
            .call()
            .await
            .map_err(|e| e.to_flow_error(chain.chain_id(), Some(token)))
    }
}
