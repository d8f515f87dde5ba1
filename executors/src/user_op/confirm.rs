use std::time::Duration;

use alloy::{primitives::B256, rpc::types::UserOperationReceipt};
use batchwire_core::{
    chain::Chain,
    error::{AlloyRpcErrorToFlowError, FlowError, to_rpc_error_kind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptWaitConfig {
    /// Polls after the first one before giving up.
    pub retry_count: u32,
    pub polling_interval: Duration,
}

impl Default for ReceiptWaitConfig {
    fn default() -> Self {
        Self {
            retry_count: 7,
            polling_interval: Duration::from_secs(2),
        }
    }
}

/// Polls `eth_getUserOperationReceipt` at most `retry_count + 1` times.
#[tracing::instrument(skip(chain, config), fields(chain_id = chain.chain_id()))]
pub async fn wait_for_user_op_receipt(
    chain: &impl Chain,
    user_op_hash: B256,
    config: ReceiptWaitConfig,
) -> Result<UserOperationReceipt, FlowError> {
    let attempts = config.retry_count.saturating_add(1);

    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(config.polling_interval).await;
        }

        match chain.bundler_client().get_user_op_receipt(user_op_hash).await {
            Ok(Some(receipt)) => {
                tracing::info!(
                    attempt,
                    success = receipt.success,
                    transaction_hash = %receipt.receipt.transaction_hash,
                    "user operation included"
                );
                return Ok(receipt);
            }
            Ok(None) => {
                tracing::debug!(attempt, "receipt not available yet");
            }
            Err(e) if to_rpc_error_kind(&e).is_transient() => {
                tracing::warn!(attempt, error = %e, "receipt query failed, retrying");
            }
            Err(e) => return Err(e.to_flow_bundler_error(chain)),
        }
    }

    Err(FlowError::UserOpReceiptTimeout {
        user_op_hash: user_op_hash.to_string(),
        attempts,
    })
}
