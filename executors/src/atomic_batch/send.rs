use std::sync::{Arc, Mutex, PoisonError};

use alloy::primitives::{Address, U64};
use batchwire_core::{
    calls::{CallsStatus, SendCallsRequest},
    chain::{is_atomic_supported_network, network_name, supported_atomic_network_names},
    error::FlowError,
    rpc_clients::{WalletClient, WalletErrorClassifier},
    transaction::Batch,
};
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;

use super::{
    confirm::{PollConfig, PollHandle, poll_until_terminal},
    explorer::ChainMetadataSource,
};

/// A batch the wallet accepted. `id` is opaque and only echoed back to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchHandle {
    pub id: String,
    pub chain_id: u64,
    pub from: Address,
    pub call_count: usize,
}

/// Sends batches through `wallet_sendCalls` and tracks their status.
pub struct BatchSubmitter<M: ChainMetadataSource> {
    client: WalletClient,
    metadata: Arc<M>,
    poll_config: PollConfig,
    active_poll: Mutex<Option<AbortHandle>>,
}

impl<M: ChainMetadataSource> BatchSubmitter<M> {
    pub fn new(client: WalletClient, metadata: Arc<M>) -> Self {
        Self {
            client,
            metadata,
            poll_config: PollConfig::default(),
            active_poll: Mutex::new(None),
        }
    }

    pub fn with_poll_config(mut self, poll_config: PollConfig) -> Self {
        self.poll_config = poll_config;
        self
    }

    /// Checks the batch locally, then hands it to the wallet.
    ///
    /// Nothing reaches the wallet unless the batch is non-empty, the chain is on the
    /// atomic allow-list and every recipient is well formed.
    #[tracing::instrument(skip(self, batch), fields(calls = batch.len()))]
    pub async fn submit(
        &self,
        batch: Batch,
        from: Address,
        chain_id: u64,
    ) -> Result<BatchHandle, FlowError> {
        if batch.is_empty() {
            return Err(FlowError::EmptyBatch);
        }

        if !is_atomic_supported_network(chain_id) {
            return Err(FlowError::NetworkUnsupported {
                chain_id,
                network: network_name(chain_id),
                supported: supported_atomic_network_names(),
            });
        }

        let calls = batch.validated_calls()?;
        let call_count = calls.len();

        let request = SendCallsRequest {
            version: batch.version,
            from,
            chain_id: U64::from(chain_id),
            atomic_required: batch.atomic_required,
            force_atomic: batch.atomic_required,
            calls,
            capabilities: None,
        };

        let id = self.client.send_calls(&request).await.map_err(|e| {
            tracing::warn!(error = %e, "wallet_sendCalls failed");
            WalletErrorClassifier::submission_error(&e)
        })?;

        // a rejected batch leaves the previous one's poller running
        self.cancel_active_poll();

        tracing::info!(batch_id = %id, "batch submitted");
        Ok(BatchHandle {
            id,
            chain_id,
            from,
            call_count,
        })
    }

    /// One `wallet_getCallsStatus` round-trip.
    pub async fn poll_status(&self, handle: &BatchHandle) -> Result<CallsStatus, FlowError> {
        self.client
            .get_calls_status(&handle.id)
            .await
            .map_err(|e| WalletErrorClassifier::query_error(&e, "wallet_getCallsStatus"))
    }

    /// Starts polling in the background, replacing any poller started earlier.
    pub fn watch(&self, handle: BatchHandle) -> PollHandle {
        self.watch_with(handle, self.poll_config)
    }

    pub fn watch_with(&self, handle: BatchHandle, config: PollConfig) -> PollHandle {
        let client = self.client.clone();
        let metadata = self.metadata.clone();
        let batch_id = handle.id.clone();

        let task = tokio::spawn(async move {
            poll_until_terminal(&client, metadata.as_ref(), &handle, config).await
        });
        let poll = PollHandle::new(batch_id, task);

        let previous = std::mem::replace(
            &mut *self
                .active_poll
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            poll.abort_handle(),
        );
        if let Some(previous) = previous {
            previous.abort();
        }

        poll
    }

    pub fn cancel_active_poll(&self) {
        let previous = self
            .active_poll
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            tracing::debug!("cancelling previous status poller");
            previous.abort();
        }
    }
}
