use std::time::Duration;

use batchwire_core::{
    calls::CallsStatus,
    error::{FlowError, to_rpc_error_kind},
    rpc_clients::{WalletClient, WalletErrorClassifier},
};
use tokio::task::{AbortHandle, JoinHandle};

use super::{
    explorer::{ChainMetadataSource, resolve_explorer_url},
    send::BatchHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Status requests made before giving up, failed ones included.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed {
        status: CallsStatus,
        explorer_url: Option<String>,
    },
    /// The wallet reported a final status other than confirmed.
    Terminal { status: CallsStatus },
    TimedOut { attempts: u32 },
}

/// Polls `wallet_getCallsStatus` until the batch leaves the pending state.
///
/// Endpoint hiccups (transport, HTTP, unparsable or null answers) use up an
/// attempt and are retried; an error response from the wallet ends polling.
#[tracing::instrument(skip_all, fields(batch_id = %handle.id, chain_id = handle.chain_id))]
pub async fn poll_until_terminal<M: ChainMetadataSource>(
    client: &WalletClient,
    metadata: &M,
    handle: &BatchHandle,
    config: PollConfig,
) -> Result<PollOutcome, FlowError> {
    for attempt in 1..=config.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(config.interval).await;
        }

        let status = match client.get_calls_status(&handle.id).await {
            Ok(status) => status,
            Err(e) if to_rpc_error_kind(&e).is_transient() => {
                tracing::warn!(attempt, error = %e, "status request failed, retrying");
                continue;
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "wallet rejected status request");
                return Err(WalletErrorClassifier::query_error(&e, "wallet_getCallsStatus"));
            }
        };

        if status.is_pending() {
            tracing::debug!(attempt, "batch pending");
            continue;
        }

        if !status.is_confirmed() {
            tracing::warn!(attempt, status = status.status, "batch ended unconfirmed");
            return Ok(PollOutcome::Terminal { status });
        }

        let explorer_url = match status.first_transaction_hash() {
            Some(hash) => resolve_explorer_url(metadata, handle.chain_id, hash).await,
            None => None,
        };
        tracing::info!(attempt, explorer_url = ?explorer_url, "batch confirmed");
        return Ok(PollOutcome::Confirmed {
            status,
            explorer_url,
        });
    }

    tracing::warn!(attempts = config.max_attempts, "gave up polling batch status");
    Ok(PollOutcome::TimedOut {
        attempts: config.max_attempts,
    })
}

/// Owns a running status poller. Dropping the handle stops the poller.
#[derive(Debug)]
pub struct PollHandle {
    batch_id: String,
    task: Option<JoinHandle<Result<PollOutcome, FlowError>>>,
}

impl PollHandle {
    pub(crate) fn new(
        batch_id: String,
        task: JoinHandle<Result<PollOutcome, FlowError>>,
    ) -> Self {
        Self {
            batch_id,
            task: Some(task),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub(crate) fn abort_handle(&self) -> Option<AbortHandle> {
        self.task.as_ref().map(JoinHandle::abort_handle)
    }

    /// Waits for the poller. A cancelled poller yields `PollCancelled`.
    pub async fn outcome(mut self) -> Result<PollOutcome, FlowError> {
        let Some(task) = self.task.as_mut() else {
            return Err(FlowError::PollCancelled {
                batch_id: self.batch_id.clone(),
            });
        };

        let joined = task.await;
        self.task = None;

        match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(FlowError::PollCancelled {
                batch_id: self.batch_id.clone(),
            }),
            Err(e) => Err(FlowError::InternalError {
                message: format!("Status poller panicked: {e}"),
            }),
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
