//! An EIP-1193 provider: a request channel plus a stream of notifications.

use std::time::Duration;

use alloy::primitives::Address;
use batchwire_core::rpc_clients::WalletClient;
use tokio::{sync::broadcast, task::JoinHandle};

const EVENT_CAPACITY: usize = 32;

/// Provider notifications, named after their EIP-1193 events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnect { message: String },
}

#[derive(Debug, Clone)]
pub struct WalletProvider {
    client: WalletClient,
    events: broadcast::Sender<ProviderEvent>,
}

impl WalletProvider {
    pub fn new(client: WalletClient) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { client, events }
    }

    pub fn client(&self) -> &WalletClient {
        &self.client
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    /// Delivers a notification to every subscriber. Returns how many received it.
    pub fn emit(&self, event: ProviderEvent) -> usize {
        tracing::debug!(?event, "provider event");
        self.events.send(event).unwrap_or(0)
    }

    /// Turns `eth_accounts`/`eth_chainId` changes into events for endpoints
    /// that cannot push notifications.
    pub fn spawn_event_watcher(&self, interval: Duration) -> EventWatcher {
        let provider = self.clone();

        let task = tokio::spawn(async move {
            let mut last_accounts = provider.client.accounts().await.ok();
            let mut last_chain = provider.client.chain_id().await.ok();
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match provider.client.accounts().await {
                    Ok(accounts) => {
                        // the first answer only seeds the baseline
                        let previous = last_accounts.replace(accounts.clone());
                        if previous.is_some_and(|previous| previous != accounts) {
                            provider.emit(ProviderEvent::AccountsChanged(accounts));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "provider stopped answering");
                        provider.emit(ProviderEvent::Disconnect {
                            message: e.to_string(),
                        });
                        break;
                    }
                }

                if let Ok(chain_id) = provider.client.chain_id().await {
                    if last_chain
                        .replace(chain_id)
                        .is_some_and(|previous| previous != chain_id)
                    {
                        provider.emit(ProviderEvent::ChainChanged(chain_id));
                    }
                }
            }
        });

        EventWatcher { task }
    }
}

/// Stops the watcher task when dropped.
#[derive(Debug)]
pub struct EventWatcher {
    task: JoinHandle<()>,
}

impl EventWatcher {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchwire_core::rpc_clients::mock::ScriptedTransport;

    #[tokio::test(start_paused = true)]
    async fn watcher_reports_changes_only() {
        let transport = ScriptedTransport::new();
        let a = Address::repeat_byte(0xaa);
        let b = Address::repeat_byte(0xbb);
        transport.push_success("eth_accounts", vec![a]);
        transport.push_success("eth_accounts", vec![a]);
        transport.set_sticky("eth_accounts", vec![b]);
        transport.set_sticky("eth_chainId", "0x1");

        let provider = WalletProvider::new(transport.wallet_client());
        let mut events = provider.subscribe();
        let _watcher = provider.spawn_event_watcher(Duration::from_secs(1));

        let event = events.recv().await.unwrap();
        assert_eq!(event, ProviderEvent::AccountsChanged(vec![b]));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_seeds_silently_after_failed_first_read() {
        let transport = ScriptedTransport::new();
        let a = Address::repeat_byte(0xaa);
        let b = Address::repeat_byte(0xbb);
        transport.push_error("eth_accounts", -32603, "wallet locked");
        transport.push_success("eth_accounts", vec![a]);
        transport.push_success("eth_accounts", vec![a]);
        transport.set_sticky("eth_accounts", vec![b]);
        transport.push_error("eth_chainId", -32603, "wallet locked");
        transport.set_sticky("eth_chainId", "0x1");

        let provider = WalletProvider::new(transport.wallet_client());
        let mut events = provider.subscribe();
        let _watcher = provider.spawn_event_watcher(Duration::from_secs(1));

        let event = events.recv().await.unwrap();
        assert_eq!(event, ProviderEvent::AccountsChanged(vec![b]));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_ends_with_disconnect() {
        let transport = ScriptedTransport::new();
        transport.push_success("eth_accounts", Vec::<Address>::new());
        transport.push_transport_failure("eth_accounts", "connection refused");
        transport.set_sticky("eth_chainId", "0x1");

        let provider = WalletProvider::new(transport.wallet_client());
        let mut events = provider.subscribe();
        let watcher = provider.spawn_event_watcher(Duration::from_secs(1));

        assert!(matches!(
            events.recv().await.unwrap(),
            ProviderEvent::Disconnect { .. }
        ));
        tokio::task::yield_now().await;
        assert!(watcher.is_finished());
    }
}
