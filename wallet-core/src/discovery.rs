//! EIP-6963 style multi-wallet discovery.
//!
//! The registry asks every announcer to announce itself; announced providers are kept
//! in arrival order, one entry per `uuid`.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::provider::WalletProvider;

const ANNOUNCE_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub uuid: String,
    pub name: String,
    /// Data URI of the wallet icon.
    pub icon: String,
    /// Reverse-DNS identifier, e.g. `io.metamask`.
    pub rdns: String,
}

#[derive(Debug, Clone)]
pub struct ProviderDetail {
    pub info: ProviderInfo,
    pub provider: WalletProvider,
}

/// A wallet that answers discovery requests.
pub trait ProviderAnnouncer: Send + Sync {
    fn on_request(&self, registry: &ProviderRegistry);
}

/// Announces a fixed set of providers on every request.
pub struct StaticAnnouncer {
    details: Vec<ProviderDetail>,
}

impl StaticAnnouncer {
    pub fn new(details: Vec<ProviderDetail>) -> Self {
        Self { details }
    }
}

impl ProviderAnnouncer for StaticAnnouncer {
    fn on_request(&self, registry: &ProviderRegistry) {
        for detail in &self.details {
            registry.announce(detail.clone());
        }
    }
}

#[derive(Default)]
struct RegistryState {
    providers: Vec<ProviderDetail>,
    announcers: Vec<Arc<dyn ProviderAnnouncer>>,
}

#[derive(Clone)]
pub struct ProviderRegistry {
    state: Arc<RwLock<RegistryState>>,
    arrivals: broadcast::Sender<ProviderDetail>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        let (arrivals, _) = broadcast::channel(ANNOUNCE_CAPACITY);
        Self {
            state: Arc::default(),
            arrivals,
        }
    }

    pub fn register_announcer(&self, announcer: Arc<dyn ProviderAnnouncer>) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .announcers
            .push(announcer);
    }

    /// Asks every registered announcer to announce itself.
    pub fn request_providers(&self) {
        let announcers = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .announcers
            .clone();

        tracing::debug!(announcers = announcers.len(), "requesting providers");
        for announcer in announcers {
            announcer.on_request(self);
        }
    }

    /// Records a provider. Returns `false` when its `uuid` was already known.
    pub fn announce(&self, detail: ProviderDetail) -> bool {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state
                .providers
                .iter()
                .any(|known| known.info.uuid == detail.info.uuid)
            {
                return false;
            }
            state.providers.push(detail.clone());
        }

        tracing::info!(
            name = %detail.info.name,
            rdns = %detail.info.rdns,
            uuid = %detail.info.uuid,
            "wallet provider announced"
        );
        let _ = self.arrivals.send(detail);
        true
    }

    pub fn providers(&self) -> Vec<ProviderDetail> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .providers
            .clone()
    }

    pub fn find(&self, uuid: &str) -> Option<ProviderDetail> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .providers
            .iter()
            .find(|detail| detail.info.uuid == uuid)
            .cloned()
    }

    /// Receives providers announced after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderDetail> {
        self.arrivals.subscribe()
    }
}
