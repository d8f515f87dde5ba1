use std::sync::{PoisonError, RwLock};

use alloy::primitives::{Address, U256};
use batchwire_core::{
    error::{AlloyRpcErrorToFlowError, FlowError},
    rpc_clients::WalletClient,
};
use tokio::sync::watch;

use crate::{
    discovery::{ProviderDetail, ProviderInfo},
    provider::ProviderEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub address: Address,
    pub chain_id: u64,
    pub provider: ProviderInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected(Connection),
}

impl ConnectionState {
    pub fn connection(&self) -> Option<&Connection> {
        match self {
            ConnectionState::Connected(connection) => Some(connection),
            _ => None,
        }
    }
}

/// Returned when the active chain changed; capabilities must be probed again.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRefresh {
    pub address: Address,
    pub chain_id: u64,
}

/// Owns the connection state; everyone else observes it through [`ConnectionManager::subscribe`].
pub struct ConnectionManager {
    state: watch::Sender<ConnectionState>,
    active: RwLock<Option<ProviderDetail>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(ConnectionState::Disconnected),
            active: RwLock::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn current(&self) -> Option<Connection> {
        self.state.borrow().connection().cloned()
    }

    /// Wallet client of the connected provider.
    pub fn client(&self) -> Result<WalletClient, FlowError> {
        if self.current().is_none() {
            return Err(FlowError::NotConnected);
        }

        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|detail| detail.provider.client().clone())
            .ok_or(FlowError::NotConnected)
    }

    /// Asks the wallet for account access. Any failure leaves the manager disconnected.
    #[tracing::instrument(skip_all, fields(wallet = %detail.info.name))]
    pub async fn connect(&self, detail: &ProviderDetail) -> Result<Connection, FlowError> {
        self.state.send_replace(ConnectionState::Connecting);

        match Self::establish(detail, true).await {
            Ok(Some(connection)) => Ok(self.activate(detail, connection)),
            Ok(None) => {
                self.reset();
                Err(FlowError::ConnectionRejected {
                    message: "Wallet returned no accounts".to_string(),
                })
            }
            Err(message) => {
                tracing::warn!(%message, "connection rejected");
                self.reset();
                Err(FlowError::ConnectionRejected { message })
            }
        }
    }

    /// Reconnects silently if the wallet already authorized an account.
    #[tracing::instrument(skip_all, fields(wallet = %detail.info.name))]
    pub async fn restore(&self, detail: &ProviderDetail) -> Result<Option<Connection>, FlowError> {
        match Self::establish(detail, false).await {
            Ok(Some(connection)) => Ok(Some(self.activate(detail, connection))),
            Ok(None) => Ok(None),
            Err(message) => Err(FlowError::ConnectionRejected { message }),
        }
    }

    async fn establish(
        detail: &ProviderDetail,
        prompt: bool,
    ) -> Result<Option<Connection>, String> {
        let client = detail.provider.client();
        let accounts = match prompt {
            true => client.request_accounts().await,
            false => client.accounts().await,
        };
        let accounts = accounts.map_err(|e| e.to_string())?;

        let Some(address) = accounts.first().copied() else {
            return Ok(None);
        };
        let chain_id = client.chain_id().await.map_err(|e| e.to_string())?;

        Ok(Some(Connection {
            address,
            chain_id,
            provider: detail.info.clone(),
        }))
    }

    fn activate(&self, detail: &ProviderDetail, connection: Connection) -> Connection {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(detail.clone());
        tracing::info!(
            address = %connection.address,
            chain_id = connection.chain_id,
            "wallet connected"
        );
        self.state
            .send_replace(ConnectionState::Connected(connection.clone()));
        connection
    }

    fn reset(&self) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.state.send_replace(ConnectionState::Disconnected);
    }

    pub fn disconnect(&self) {
        if self.current().is_some() {
            tracing::info!("wallet disconnected");
        }
        self.reset();
    }

    /// Follows the wallet's active account; an empty list means the user disconnected.
    pub fn on_accounts_changed(&self, accounts: &[Address]) -> ConnectionState {
        match accounts.first() {
            None => self.reset(),
            Some(address) => {
                self.state.send_if_modified(|state| match state {
                    ConnectionState::Connected(connection) if connection.address != *address => {
                        connection.address = *address;
                        true
                    }
                    _ => false,
                });
            }
        }
        self.state()
    }

    pub fn on_chain_changed(&self, chain_id: u64) -> Option<CapabilityRefresh> {
        let mut refresh = None;
        self.state.send_if_modified(|state| match state {
            ConnectionState::Connected(connection) if connection.chain_id != chain_id => {
                connection.chain_id = chain_id;
                refresh = Some(CapabilityRefresh {
                    address: connection.address,
                    chain_id,
                });
                true
            }
            _ => false,
        });

        if refresh.is_some() {
            tracing::info!(chain_id, "active chain changed");
        }
        refresh
    }

    pub fn apply_event(&self, event: &ProviderEvent) -> Option<CapabilityRefresh> {
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                self.on_accounts_changed(accounts);
                None
            }
            ProviderEvent::ChainChanged(chain_id) => self.on_chain_changed(*chain_id),
            ProviderEvent::Disconnect { .. } => {
                self.disconnect();
                None
            }
        }
    }

    /// Native balance of the connected account.
    pub async fn balance(&self) -> Result<U256, FlowError> {
        let connection = self.current().ok_or(FlowError::NotConnected)?;
        self.client()?
            .get_balance(connection.address)
            .await
            .map_err(|e| e.to_flow_wallet_error("eth_getBalance"))
    }
}
