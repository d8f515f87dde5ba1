//! Interactive session: one command per line, errors reported as status lines.

use std::{path::Path, str::FromStr, sync::Arc, time::Duration};

use alloy::{
    primitives::{Address, Bytes},
    signers::local::PrivateKeySigner,
    transports::http::{
        Http,
        reqwest::{
            Client, Url,
            header::{HeaderMap, HeaderName, HeaderValue},
        },
    },
};
use batchwire_aa_core::{
    factory::FactorySettings, paymaster::CirclePaymaster, provisioner::Provisioner,
    signer::OwnerSigner, smart_account::SmartAccount,
};
use batchwire_core::{
    chain::{NodeChain, NodeChainConfig},
    constants::SEND_CALLS_VERSION,
    error::FlowError,
    rpc_clients::WalletClient,
    transaction::{Call, CallRequest, parse_ether_amount, validate_recipient},
};
use batchwire_dex_core::{DexAddresses, SwapHelper, SwapRequest, swap::wrap_eth_call};
use batchwire_executors::{
    atomic_batch::{BatchHandle, BatchSubmitter, HttpChainMetadata},
    user_op::{ReceiptWaitConfig, SmartAccountClient},
};
use batchwire_wallet_core::{
    CallBatchBuilder, CapabilityProber, CapabilityRefresh, ConnectionManager, EventWatcher,
    ProviderDetail, ProviderEvent, ProviderInfo, ProviderRegistry, WalletProvider,
    discovery::StaticAnnouncer,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::broadcast,
};

use crate::{
    commands::{AccountCommand, SessionCommand, SessionLine},
    config::{BatchwireConfig, WalletConfig},
    render,
};

struct ActiveWallet {
    submitter: BatchSubmitter<HttpChainMetadata>,
    prober: CapabilityProber,
    events: broadcast::Receiver<ProviderEvent>,
    _watcher: EventWatcher,
}

pub struct Session {
    config: BatchwireConfig,
    registry: ProviderRegistry,
    connections: ConnectionManager,
    metadata: Arc<HttpChainMetadata>,
    chain: NodeChain,
    paymaster: CirclePaymaster,
    calls: CallBatchBuilder,
    wallet: Option<ActiveWallet>,
    last_batch: Option<BatchHandle>,
    smart_account: Option<SmartAccountClient<NodeChain>>,
}

enum Flow {
    Continue,
    Quit,
}

impl Session {
    pub fn new(config: BatchwireConfig) -> anyhow::Result<Self> {
        let metadata = HttpChainMetadata::builder()
            .with_url(config.metadata.chains_url.clone())
            .with_cache_ttl(Duration::from_secs(config.metadata.cache_ttl_secs))
            .build()?;

        let chain = NodeChainConfig {
            chain_id: config.node.chain_id,
            rpc_url: &config.node.rpc_url,
            bundler_url: &config.bundler.url,
            bundler_headers: bundler_headers(&config)?,
        }
        .to_chain()?;

        let registry = ProviderRegistry::new();
        registry.register_announcer(Arc::new(StaticAnnouncer::new(
            config
                .wallets
                .iter()
                .map(provider_detail)
                .collect::<anyhow::Result<_>>()?,
        )));
        registry.request_providers();

        Ok(Self {
            paymaster: CirclePaymaster::from(&config.paymaster),
            registry,
            connections: ConnectionManager::new(),
            metadata: Arc::new(metadata),
            chain,
            calls: CallBatchBuilder::new(),
            wallet: None,
            last_batch: None,
            smart_account: None,
            config,
        })
    }

    /// Reads commands from stdin until `quit` or end of input.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        loop {
            stdout.write_all(b"batchwire> ").await?;
            stdout.flush().await?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                event = next_event(&mut self.wallet) => {
                    println!();
                    self.on_provider_event(event).await;
                    continue;
                }
            };

            let Some(line) = line else {
                break;
            };

            match SessionLine::parse_line(&line) {
                None => continue,
                Some(Err(e)) => {
                    let _ = e.print();
                }
                Some(Ok(parsed)) => {
                    if let Flow::Quit = self.dispatch(parsed.command).await {
                        break;
                    }
                }
            }
        }

        self.connections.disconnect();
        Ok(())
    }

    async fn dispatch(&mut self, command: SessionCommand) -> Flow {
        let result = match command {
            SessionCommand::Quit => return Flow::Quit,
            SessionCommand::Wallets => {
                self.list_wallets();
                Ok(())
            }
            SessionCommand::Connect { wallet } => self.connect(wallet.as_deref()).await,
            SessionCommand::Disconnect => {
                self.disconnect();
                Ok(())
            }
            SessionCommand::Status => self.status().await,
            SessionCommand::Capabilities => self.capabilities().await,
            SessionCommand::Add { to, amount } => self.add_transfer(&to, &amount),
            SessionCommand::AddCall { to, data, value } => self.add_call(to, &data, &value),
            SessionCommand::Calls => {
                self.show_calls();
                Ok(())
            }
            SessionCommand::Clear => {
                self.calls.clear();
                render::ok("call queue cleared");
                Ok(())
            }
            SessionCommand::Submit { no_atomic } => self.submit(!no_atomic).await,
            SessionCommand::BatchStatus { id } => self.batch_status(id).await,
            SessionCommand::Cancel => self.cancel_poll(),
            SessionCommand::Account(command) => self.account(command).await,
        };

        if let Err(e) = result {
            render::failure(&e);
        }
        Flow::Continue
    }

    /// Connects the wallet given on the command line, reporting failures like any command.
    pub async fn connect_on_start(&mut self, wallet: &str) {
        if let Err(e) = self.connect(Some(wallet)).await {
            render::failure(&e);
        }
    }

    pub async fn load_owner_on_start(&mut self, key_file: &Path) {
        if let Err(e) = self.load_owner(key_file).await {
            render::failure(&e);
        }
    }

    fn list_wallets(&self) {
        self.registry.request_providers();
        let providers = self.registry.providers();
        if providers.is_empty() {
            render::ok("no wallets announced");
            return;
        }

        let current = self.connections.current();
        for (index, detail) in providers.iter().enumerate() {
            let marker = match &current {
                Some(connection) if connection.provider.uuid == detail.info.uuid => "*",
                _ => " ",
            };
            println!(
                "{marker} [{index}] {} ({}) {}",
                detail.info.name, detail.info.rdns, detail.info.uuid
            );
        }
    }

    fn select_wallet(&self, selector: Option<&str>) -> Result<ProviderDetail, FlowError> {
        let providers = self.registry.providers();
        let selected = match selector {
            None => providers.first().cloned(),
            Some(selector) => match selector.parse::<usize>() {
                Ok(index) => providers.get(index).cloned(),
                Err(_) => self.registry.find(selector).or_else(|| {
                    providers
                        .iter()
                        .find(|detail| detail.info.name.eq_ignore_ascii_case(selector))
                        .cloned()
                }),
            },
        };

        selected.ok_or_else(|| FlowError::ConnectionRejected {
            message: format!("No wallet matches {}", selector.unwrap_or("the default")),
        })
    }

    async fn connect(&mut self, selector: Option<&str>) -> Result<(), FlowError> {
        let detail = self.select_wallet(selector)?;
        self.disconnect_quietly();

        let connection = self.connections.connect(&detail).await?;
        let client = self.connections.client()?;
        let event_interval = self
            .config
            .wallets
            .iter()
            .find(|wallet| wallet.name == detail.info.name)
            .map(|wallet| wallet.event_poll_ms)
            .unwrap_or(2000);

        self.wallet = Some(ActiveWallet {
            submitter: BatchSubmitter::new(client.clone(), self.metadata.clone())
                .with_poll_config((&self.config.poll).into()),
            prober: CapabilityProber::new(client),
            events: detail.provider.subscribe(),
            _watcher: detail
                .provider
                .spawn_event_watcher(Duration::from_millis(event_interval)),
        });

        render::ok(format!(
            "connected {} on {}",
            connection.address,
            render::chain(connection.chain_id)
        ));
        self.refresh_capabilities(CapabilityRefresh {
            address: connection.address,
            chain_id: connection.chain_id,
        })
        .await;
        Ok(())
    }

    fn disconnect_quietly(&mut self) {
        if let Some(wallet) = self.wallet.take() {
            wallet.submitter.cancel_active_poll();
        }
        self.connections.disconnect();
    }

    fn disconnect(&mut self) {
        self.disconnect_quietly();
        self.last_batch = None;
        render::ok("disconnected");
    }

    async fn on_provider_event(&mut self, event: Option<ProviderEvent>) {
        let Some(event) = event else {
            self.wallet = None;
            return;
        };

        let refresh = self.connections.apply_event(&event);
        match &event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                Some(account) => render::ok(format!("account changed to {account}")),
                None => {
                    self.disconnect_quietly();
                    render::ok("wallet revoked access");
                }
            },
            ProviderEvent::ChainChanged(chain_id) => {
                render::ok(format!("chain changed to {}", render::chain(*chain_id)))
            }
            ProviderEvent::Disconnect { message } => {
                self.disconnect_quietly();
                render::failure(&FlowError::ConnectionRejected {
                    message: message.clone(),
                });
            }
        }

        if let Some(refresh) = refresh {
            self.refresh_capabilities(refresh).await;
        }
    }

    async fn refresh_capabilities(&self, refresh: CapabilityRefresh) {
        let Some(wallet) = &self.wallet else {
            return;
        };
        match wallet.prober.probe(refresh.address, refresh.chain_id).await {
            Ok(capabilities) => {
                for line in capabilities.describe() {
                    render::info(line);
                }
                if !capabilities.supports_atomic(refresh.chain_id) {
                    render::info("atomic batching is not available on the active chain");
                }
            }
            Err(e) => render::failure(&e),
        }
    }

    fn active_wallet(&self) -> Result<&ActiveWallet, FlowError> {
        self.wallet.as_ref().ok_or(FlowError::NotConnected)
    }

    async fn status(&self) -> Result<(), FlowError> {
        let connection = self.connections.current().ok_or(FlowError::NotConnected)?;
        let balance = self.connections.balance().await?;
        render::ok(format!(
            "{} via {} on {}",
            connection.address,
            connection.provider.name,
            render::chain(connection.chain_id)
        ));
        render::info(format!("balance {}", render::ether(balance)));
        render::info(format!("{} call(s) queued", self.calls.len()));
        Ok(())
    }

    async fn capabilities(&self) -> Result<(), FlowError> {
        let connection = self.connections.current().ok_or(FlowError::NotConnected)?;
        self.active_wallet()?;
        self.refresh_capabilities(CapabilityRefresh {
            address: connection.address,
            chain_id: connection.chain_id,
        })
        .await;
        Ok(())
    }

    fn add_transfer(&mut self, to: &str, amount: &str) -> Result<(), FlowError> {
        let count = self.calls.add_transfer(to, amount)?;
        render::ok(format!("queued transfer of {amount} ETH to {to} ({count} queued)"));
        Ok(())
    }

    fn add_call(&mut self, to: String, data: &str, value: &str) -> Result<(), FlowError> {
        let data = Bytes::from_str(data).map_err(|e| FlowError::ValidationError {
            message: format!("Invalid calldata: {e}"),
        })?;
        let value = parse_ether_amount(value)?;
        let count = self
            .calls
            .add(CallRequest::new(to.clone(), value).with_data(data))?;
        render::ok(format!("queued call to {to} ({count} queued)"));
        Ok(())
    }

    fn show_calls(&self) {
        if self.calls.is_empty() {
            render::ok("no calls queued");
            return;
        }
        for (index, call) in self.calls.calls().iter().enumerate() {
            let data = call.data.as_ref().map(|d| d.len()).unwrap_or_default();
            println!(
                "  [{index}] {} value {} data {data} bytes",
                call.to,
                render::ether(call.value)
            );
        }
    }

    async fn submit(&mut self, atomic_required: bool) -> Result<(), FlowError> {
        let connection = self.connections.current().ok_or(FlowError::NotConnected)?;
        let wallet = self.wallet.as_ref().ok_or(FlowError::NotConnected)?;
        let batch = self.calls.build(SEND_CALLS_VERSION, atomic_required);

        let handle = match wallet
            .submitter
            .submit(batch, connection.address, connection.chain_id)
            .await
        {
            Ok(handle) => handle,
            Err(e @ FlowError::AccountUpgradeRequired { .. }) => {
                if let Ok(delegation) = wallet.prober.delegation(connection.address).await {
                    render::info(format!("account delegation: {delegation:?}"));
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        render::ok(format!(
            "submitted {} call(s) as batch {}",
            handle.call_count, handle.id
        ));
        self.calls.clear();
        self.last_batch = Some(handle.clone());

        let poll = wallet.submitter.watch(handle);
        tokio::spawn(async move {
            let batch_id = poll.batch_id().to_string();
            match poll.outcome().await {
                Ok(outcome) => println!("\n{}", render::poll_outcome(&batch_id, &outcome)),
                Err(FlowError::PollCancelled { .. }) => {
                    println!("\nstopped watching batch {batch_id}")
                }
                Err(e) => render::failure(&e),
            }
        });
        Ok(())
    }

    async fn batch_status(&self, id: Option<String>) -> Result<(), FlowError> {
        let wallet = self.active_wallet()?;
        let handle = match (id, &self.last_batch) {
            (Some(id), last) => {
                let connection = self.connections.current().ok_or(FlowError::NotConnected)?;
                BatchHandle {
                    id,
                    chain_id: connection.chain_id,
                    from: connection.address,
                    call_count: last.as_ref().map(|h| h.call_count).unwrap_or_default(),
                }
            }
            (None, Some(last)) => last.clone(),
            (None, None) => {
                return Err(FlowError::ValidationError {
                    message: "No batch submitted in this session".to_string(),
                });
            }
        };

        let status = wallet.submitter.poll_status(&handle).await?;
        render::ok(format!(
            "batch {}: status {}, {} receipt(s)",
            handle.id,
            status.status,
            status.receipts.len()
        ));
        if let Some(hash) = status.first_transaction_hash() {
            render::info(format!("transaction {hash}"));
        }
        Ok(())
    }

    fn cancel_poll(&self) -> Result<(), FlowError> {
        self.active_wallet()?.submitter.cancel_active_poll();
        Ok(())
    }

    async fn account(&mut self, command: AccountCommand) -> Result<(), FlowError> {
        match command {
            AccountCommand::New => self.provision_generated().await,
            AccountCommand::Load { key_file } => self.load_owner(&key_file).await,
            AccountCommand::Info => self.account_info().await,
            AccountCommand::Send {
                to,
                amount,
                token,
                paymaster,
            } => {
                let to = validate_recipient(&to)?;
                let call = match token {
                    true => Call::erc20_transfer(
                        self.paymaster.token,
                        to,
                        render::parse_token_amount(&amount)?,
                    ),
                    false => Call::transfer(to, parse_ether_amount(&amount)?),
                };
                self.send_user_op(&[call], paymaster).await
            }
            AccountCommand::Wrap { amount, paymaster } => {
                let call = wrap_eth_call(self.config.dex.weth, parse_ether_amount(&amount)?);
                self.send_user_op(&[call], paymaster).await
            }
            AccountCommand::Quote { amount } => self.quote(&amount).await,
            AccountCommand::Swap {
                amount,
                slippage_bps,
                paymaster,
            } => self.swap(&amount, slippage_bps, paymaster).await,
        }
    }

    fn provisioner(&self) -> Provisioner<NodeChain> {
        Provisioner::new(self.chain.clone())
            .with_settings(FactorySettings::from(&self.config.account))
    }

    fn install_account(&mut self, client: SmartAccountClient<NodeChain>) {
        let account = client.account();
        render::ok(format!(
            "smart account {} owned by {}",
            account.address, account.owner
        ));
        self.smart_account = Some(client);
    }

    async fn provision_generated(&mut self) -> Result<(), FlowError> {
        let (_derived, signer) = self.provisioner().provision_generated().await?;
        render::info("owner key generated in memory; it is lost when the session ends");
        self.install_account(
            SmartAccountClient::new(signer).with_entrypoint(self.config.bundler.entrypoint),
        );
        Ok(())
    }

    async fn load_owner(&mut self, key_file: &Path) -> Result<(), FlowError> {
        let owner = read_owner_key(key_file)?;
        let signer = self.provisioner().with_owner(owner).await?;
        self.install_account(
            SmartAccountClient::new(signer).with_entrypoint(self.config.bundler.entrypoint),
        );
        Ok(())
    }

    fn smart_account(&self) -> Result<&SmartAccountClient<NodeChain>, FlowError> {
        self.smart_account
            .as_ref()
            .ok_or_else(|| FlowError::ValidationError {
                message: "No smart account; run `account new` or `account load <file>`"
                    .to_string(),
            })
    }

    async fn account_info(&self) -> Result<(), FlowError> {
        let client = self.smart_account()?;
        let account = client.account();
        let deployed = account.is_deployed(client.chain()).await?;

        render::ok(format!(
            "{} on {} ({})",
            account.address,
            render::chain(self.config.node.chain_id),
            if deployed { "deployed" } else { "not deployed yet" }
        ));
        render::info(format!("owner {}", account.owner));
        render::info(format!("balance {}", render::ether(client.balance().await?)));
        render::info(format!(
            "{} balance {}",
            self.paymaster.token_symbol,
            render::token(
                client.token_balance(self.paymaster.token).await?,
                &self.paymaster.token_symbol
            )
        ));
        render::info(format!(
            "WETH balance {}",
            render::ether(client.token_balance(self.config.dex.weth).await?)
        ));
        Ok(())
    }

    async fn send_user_op(&self, calls: &[Call], use_paymaster: bool) -> Result<(), FlowError> {
        let client = self.smart_account()?;
        let paymaster = use_paymaster.then_some(&self.paymaster);

        let user_op_hash = client.estimate_and_send(calls, paymaster).await?;
        render::ok(format!("user operation {user_op_hash} submitted"));

        let receipt = client
            .wait_for_receipt(user_op_hash, ReceiptWaitConfig::from(&self.config.receipt))
            .await?;
        let transaction_hash = receipt.receipt.transaction_hash;

        match receipt.success {
            true => render::ok(format!("included in transaction {transaction_hash}")),
            false => render::failure(&FlowError::SubmissionFailed {
                message: format!(
                    "User operation {user_op_hash} reverted in transaction {transaction_hash}"
                ),
            }),
        }
        Ok(())
    }

    fn swap_request(
        &self,
        amount: &str,
        slippage_bps: Option<u16>,
        recipient: Address,
    ) -> Result<SwapRequest, FlowError> {
        let dex = &self.config.dex;
        Ok(SwapRequest {
            amount_in: parse_ether_amount(amount)?,
            slippage_bps: slippage_bps.unwrap_or(dex.default_slippage_bps),
            token_in: dex.weth,
            token_out: self.paymaster.token,
            recipient,
            fee: dex.fee,
            deadline: None,
        })
    }

    async fn quote(&self, amount: &str) -> Result<(), FlowError> {
        let request = self.swap_request(amount, None, Address::ZERO)?;
        let helper = SwapHelper::new(&self.chain, DexAddresses::from(&self.config.dex));
        let quote = helper
            .quote(
                request.amount_in,
                request.token_in,
                request.token_out,
                request.fee,
            )
            .await?;

        render::ok(format!(
            "{amount} WETH -> {} via pool {}",
            render::token(quote.amount_out, &self.paymaster.token_symbol),
            quote.pool
        ));
        render::info(format!("gas estimate {}", quote.gas_estimate));
        Ok(())
    }

    async fn swap(
        &self,
        amount: &str,
        slippage_bps: Option<u16>,
        paymaster: bool,
    ) -> Result<(), FlowError> {
        let recipient = self.smart_account()?.account().address;
        let request = self.swap_request(amount, slippage_bps, recipient)?;
        let helper = SwapHelper::new(&self.chain, DexAddresses::from(&self.config.dex));
        let (plan, calls) = helper.swap_calls(&request).await?;

        render::ok(format!(
            "quoted {}, accepting at least {}",
            render::token(plan.quote.amount_out, &self.paymaster.token_symbol),
            render::token(plan.min_amount_out, &self.paymaster.token_symbol)
        ));
        self.send_user_op(&calls, paymaster).await
    }
}

async fn next_event(wallet: &mut Option<ActiveWallet>) -> Option<ProviderEvent> {
    let Some(wallet) = wallet else {
        return std::future::pending().await;
    };

    loop {
        match wallet.events.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "provider events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn provider_detail(wallet: &WalletConfig) -> anyhow::Result<ProviderDetail> {
    let url = Url::parse(&wallet.rpc_url)?;
    Ok(ProviderDetail {
        info: ProviderInfo {
            uuid: uuid::Uuid::new_v4().to_string(),
            name: wallet.name.clone(),
            icon: wallet.icon.clone(),
            rdns: wallet.rdns.clone(),
        },
        provider: WalletProvider::new(WalletClient::new(Http::<Client>::new(url))),
    })
}

fn bundler_headers(config: &BatchwireConfig) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.bundler.headers {
        headers.insert(HeaderName::from_str(name)?, HeaderValue::from_str(value)?);
    }
    Ok(headers)
}

fn read_owner_key(path: &Path) -> Result<OwnerSigner, FlowError> {
    let contents = std::fs::read_to_string(path).map_err(|e| FlowError::SigningError {
        message: format!("Failed to read key file {}: {e}", path.display()),
    })?;
    let signer = PrivateKeySigner::from_str(contents.trim()).map_err(|_| FlowError::SigningError {
        message: format!("{} does not hold a hex private key", path.display()),
    })?;
    tracing::debug!(owner = %signer.address(), "owner key loaded");
    Ok(Arc::new(signer))
}
