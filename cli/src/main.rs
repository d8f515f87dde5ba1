use batchwire::{LogFormat, Session, commands::Cli, config};
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::get_config(&cli.config_dir)?;

    let subscriber = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "batchwire=debug,batchwire_executors=debug,batchwire_aa_core=debug,batchwire_wallet_core=debug,batchwire_dex_core=debug"
                .into()
        }),
    );

    // stdout belongs to the session prompt
    match config.log_format {
        LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    tracing::info!(
        chain_id = config.node.chain_id,
        wallets = config.wallets.len(),
        "configuration loaded"
    );

    let mut session = Session::new(config)?;
    if let Some(wallet) = &cli.wallet {
        session.connect_on_start(wallet).await;
    }
    if let Some(key_file) = &cli.key_file {
        session.load_owner_on_start(key_file).await;
    }

    session.run().await
}
