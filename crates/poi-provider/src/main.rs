use std::{path::PathBuf, sync::Arc};

use alloy::{
    network::Ethereum,
    providers::{Provider, ProviderBuilder},
};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use poi_provider::{
    chain_observer::{ChainObserver, MultiNetworkChainObserver, RpcChainObserver},
    config::Config,
    node::{ListProviderNode, NodeStores},
    policy::AllowAllPolicy,
    signer::KeypairSigner,
    store::{BlockedShieldStore, EventLogStore, NetworkStatusStore, ShieldQueueStore},
};

/// POI list-provider node: watches shield events, classifies them through a
/// policy gate, and publishes a signed event log under one list key.
#[derive(Parser, Debug)]
#[command(name = "poi-provider", version, about)]
struct Args {
    /// Path to a TOML config file supplying defaults for unset environment
    /// variables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the embedded `sled` database.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Hex-encoded Ed25519 secret key (32 bytes). A fresh key is generated
    /// and logged if omitted; suitable for local development only.
    #[arg(long)]
    list_secret_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Arc::new(Config::load(args.config.as_deref())?);
    info!("loaded configuration for list-provider \"{}\"", config.name);

    let signer: Arc<dyn poi_provider::signer::Signer> = match args.list_secret_key {
        Some(hex_key) => {
            let bytes = hex::decode(hex_key.trim_start_matches("0x"))?;
            let bytes: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("list secret key must be 32 bytes"))?;
            Arc::new(KeypairSigner::from_bytes(&bytes))
        }
        None => {
            let signer = KeypairSigner::generate();
            tracing::warn!(
                "no --list-secret-key supplied, generated an ephemeral key for list {}",
                signer.list_key()
            );
            Arc::new(signer)
        }
    };

    let db = sled::open(&args.data_dir)?;
    let stores = NodeStores {
        shield_queue: Arc::new(ShieldQueueStore::open(&db)?),
        network_status: Arc::new(NetworkStatusStore::open(&db)?),
        event_log: Arc::new(EventLogStore::open(&db)?),
        blocked: Arc::new(BlockedShieldStore::open(&db)?),
    };

    if config.networks.is_empty() {
        anyhow::bail!("NETWORK_NAMES must name at least one network");
    }
    let mut router = MultiNetworkChainObserver::new();
    for network in config.networks.iter().copied() {
        let settings = config
            .settings_for(network)
            .ok_or_else(|| anyhow::anyhow!("missing RPC settings for {network}"))?;
        let provider = ProviderBuilder::new()
            .network::<Ethereum>()
            .connect(&settings.rpc_url)
            .await?
            .erased();
        let rpc_observer = RpcChainObserver::new(provider, network.config().railgun_smart_wallet);
        router.register(network, Arc::new(rpc_observer) as Arc<dyn ChainObserver>);
    }
    let observer = Arc::new(router);

    let mut node = ListProviderNode::new(
        signer,
        stores,
        observer,
        Arc::new(AllowAllPolicy),
        config,
    );
    node.init()?;
    node.start_polling()?;

    info!("list-provider node running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    Ok(())
}
