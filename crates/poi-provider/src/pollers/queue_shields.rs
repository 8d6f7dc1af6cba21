//! Poller that pulls new shield events from the chain and enqueues them as
//! pending.
//!
//! Cooperative sleep-then-iterate loop, one per network: each network gets
//! its own `tokio::spawn`'d future that never starts a new iteration before
//! the previous one for that network has finished.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    chain_observer::ChainObserver,
    config::Config,
    network::Network,
    store::{NetworkStatusStore, ShieldQueueStore},
};

pub struct QueueShieldsPoller {
    network: Network,
    observer: Arc<dyn ChainObserver>,
    shield_queue: Arc<ShieldQueueStore>,
    network_status: Arc<NetworkStatusStore>,
    config: Arc<Config>,
}

impl QueueShieldsPoller {
    pub fn new(
        network: Network,
        observer: Arc<dyn ChainObserver>,
        shield_queue: Arc<ShieldQueueStore>,
        network_status: Arc<NetworkStatusStore>,
        config: Arc<Config>,
    ) -> Self {
        QueueShieldsPoller {
            network,
            observer,
            shield_queue,
            network_status,
            config,
        }
    }

    /// Runs forever, sleeping `config.queue_shields_delay()` between
    /// iterations. Intended to be driven under `tokio::spawn`.
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.run_once().await {
                error!("queue-shields iteration failed for {}: {}", self.network, e);
            }
            tokio::time::sleep(self.config.queue_shields_delay()).await;
        }
    }

    /// One iteration: fetch new shields since the last scanned block and
    /// enqueue them as pending, advancing the network cursor only if the
    /// fetch succeeded. A single malformed shield is logged and skipped
    /// rather than aborting the whole batch.
    pub async fn run_once(&self) -> Result<(), anyhow::Error> {
        let from_block = match self.network_status.latest_block_scanned(self.network)? {
            Some(block) => block + 1,
            None => self.network.config().deployment_block,
        };

        let shields = self.observer.shields_from(self.network, from_block).await?;
        if shields.is_empty() {
            return Ok(());
        }

        let mut highest_block = from_block;
        for shield in &shields {
            match self.shield_queue.insert_pending(
                self.network,
                shield.txid.clone(),
                shield.hash.clone(),
                shield.blinded_commitment.clone(),
                shield.timestamp,
                shield.block_number,
            ) {
                Ok(()) => highest_block = highest_block.max(shield.block_number),
                Err(e) => warn!(
                    "failed to enqueue shield {} on {}: {}",
                    shield.txid, self.network, e
                ),
            }
        }

        self.network_status.save_status(self.network, highest_block)?;
        info!(
            "queue-shields: {} enqueued {} shield(s) up to block {}",
            self.network,
            shields.len(),
            highest_block
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::chain_observer::{MockChainObserver, ObservedShield};
    use crate::hex_types::{BlindedCommitment, CommitmentHash, Txid};

    fn harness() -> (
        Arc<MockChainObserver>,
        Arc<ShieldQueueStore>,
        Arc<NetworkStatusStore>,
        Arc<Config>,
    ) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        (
            Arc::new(MockChainObserver::new()),
            Arc::new(ShieldQueueStore::open(&db).unwrap()),
            Arc::new(NetworkStatusStore::open(&db).unwrap()),
            Arc::new(Config {
                name: String::new(),
                description: String::new(),
                queue_shields_override_delay: Some(std::time::Duration::from_millis(1)),
                validate_shields_override_delay: None,
                pending_period: std::time::Duration::from_secs(1),
                networks: vec![Network::EthereumMainnet],
                network_settings: Default::default(),
            }),
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn enqueues_new_shields_and_advances_cursor() {
        let (observer, queue, status, config) = harness();
        observer.push_shield(ObservedShield {
            txid: Txid::new("0x1"),
            hash: CommitmentHash::new("0xaa"),
            blinded_commitment: BlindedCommitment::new("0xbb"),
            timestamp: 100,
            block_number: 20_000_000,
        });

        let poller = QueueShieldsPoller::new(
            Network::EthereumMainnet,
            observer,
            queue.clone(),
            status.clone(),
            config,
        );
        poller.run_once().await.unwrap();

        assert_eq!(
            status.latest_block_scanned(Network::EthereumMainnet).unwrap(),
            Some(20_000_000)
        );
        assert!(queue
            .get(Network::EthereumMainnet, &Txid::new("0x1"), &CommitmentHash::new("0xaa"))
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn empty_batch_leaves_cursor_untouched() {
        let (observer, queue, status, config) = harness();
        let poller = QueueShieldsPoller::new(
            Network::EthereumMainnet,
            observer,
            queue,
            status.clone(),
            config,
        );
        poller.run_once().await.unwrap();
        assert_eq!(
            status.latest_block_scanned(Network::EthereumMainnet).unwrap(),
            None
        );
    }
}
