//! Poller that re-checks pending shields once they've aged past the
//! configured pending period, runs them through the policy gate, and queues
//! the result for signing.
//!
//! Same cooperative sleep-then-iterate framing as the shield queue poller,
//! on its own cadence: it never falls back to the queue poller's override
//! if its own is unset. Each iteration fans a batch of up to 100 pending
//! shields out concurrently with `futures::future::join_all`, and a single
//! row's failure never poisons the rest of the batch.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{error, warn};

use crate::{
    chain_observer::ChainObserver,
    config::Config,
    coordinator::EventQueueCoordinator,
    network::Network,
    policy::{PolicyDecision, PolicyGate},
    signer::Signer,
    store::{BlockedShieldStore, SignedBlockedShield, ShieldQueueStore, ShieldStatus},
};

const PENDING_BATCH_SIZE: usize = 100;

pub struct ValidateShieldsPoller {
    network: Network,
    observer: Arc<dyn ChainObserver>,
    shield_queue: Arc<ShieldQueueStore>,
    blocked: Arc<BlockedShieldStore>,
    signer: Arc<dyn Signer>,
    policy: Arc<dyn PolicyGate>,
    coordinator: Arc<EventQueueCoordinator>,
    config: Arc<Config>,
}

impl ValidateShieldsPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: Network,
        observer: Arc<dyn ChainObserver>,
        shield_queue: Arc<ShieldQueueStore>,
        blocked: Arc<BlockedShieldStore>,
        signer: Arc<dyn Signer>,
        policy: Arc<dyn PolicyGate>,
        coordinator: Arc<EventQueueCoordinator>,
        config: Arc<Config>,
    ) -> Self {
        ValidateShieldsPoller {
            network,
            observer,
            shield_queue,
            blocked,
            signer,
            policy,
            coordinator,
            config,
        }
    }

    pub async fn run(&self) {
        loop {
            if let Err(e) = self.run_once().await {
                error!(
                    "validate-shields iteration failed for {}: {}",
                    self.network, e
                );
            }
            tokio::time::sleep(self.config.validate_shields_delay()).await;
        }
    }

    pub async fn run_once(&self) -> Result<(), anyhow::Error> {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let end_timestamp = now_ms - self.config.pending_period.as_millis() as i64;

        let pending = self.shield_queue.get_pending_shields(
            self.network,
            end_timestamp,
            PENDING_BATCH_SIZE,
        )?;
        if pending.is_empty() {
            return Ok(());
        }

        let futures = pending
            .into_iter()
            .map(|item| self.validate_one(item, end_timestamp));
        futures::future::join_all(futures).await;

        // Drain whatever the coordinator accumulated this pass; a transient
        // failure leaves the event at the head of the queue for next time.
        // Once the coordinator halts (a log invariant violation), every
        // later drain returns the same error without retrying; log it at a
        // lower level than the first occurrence, which the coordinator
        // already reported.
        match self.coordinator.drain().await {
            Ok(_) => {}
            Err(crate::coordinator::CoordinatorError::Halted) => {
                warn!(
                    "POI event coordinator for {} is halted; not retrying until restarted",
                    self.network
                );
            }
            Err(e) => {
                error!("failed to drain POI event queue for {}: {}", self.network, e);
            }
        }

        Ok(())
    }

    async fn validate_one(
        &self,
        item: crate::store::ShieldQueueItem,
        end_timestamp: i64,
    ) {
        let receipt = match self.observer.receipt(self.network, &item.txid).await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    "failed to fetch receipt for shield {} on {}: {}",
                    item.txid, self.network, e
                );
                return;
            }
        };

        // The re-derived timestamp may differ from the one recorded at
        // enqueue time; if it still isn't old enough, leave the row Pending.
        if receipt.timestamp > end_timestamp {
            return;
        }

        let from_address = receipt.from_address.to_lowercase();
        let decision = self
            .policy
            .evaluate(self.network, item.txid.as_str(), &from_address, receipt.timestamp)
            .await;

        let validated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;

        let (new_status, result) = match decision {
            PolicyDecision::Allow => (ShieldStatus::Allowed, self.handle_allow(&item).await),
            PolicyDecision::Block { reason } => {
                (ShieldStatus::Blocked, self.handle_block(&item, reason).await)
            }
        };

        if let Err(e) = result {
            warn!(
                "failed to finalize validation for shield {} on {}: {}",
                item.txid, self.network, e
            );
            return;
        }

        if let Err(e) = self.shield_queue.update_shield_status(
            self.network,
            &item.txid,
            &item.hash,
            new_status,
            validated_at,
        ) {
            error!(
                "status transition failed for shield {} on {}: {}",
                item.txid, self.network, e
            );
        }
    }

    async fn handle_allow(&self, item: &crate::store::ShieldQueueItem) -> anyhow::Result<()> {
        self.coordinator
            .queue_unsigned_poi_shield_event(item.hash.clone(), item.blinded_commitment.clone())
            .await;
        Ok(())
    }

    async fn handle_block(
        &self,
        item: &crate::store::ShieldQueueItem,
        reason: Option<String>,
    ) -> anyhow::Result<()> {
        let list_key = self.signer.list_key();
        let signature = self.signer.sign_blocked_shield(
            &item.hash,
            &item.blinded_commitment,
            reason.as_deref(),
        )?;
        self.blocked.append(
            &list_key,
            SignedBlockedShield {
                commitment_hash: item.hash.clone(),
                blinded_commitment: item.blinded_commitment.clone(),
                block_reason: reason,
                signature: signature.to_bytes().to_vec(),
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_observer::{MockChainObserver, ShieldReceipt};
    use crate::hex_types::{BlindedCommitment, CommitmentHash, Txid};
    use crate::policy::{AddressDenylistPolicy, AllowAllPolicy};
    use crate::signer::KeypairSigner;
    use crate::store::EventLogStore;

    fn seed_pending(queue: &ShieldQueueStore, txid: &str) {
        queue
            .insert_pending(
                Network::EthereumMainnet,
                Txid::new(txid),
                CommitmentHash::new("0xaa"),
                BlindedCommitment::new("0xbb"),
                0,
                1,
            )
            .unwrap();
    }

    #[tokio::test]
    async fn allowed_shield_transitions_status_and_enqueues_event() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let observer = Arc::new(MockChainObserver::new());
        let queue = Arc::new(ShieldQueueStore::open(&db).unwrap());
        let blocked = Arc::new(BlockedShieldStore::open(&db).unwrap());
        let signer = Arc::new(KeypairSigner::generate());
        let log = Arc::new(EventLogStore::open(&db).unwrap());
        let coordinator = Arc::new(EventQueueCoordinator::new(
            signer.list_key(),
            signer.clone() as Arc<dyn Signer>,
            log.clone(),
        ));
        let config = Arc::new(Config {
            name: String::new(),
            description: String::new(),
            queue_shields_override_delay: None,
            validate_shields_override_delay: Some(std::time::Duration::from_millis(1)),
            pending_period: std::time::Duration::from_secs(0),
            networks: vec![Network::EthereumMainnet],
            network_settings: Default::default(),
        });

        seed_pending(&queue, "0x1");
        observer.set_receipt(
            &Txid::new("0x1"),
            ShieldReceipt {
                from_address: "0xGOOD".to_string(),
                timestamp: -1_000_000,
            },
        );

        let poller = ValidateShieldsPoller::new(
            Network::EthereumMainnet,
            observer,
            queue.clone(),
            blocked,
            signer.clone() as Arc<dyn Signer>,
            Arc::new(AllowAllPolicy) as Arc<dyn PolicyGate>,
            coordinator.clone(),
            config,
        );
        poller.run_once().await.unwrap();

        let item = queue
            .get(Network::EthereumMainnet, &Txid::new("0x1"), &CommitmentHash::new("0xaa"))
            .unwrap()
            .unwrap();
        assert_eq!(item.status, ShieldStatus::Allowed);
        assert_eq!(log.len(&signer.list_key()).unwrap(), 1);
    }

    #[tokio::test]
    async fn blocked_shield_is_signed_and_recorded() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let observer = Arc::new(MockChainObserver::new());
        let queue = Arc::new(ShieldQueueStore::open(&db).unwrap());
        let blocked = Arc::new(BlockedShieldStore::open(&db).unwrap());
        let signer = Arc::new(KeypairSigner::generate());
        let log = Arc::new(EventLogStore::open(&db).unwrap());
        let coordinator = Arc::new(EventQueueCoordinator::new(
            signer.list_key(),
            signer.clone() as Arc<dyn Signer>,
            log,
        ));
        let config = Arc::new(Config {
            name: String::new(),
            description: String::new(),
            queue_shields_override_delay: None,
            validate_shields_override_delay: Some(std::time::Duration::from_millis(1)),
            pending_period: std::time::Duration::from_secs(0),
            networks: vec![Network::EthereumMainnet],
            network_settings: Default::default(),
        });

        seed_pending(&queue, "0x1");
        observer.set_receipt(
            &Txid::new("0x1"),
            ShieldReceipt {
                from_address: "0xBAD".to_string(),
                timestamp: -1_000_000,
            },
        );

        let policy = Arc::new(AddressDenylistPolicy::new(
            vec!["0xbad".to_string()],
            "sanctioned",
        )) as Arc<dyn PolicyGate>;

        let poller = ValidateShieldsPoller::new(
            Network::EthereumMainnet,
            observer,
            queue.clone(),
            blocked.clone(),
            signer.clone() as Arc<dyn Signer>,
            policy,
            coordinator,
            config,
        );
        poller.run_once().await.unwrap();

        let item = queue
            .get(Network::EthereumMainnet, &Txid::new("0x1"), &CommitmentHash::new("0xaa"))
            .unwrap()
            .unwrap();
        assert_eq!(item.status, ShieldStatus::Blocked);
        assert!(blocked
            .contains(&signer.list_key(), &CommitmentHash::new("0xaa"))
            .unwrap());
    }

    #[tokio::test]
    async fn still_young_shield_is_left_pending() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let observer = Arc::new(MockChainObserver::new());
        let queue = Arc::new(ShieldQueueStore::open(&db).unwrap());
        let blocked = Arc::new(BlockedShieldStore::open(&db).unwrap());
        let signer = Arc::new(KeypairSigner::generate());
        let log = Arc::new(EventLogStore::open(&db).unwrap());
        let coordinator = Arc::new(EventQueueCoordinator::new(
            signer.list_key(),
            signer.clone() as Arc<dyn Signer>,
            log,
        ));
        let config = Arc::new(Config {
            name: String::new(),
            description: String::new(),
            queue_shields_override_delay: None,
            validate_shields_override_delay: Some(std::time::Duration::from_millis(1)),
            pending_period: std::time::Duration::from_secs(60 * 60 * 24 * 7),
            networks: vec![Network::EthereumMainnet],
            network_settings: Default::default(),
        });

        seed_pending(&queue, "0x1");
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64;
        observer.set_receipt(
            &Txid::new("0x1"),
            ShieldReceipt {
                from_address: "0xgood".to_string(),
                timestamp: now_ms,
            },
        );

        let poller = ValidateShieldsPoller::new(
            Network::EthereumMainnet,
            observer,
            queue.clone(),
            blocked,
            signer.clone() as Arc<dyn Signer>,
            Arc::new(AllowAllPolicy) as Arc<dyn PolicyGate>,
            coordinator,
            config,
        );
        poller.run_once().await.unwrap();

        let item = queue
            .get(Network::EthereumMainnet, &Txid::new("0x1"), &CommitmentHash::new("0xaa"))
            .unwrap()
            .unwrap();
        assert_eq!(item.status, ShieldStatus::Pending);
    }
}
