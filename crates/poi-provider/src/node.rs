//! List-provider node wiring and lifecycle.
//!
//! `ListProviderNode::init` is the one place a given node instance is
//! allowed to construct its pollers and the event queue coordinator they
//! share; calling it twice is rejected rather than silently re-wiring.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::{
    chain_observer::ChainObserver,
    config::Config,
    coordinator::EventQueueCoordinator,
    network::Network,
    policy::PolicyGate,
    pollers::{queue_shields::QueueShieldsPoller, validate_shields::ValidateShieldsPoller},
    signer::Signer,
    store::{BlockedShieldStore, EventLogStore, NetworkStatusStore, ShieldQueueStore},
};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node for list {0} is already initialized")]
    AlreadyInitialized(String),
    #[error("node has not been initialized; call init() before startPolling()")]
    NotInitialized,
}

pub struct NodeStores {
    pub shield_queue: Arc<ShieldQueueStore>,
    pub network_status: Arc<NetworkStatusStore>,
    pub event_log: Arc<EventLogStore>,
    pub blocked: Arc<BlockedShieldStore>,
}

struct RunningNetwork {
    queue_poller: Arc<QueueShieldsPoller>,
    validate_poller: Arc<ValidateShieldsPoller>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

/// Wires together the signer, stores, chain observer and policy gate for one
/// list, and owns the lifecycle of its per-network pollers.
pub struct ListProviderNode {
    signer: Arc<dyn Signer>,
    stores: NodeStores,
    observer: Arc<dyn ChainObserver>,
    policy: Arc<dyn PolicyGate>,
    config: Arc<Config>,
    coordinator: Option<Arc<EventQueueCoordinator>>,
    networks: Vec<RunningNetwork>,
    initialized: bool,
}

impl ListProviderNode {
    pub fn new(
        signer: Arc<dyn Signer>,
        stores: NodeStores,
        observer: Arc<dyn ChainObserver>,
        policy: Arc<dyn PolicyGate>,
        config: Arc<Config>,
    ) -> Self {
        ListProviderNode {
            signer,
            stores,
            observer,
            policy,
            config,
            coordinator: None,
            networks: Vec::new(),
            initialized: false,
        }
    }

    /// Must precede `start_polling`. Constructs the event queue coordinator
    /// and one queue/validate poller pair per configured network, all
    /// sharing that single coordinator so there is one writer for this
    /// list's event log no matter how many networks are configured. Rejects
    /// a second call.
    pub fn init(&mut self) -> Result<(), NodeError> {
        if self.initialized {
            return Err(NodeError::AlreadyInitialized(self.signer.list_key().to_string()));
        }

        let coordinator = Arc::new(EventQueueCoordinator::new(
            self.signer.list_key(),
            self.signer.clone(),
            self.stores.event_log.clone(),
        ));

        for &network in &self.config.networks {
            let queue_poller = Arc::new(QueueShieldsPoller::new(
                network,
                self.observer.clone(),
                self.stores.shield_queue.clone(),
                self.stores.network_status.clone(),
                self.config.clone(),
            ));
            let validate_poller = Arc::new(ValidateShieldsPoller::new(
                network,
                self.observer.clone(),
                self.stores.shield_queue.clone(),
                self.stores.blocked.clone(),
                self.signer.clone(),
                self.policy.clone(),
                coordinator.clone(),
                self.config.clone(),
            ));
            self.networks.push(RunningNetwork {
                queue_poller,
                validate_poller,
                tasks: Vec::new(),
            });
        }

        self.coordinator = Some(coordinator);
        self.initialized = true;
        info!(
            "initialized list-provider node {} for {} network(s)",
            self.signer.list_key(),
            self.networks.len()
        );
        Ok(())
    }

    /// Spawns the queue and validate pollers as independent `tokio` tasks
    /// per network. Each task owns its own sleep-then-iterate cycle and
    /// never overlaps with its own previous iteration.
    pub fn start_polling(&mut self) -> Result<(), NodeError> {
        if !self.initialized {
            return Err(NodeError::NotInitialized);
        }

        for running in &mut self.networks {
            let queue_poller = running.queue_poller.clone();
            running
                .tasks
                .push(tokio::spawn(async move { queue_poller.run().await }));

            let validate_poller = running.validate_poller.clone();
            running
                .tasks
                .push(tokio::spawn(async move { validate_poller.run().await }));
        }

        Ok(())
    }

    pub fn networks(&self) -> impl Iterator<Item = Network> + '_ {
        self.config.networks.iter().copied()
    }
}

impl Drop for ListProviderNode {
    fn drop(&mut self) {
        for running in &self.networks {
            for task in &running.tasks {
                task.abort();
            }
        }
    }
}
