//! Chain observer adapter: pulls shield events and transaction receipts from
//! the underlying chain. The wallet/engine library that actually extracts
//! shield events from chain state is a separate collaborator; this module
//! fixes the trait boundary so the pollers have a real RPC-backed adapter to
//! drive in the default binary, and a scriptable in-memory one for tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use alloy::{
    primitives::Address,
    providers::{DynProvider, Provider},
    rpc::types::Filter,
};
use alloy::sol;
use alloy::sol_types::SolEvent;
use thiserror::Error;
use tracing::warn;

use crate::{
    hex_types::{CommitmentHash, Txid},
    network::Network,
};

#[derive(Debug, Clone)]
pub struct ObservedShield {
    pub txid: Txid,
    pub hash: CommitmentHash,
    pub blinded_commitment: crate::hex_types::BlindedCommitment,
    pub timestamp: i64,
    pub block_number: u64,
}

#[derive(Debug, Clone)]
pub struct ShieldReceipt {
    pub from_address: String,
    /// Milliseconds, re-derived from the receipt's block at validation time.
    pub timestamp: i64,
}

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("transaction {0} not found")]
    TxNotFound(Txid),
    #[error("log decode error: {0}")]
    LogDecode(String),
}

#[async_trait::async_trait]
pub trait ChainObserver: Send + Sync {
    async fn latest_block(&self, network: Network) -> Result<u64, ObserverError>;

    /// Returns a finite ordered sequence of shields starting at `from_block`.
    async fn shields_from(
        &self,
        network: Network,
        from_block: u64,
    ) -> Result<Vec<ObservedShield>, ObserverError>;

    async fn receipt(&self, network: Network, txid: &Txid) -> Result<ShieldReceipt, ObserverError>;
}

/// Derives a shield's blinded commitment off-chain. This is the wallet
/// adapter's job end to end (out of core scope); the production default is
/// a placeholder the real wallet/engine library is expected to replace.
pub trait BlindedCommitmentDeriver: Send + Sync {
    fn derive(&self, commitment_hash: &CommitmentHash, leaf_index: u64) -> crate::hex_types::BlindedCommitment;
}

pub struct KeccakPlaceholderDeriver;

impl BlindedCommitmentDeriver for KeccakPlaceholderDeriver {
    fn derive(&self, commitment_hash: &CommitmentHash, leaf_index: u64) -> crate::hex_types::BlindedCommitment {
        use alloy::primitives::keccak256;
        let mut input = commitment_hash.to_bytes().unwrap_or_default();
        input.extend_from_slice(&leaf_index.to_be_bytes());
        let digest = keccak256(&input);
        crate::hex_types::BlindedCommitment::new(hex::encode(digest))
    }
}

sol! {
    #[sol(rpc)]
    contract RailgunSmartWalletShield {
        event Shield(
            uint256 treeNumber,
            uint256 startPosition,
            bytes32[] commitmentHashes,
            uint256[] fees
        );
    }
}

/// RPC-backed observer: paginates `eth_getLogs` over the Railgun smart
/// wallet's `Shield` event, decodes each log, and resolves receipts on
/// demand for the validation poller.
pub struct RpcChainObserver {
    provider: DynProvider,
    contract: Address,
    batch_size: u64,
    deriver: Arc<dyn BlindedCommitmentDeriver>,
}

impl RpcChainObserver {
    pub fn new(provider: DynProvider, contract: Address) -> Self {
        RpcChainObserver {
            provider,
            contract,
            batch_size: 10_000,
            deriver: Arc::new(KeccakPlaceholderDeriver),
        }
    }

    pub fn with_deriver(mut self, deriver: Arc<dyn BlindedCommitmentDeriver>) -> Self {
        self.deriver = deriver;
        self
    }
}

#[async_trait::async_trait]
impl ChainObserver for RpcChainObserver {
    async fn latest_block(&self, _network: Network) -> Result<u64, ObserverError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ObserverError::Rpc(e.to_string()))
    }

    async fn shields_from(
        &self,
        _network: Network,
        from_block: u64,
    ) -> Result<Vec<ObservedShield>, ObserverError> {
        let latest = self.latest_block(_network).await?;
        if from_block > latest {
            return Ok(Vec::new());
        }

        let mut shields = Vec::new();
        let mut current = from_block;

        while current <= latest {
            let batch_end = std::cmp::min(current + self.batch_size - 1, latest);
            let filter = Filter::new()
                .address(self.contract)
                .from_block(current)
                .to_block(batch_end);

            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| ObserverError::Rpc(e.to_string()))?;

            for log in logs {
                let block_number = log.block_number.unwrap_or(0);
                let block_timestamp = log.block_timestamp.unwrap_or(0) as i64 * 1000;
                let tx_hash = log.transaction_hash.unwrap_or_default();

                match RailgunSmartWalletShield::Shield::decode_log(&log.inner) {
                    Ok(event) => {
                        for (i, hash) in event.commitmentHashes.iter().enumerate() {
                            let hash = CommitmentHash::new(hex::encode(hash));
                            let blinded = self.deriver.derive(&hash, i as u64);
                            shields.push(ObservedShield {
                                txid: Txid::new(hex::encode(tx_hash)),
                                hash,
                                blinded_commitment: blinded,
                                timestamp: block_timestamp,
                                block_number,
                            });
                        }
                    }
                    Err(e) => warn!("failed to decode Shield log: {}", e),
                }
            }

            current = batch_end + 1;
        }

        Ok(shields)
    }

    async fn receipt(&self, _network: Network, txid: &Txid) -> Result<ShieldReceipt, ObserverError> {
        let hash = txid
            .to_bytes()
            .map_err(|e| ObserverError::Rpc(e.to_string()))?;
        let hash: [u8; 32] = hash
            .try_into()
            .map_err(|_| ObserverError::TxNotFound(txid.clone()))?;

        let receipt = self
            .provider
            .get_transaction_receipt(hash.into())
            .await
            .map_err(|e| ObserverError::Rpc(e.to_string()))?
            .ok_or_else(|| ObserverError::TxNotFound(txid.clone()))?;

        let block_number = receipt
            .block_number
            .ok_or_else(|| ObserverError::TxNotFound(txid.clone()))?;
        let block = self
            .provider
            .get_block_by_number(block_number.into())
            .await
            .map_err(|e| ObserverError::Rpc(e.to_string()))?
            .ok_or_else(|| ObserverError::TxNotFound(txid.clone()))?;

        Ok(ShieldReceipt {
            from_address: format!("{:#x}", receipt.from),
            timestamp: block.header.timestamp as i64 * 1000,
        })
    }
}

/// Routes each call to the per-network observer registered for it. A single
/// `RpcChainObserver` only ever talks to the one RPC endpoint and contract it
/// was built with, so the default binary needs this dispatcher to serve
/// configurations naming more than one network.
#[derive(Default)]
pub struct MultiNetworkChainObserver {
    by_network: HashMap<Network, Arc<dyn ChainObserver>>,
}

impl MultiNetworkChainObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, network: Network, observer: Arc<dyn ChainObserver>) {
        self.by_network.insert(network, observer);
    }

    fn resolve(&self, network: Network) -> Result<&Arc<dyn ChainObserver>, ObserverError> {
        self.by_network
            .get(&network)
            .ok_or_else(|| ObserverError::Rpc(format!("no observer registered for {network}")))
    }
}

#[async_trait::async_trait]
impl ChainObserver for MultiNetworkChainObserver {
    async fn latest_block(&self, network: Network) -> Result<u64, ObserverError> {
        self.resolve(network)?.latest_block(network).await
    }

    async fn shields_from(
        &self,
        network: Network,
        from_block: u64,
    ) -> Result<Vec<ObservedShield>, ObserverError> {
        self.resolve(network)?.shields_from(network, from_block).await
    }

    async fn receipt(&self, network: Network, txid: &Txid) -> Result<ShieldReceipt, ObserverError> {
        self.resolve(network)?.receipt(network, txid).await
    }
}

/// Scriptable in-memory observer for tests and local development.
#[derive(Default)]
pub struct MockChainObserver {
    shields: Mutex<VecDeque<ObservedShield>>,
    receipts: Mutex<std::collections::HashMap<String, ShieldReceipt>>,
    latest_block: Mutex<u64>,
}

impl MockChainObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_shield(&self, shield: ObservedShield) {
        let mut block = self.latest_block.lock().unwrap();
        *block = (*block).max(shield.block_number);
        self.shields.lock().unwrap().push_back(shield);
    }

    pub fn set_receipt(&self, txid: &Txid, receipt: ShieldReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(txid.to_string(), receipt);
    }
}

#[async_trait::async_trait]
impl ChainObserver for MockChainObserver {
    async fn latest_block(&self, _network: Network) -> Result<u64, ObserverError> {
        Ok(*self.latest_block.lock().unwrap())
    }

    async fn shields_from(
        &self,
        _network: Network,
        from_block: u64,
    ) -> Result<Vec<ObservedShield>, ObserverError> {
        Ok(self
            .shields
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.block_number >= from_block)
            .cloned()
            .collect())
    }

    async fn receipt(&self, _network: Network, txid: &Txid) -> Result<ShieldReceipt, ObserverError> {
        self.receipts
            .lock()
            .unwrap()
            .get(&txid.to_string())
            .cloned()
            .ok_or_else(|| ObserverError::TxNotFound(txid.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_observer_returns_shields_from_given_block() {
        let observer = MockChainObserver::new();
        observer.push_shield(ObservedShield {
            txid: Txid::new("0x1"),
            hash: CommitmentHash::new("0xaa"),
            blinded_commitment: crate::hex_types::BlindedCommitment::new("0xbb"),
            timestamp: 100,
            block_number: 10,
        });
        observer.push_shield(ObservedShield {
            txid: Txid::new("0x2"),
            hash: CommitmentHash::new("0xcc"),
            blinded_commitment: crate::hex_types::BlindedCommitment::new("0xdd"),
            timestamp: 200,
            block_number: 20,
        });

        let shields = observer
            .shields_from(Network::EthereumMainnet, 15)
            .await
            .unwrap();
        assert_eq!(shields.len(), 1);
        assert_eq!(shields[0].block_number, 20);
        assert_eq!(observer.latest_block(Network::EthereumMainnet).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn mock_observer_resolves_configured_receipt() {
        let observer = MockChainObserver::new();
        let txid = Txid::new("0x1");
        observer.set_receipt(
            &txid,
            ShieldReceipt {
                from_address: "0xabc".to_string(),
                timestamp: 42,
            },
        );

        let receipt = observer
            .receipt(Network::EthereumMainnet, &txid)
            .await
            .unwrap();
        assert_eq!(receipt.timestamp, 42);
    }

    #[tokio::test]
    async fn multi_network_observer_routes_by_network() {
        let mainnet = Arc::new(MockChainObserver::new());
        mainnet.push_shield(ObservedShield {
            txid: Txid::new("0x1"),
            hash: CommitmentHash::new("0xaa"),
            blinded_commitment: crate::hex_types::BlindedCommitment::new("0xbb"),
            timestamp: 100,
            block_number: 5,
        });
        let polygon = Arc::new(MockChainObserver::new());
        polygon.push_shield(ObservedShield {
            txid: Txid::new("0x2"),
            hash: CommitmentHash::new("0xcc"),
            blinded_commitment: crate::hex_types::BlindedCommitment::new("0xdd"),
            timestamp: 200,
            block_number: 50,
        });

        let mut router = MultiNetworkChainObserver::new();
        router.register(Network::EthereumMainnet, mainnet.clone() as Arc<dyn ChainObserver>);
        router.register(Network::Polygon, polygon.clone() as Arc<dyn ChainObserver>);

        let mainnet_shields = router.shields_from(Network::EthereumMainnet, 0).await.unwrap();
        assert_eq!(mainnet_shields.len(), 1);
        assert_eq!(mainnet_shields[0].txid, Txid::new("0x1"));

        let polygon_shields = router.shields_from(Network::Polygon, 0).await.unwrap();
        assert_eq!(polygon_shields.len(), 1);
        assert_eq!(polygon_shields[0].txid, Txid::new("0x2"));

        let err = router.latest_block(Network::Arbitrum).await.unwrap_err();
        assert!(matches!(err, ObserverError::Rpc(_)));
    }
}
