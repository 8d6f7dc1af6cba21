//! Per-network cursor of the highest block scanned.
//!
//! Single-row-per-network key-value store. `save_status` rejects values
//! less than the current one so the cursor only ever moves forward.

use thiserror::Error;

use crate::network::Network;

#[derive(Debug, Error)]
pub enum NetworkStatusError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error(
        "status regression: network {0} latest_block_scanned is {1}, refusing to set {2}"
    )]
    Regression(Network, u64, u64),
}

pub struct NetworkStatusStore {
    tree: sled::Tree,
}

impl NetworkStatusStore {
    pub fn open(db: &sled::Db) -> Result<Self, NetworkStatusError> {
        Ok(NetworkStatusStore {
            tree: db.open_tree("network_status")?,
        })
    }

    pub fn latest_block_scanned(&self, network: Network) -> Result<Option<u64>, NetworkStatusError> {
        match self.tree.get(network.as_str())? {
            Some(raw) => Ok(Some(u64::from_be_bytes(
                raw.as_ref().try_into().expect("8-byte block number"),
            ))),
            None => Ok(None),
        }
    }

    pub fn save_status(&self, network: Network, block: u64) -> Result<(), NetworkStatusError> {
        if let Some(current) = self.latest_block_scanned(network)? {
            if block < current {
                return Err(NetworkStatusError::Regression(network, current, block));
            }
        }

        self.tree
            .insert(network.as_str(), &block.to_be_bytes())?;
        Ok(())
    }
}
