//! Per-list set of signed blocked-shield records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hex_types::{BlindedCommitment, CommitmentHash, ListKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedBlockedShield {
    pub commitment_hash: CommitmentHash,
    pub blinded_commitment: BlindedCommitment,
    pub block_reason: Option<String>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum BlockedShieldError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] Box<bincode::ErrorKind>),
}

pub struct BlockedShieldStore {
    tree: sled::Tree,
}

fn key(list_key: &ListKey, commitment_hash: &CommitmentHash) -> Vec<u8> {
    format!("{}|{}", list_key.as_str(), commitment_hash).into_bytes()
}

impl BlockedShieldStore {
    pub fn open(db: &sled::Db) -> Result<Self, BlockedShieldError> {
        Ok(BlockedShieldStore {
            tree: db.open_tree("blocked_shields")?,
        })
    }

    pub fn append(
        &self,
        list_key: &ListKey,
        record: SignedBlockedShield,
    ) -> Result<(), BlockedShieldError> {
        self.tree.insert(
            key(list_key, &record.commitment_hash),
            bincode::serialize(&record)?,
        )?;
        Ok(())
    }

    pub fn contains(
        &self,
        list_key: &ListKey,
        commitment_hash: &CommitmentHash,
    ) -> Result<bool, BlockedShieldError> {
        Ok(self.tree.contains_key(key(list_key, commitment_hash))?)
    }

    pub fn len(&self, list_key: &ListKey) -> Result<u64, BlockedShieldError> {
        let prefix = format!("{}|", list_key.as_str());
        Ok(self.tree.scan_prefix(prefix).count() as u64)
    }

    pub fn synced_since(
        &self,
        list_key: &ListKey,
        limit: usize,
    ) -> Result<Vec<SignedBlockedShield>, BlockedShieldError> {
        let prefix = format!("{}|", list_key.as_str());
        let mut out = Vec::new();
        for entry in self.tree.scan_prefix(prefix).take(limit) {
            let (_, raw) = entry?;
            out.push(bincode::deserialize(&raw)?);
        }
        Ok(out)
    }
}
