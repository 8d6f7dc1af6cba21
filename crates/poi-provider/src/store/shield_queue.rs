//! Durable per-network set of shields keyed by `(network, txid, hash)`;
//! `status` governs the lifecycle. Backed by `sled`, `bincode`-encoded,
//! rather than an in-memory map, so durability across a restart is a real
//! property and not just a testing convenience.
//!
//! A secondary index keyed by `(network, timestamp, txid, hash)` is
//! maintained for rows still `Pending`, so `getPendingShields` can return
//! timestamp-ordered results without a full table scan; the index entry is
//! removed the moment a row leaves `Pending`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    hex_types::{BlindedCommitment, CommitmentHash, Txid},
    network::Network,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShieldStatus {
    Pending,
    Allowed,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldQueueItem {
    pub network: Network,
    pub txid: Txid,
    pub hash: CommitmentHash,
    pub blinded_commitment: BlindedCommitment,
    pub timestamp: i64,
    pub block_number: u64,
    pub status: ShieldStatus,
    pub last_validated_timestamp: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ShieldQueueError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] Box<bincode::ErrorKind>),
    #[error(
        "status regression: shield ({0}, {1}) is already {2:?}, cannot transition to {3:?}"
    )]
    StatusRegression(String, String, ShieldStatus, ShieldStatus),
}

pub struct ShieldQueueStore {
    items: sled::Tree,
    pending_index: sled::Tree,
}

fn primary_key(network: Network, txid: &Txid, hash: &CommitmentHash) -> Vec<u8> {
    format!("{}|{}|{}", network.as_str(), txid, hash).into_bytes()
}

fn pending_index_key(network: Network, timestamp: i64, primary_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8 + 8 + primary_key.len());
    key.push(network as u8);
    // Bias so negative timestamps still sort correctly under big-endian bytes.
    key.extend_from_slice(&(timestamp as u64 ^ (1u64 << 63)).to_be_bytes());
    key.extend_from_slice(primary_key);
    key
}

impl ShieldQueueStore {
    pub fn open(db: &sled::Db) -> Result<Self, ShieldQueueError> {
        Ok(ShieldQueueStore {
            items: db.open_tree("shields")?,
            pending_index: db.open_tree("shields_pending_index")?,
        })
    }

    /// Upsert with `status=Pending`. Idempotent: a duplicate insert on an
    /// already-present `(network, txid, hash)` is a no-op, and never
    /// overwrites a row already in a terminal state.
    pub fn insert_pending(
        &self,
        network: Network,
        txid: Txid,
        hash: CommitmentHash,
        blinded_commitment: BlindedCommitment,
        timestamp: i64,
        block_number: u64,
    ) -> Result<(), ShieldQueueError> {
        let key = primary_key(network, &txid, &hash);

        if self.items.get(&key)?.is_some() {
            return Ok(());
        }

        let item = ShieldQueueItem {
            network,
            txid,
            hash,
            blinded_commitment,
            timestamp,
            block_number,
            status: ShieldStatus::Pending,
            last_validated_timestamp: None,
        };

        self.items.insert(&key, bincode::serialize(&item)?)?;
        self.pending_index
            .insert(pending_index_key(network, timestamp, &key), key.clone())?;
        Ok(())
    }

    /// Returns up to `limit` rows where `status = Pending` and
    /// `timestamp <= end_timestamp`, ordered by `timestamp` ascending.
    pub fn get_pending_shields(
        &self,
        network: Network,
        end_timestamp: i64,
        limit: usize,
    ) -> Result<Vec<ShieldQueueItem>, ShieldQueueError> {
        let prefix = [network as u8];
        let mut out = Vec::new();

        for entry in self.pending_index.scan_prefix(prefix) {
            let (index_key, primary) = entry?;
            let ts_bytes: [u8; 8] = index_key[1..9].try_into().expect("8-byte timestamp");
            let biased = u64::from_be_bytes(ts_bytes);
            let timestamp = (biased ^ (1u64 << 63)) as i64;

            if timestamp > end_timestamp {
                break;
            }

            if let Some(raw) = self.items.get(&primary)? {
                let item: ShieldQueueItem = bincode::deserialize(&raw)?;
                if item.status == ShieldStatus::Pending {
                    out.push(item);
                }
            }

            if out.len() >= limit {
                break;
            }
        }

        Ok(out)
    }

    /// Transition `Pending -> {Allowed, Blocked}`. Idempotent at the target
    /// status; an attempt to regress a terminal status is fatal.
    pub fn update_shield_status(
        &self,
        network: Network,
        txid: &Txid,
        hash: &CommitmentHash,
        new_status: ShieldStatus,
        validated_at: i64,
    ) -> Result<(), ShieldQueueError> {
        let key = primary_key(network, txid, hash);

        let Some(raw) = self.items.get(&key)? else {
            return Ok(());
        };
        let mut item: ShieldQueueItem = bincode::deserialize(&raw)?;

        if item.status == new_status {
            return Ok(());
        }

        if item.status != ShieldStatus::Pending {
            return Err(ShieldQueueError::StatusRegression(
                txid.to_string(),
                hash.to_string(),
                item.status,
                new_status,
            ));
        }

        item.status = new_status;
        item.last_validated_timestamp = Some(validated_at);
        self.items.insert(&key, bincode::serialize(&item)?)?;
        self.pending_index
            .remove(pending_index_key(network, item.timestamp, &key))?;
        Ok(())
    }

    pub fn get(
        &self,
        network: Network,
        txid: &Txid,
        hash: &CommitmentHash,
    ) -> Result<Option<ShieldQueueItem>, ShieldQueueError> {
        let key = primary_key(network, txid, hash);
        match self.items.get(&key)? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Test fixture only: wipes every row across every network.
    pub fn delete_all_items_dangerous(&self) -> Result<(), ShieldQueueError> {
        self.items.clear()?;
        self.pending_index.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ShieldQueueStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        ShieldQueueStore::open(&db).unwrap()
    }

    fn txid(s: &str) -> Txid {
        Txid::new(s)
    }

    #[test]
    fn insert_pending_is_idempotent() {
        let store = store();
        store
            .insert_pending(
                Network::EthereumMainnet,
                txid("0x1"),
                CommitmentHash::new("0xaa"),
                BlindedCommitment::new("0xbb"),
                100,
                1,
            )
            .unwrap();
        store
            .insert_pending(
                Network::EthereumMainnet,
                txid("0x1"),
                CommitmentHash::new("0xaa"),
                BlindedCommitment::new("0xcc"),
                999,
                999,
            )
            .unwrap();

        let item = store
            .get(Network::EthereumMainnet, &txid("0x1"), &CommitmentHash::new("0xaa"))
            .unwrap()
            .unwrap();
        assert_eq!(item.timestamp, 100);
        assert_eq!(item.blinded_commitment, BlindedCommitment::new("0xbb"));
    }

    #[test]
    fn empty_queue_returns_empty_sequence() {
        let store = store();
        let rows = store
            .get_pending_shields(Network::EthereumMainnet, i64::MAX, 100)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn age_gating_returns_only_old_enough_shields() {
        let store = store();
        let now = 1_000_000_000i64;
        let ten_days_ms = 10 * 24 * 60 * 60 * 1000;
        let seven_days_ms = 7 * 24 * 60 * 60 * 1000;

        store
            .insert_pending(
                Network::EthereumMainnet,
                txid("0xnew"),
                CommitmentHash::new("0x01"),
                BlindedCommitment::new("0x01"),
                now,
                1,
            )
            .unwrap();
        store
            .insert_pending(
                Network::EthereumMainnet,
                txid("0xold"),
                CommitmentHash::new("0x02"),
                BlindedCommitment::new("0x02"),
                now - ten_days_ms,
                1,
            )
            .unwrap();

        let rows = store
            .get_pending_shields(Network::EthereumMainnet, now - seven_days_ms, 100)
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].txid, txid("0xold"));
        assert_eq!(rows[0].status, ShieldStatus::Pending);
        assert_eq!(rows[0].last_validated_timestamp, None);
    }

    #[test]
    fn status_transition_removes_row_from_pending_index() {
        let store = store();
        store
            .insert_pending(
                Network::EthereumMainnet,
                txid("0x1"),
                CommitmentHash::new("0xaa"),
                BlindedCommitment::new("0xbb"),
                0,
                1,
            )
            .unwrap();

        store
            .update_shield_status(
                Network::EthereumMainnet,
                &txid("0x1"),
                &CommitmentHash::new("0xaa"),
                ShieldStatus::Allowed,
                10,
            )
            .unwrap();

        let rows = store
            .get_pending_shields(Network::EthereumMainnet, i64::MAX, 100)
            .unwrap();
        assert!(rows.is_empty());

        let item = store
            .get(Network::EthereumMainnet, &txid("0x1"), &CommitmentHash::new("0xaa"))
            .unwrap()
            .unwrap();
        assert_eq!(item.status, ShieldStatus::Allowed);
        assert_eq!(item.last_validated_timestamp, Some(10));
    }

    #[test]
    fn repeated_transition_to_same_terminal_status_is_idempotent() {
        let store = store();
        store
            .insert_pending(
                Network::EthereumMainnet,
                txid("0x1"),
                CommitmentHash::new("0xaa"),
                BlindedCommitment::new("0xbb"),
                0,
                1,
            )
            .unwrap();
        store
            .update_shield_status(
                Network::EthereumMainnet,
                &txid("0x1"),
                &CommitmentHash::new("0xaa"),
                ShieldStatus::Allowed,
                10,
            )
            .unwrap();
        store
            .update_shield_status(
                Network::EthereumMainnet,
                &txid("0x1"),
                &CommitmentHash::new("0xaa"),
                ShieldStatus::Allowed,
                20,
            )
            .unwrap();
    }

    #[test]
    fn regression_attempt_is_fatal() {
        let store = store();
        store
            .insert_pending(
                Network::EthereumMainnet,
                txid("0x1"),
                CommitmentHash::new("0xaa"),
                BlindedCommitment::new("0xbb"),
                0,
                1,
            )
            .unwrap();
        store
            .update_shield_status(
                Network::EthereumMainnet,
                &txid("0x1"),
                &CommitmentHash::new("0xaa"),
                ShieldStatus::Allowed,
                10,
            )
            .unwrap();

        let err = store
            .update_shield_status(
                Network::EthereumMainnet,
                &txid("0x1"),
                &CommitmentHash::new("0xaa"),
                ShieldStatus::Blocked,
                20,
            )
            .unwrap_err();
        assert!(matches!(err, ShieldQueueError::StatusRegression(..)));
    }
}
