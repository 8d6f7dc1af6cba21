//! Per-list append-only log of signed events, dense integer-indexed.
//!
//! The single-writer invariant over a given `listKey`'s log is enforced by
//! the event queue coordinator, not by this store; this store only
//! guarantees that `append` refuses anything but the next dense index.

use ed25519_dalek::Signature;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    hex_types::{BlindedCommitment, ListKey},
    signer::Proof,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPoiEvent {
    pub index: u64,
    pub blinded_commitment_starting_index: u64,
    pub blinded_commitments: Vec<BlindedCommitment>,
    pub proof: Option<Proof>,
    pub signature: Vec<u8>,
}

impl SignedPoiEvent {
    pub fn signature(&self) -> Option<Signature> {
        let bytes: [u8; 64] = self.signature.clone().try_into().ok()?;
        Some(Signature::from_bytes(&bytes))
    }
}

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] Box<bincode::ErrorKind>),
    #[error(
        "non-dense index: log for list {0} has length {1}, refusing to append index {2}"
    )]
    NonDenseIndex(ListKey, u64, u64),
    #[error(
        "starting-index mismatch: expected {expected}, event carries {actual}"
    )]
    StartingIndexMismatch { expected: u64, actual: u64 },
}

pub struct EventLogStore {
    tree: sled::Tree,
}

fn key(list_key: &ListKey, index: u64) -> Vec<u8> {
    let mut k = list_key.as_str().as_bytes().to_vec();
    k.push(b'|');
    k.extend_from_slice(&index.to_be_bytes());
    k
}

impl EventLogStore {
    pub fn open(db: &sled::Db) -> Result<Self, EventLogError> {
        Ok(EventLogStore {
            tree: db.open_tree("poi_event_log")?,
        })
    }

    /// Number of events currently stored for `list_key` (== next dense index).
    pub fn len(&self, list_key: &ListKey) -> Result<u64, EventLogError> {
        let prefix = {
            let mut p = list_key.as_str().as_bytes().to_vec();
            p.push(b'|');
            p
        };
        Ok(self.tree.scan_prefix(prefix).count() as u64)
    }

    pub fn last(&self, list_key: &ListKey) -> Result<Option<SignedPoiEvent>, EventLogError> {
        let n = self.len(list_key)?;
        if n == 0 {
            return Ok(None);
        }
        self.get(list_key, n - 1)
    }

    pub fn get(
        &self,
        list_key: &ListKey,
        index: u64,
    ) -> Result<Option<SignedPoiEvent>, EventLogError> {
        match self.tree.get(key(list_key, index))? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn range(
        &self,
        list_key: &ListKey,
        start: u64,
        count: u64,
    ) -> Result<Vec<SignedPoiEvent>, EventLogError> {
        let mut out = Vec::new();
        for i in start..start + count {
            match self.get(list_key, i)? {
                Some(event) => out.push(event),
                None => break,
            }
        }
        Ok(out)
    }

    /// Appends `event` iff `event.index` is exactly the current log length
    /// and the starting-index chain is consistent with the prior event.
    /// Any violation is fatal. Continuing to append past it would silently
    /// corrupt downstream proofs that rely on a dense, contiguous log.
    pub fn append(
        &self,
        list_key: &ListKey,
        event: SignedPoiEvent,
    ) -> Result<(), EventLogError> {
        let n = self.len(list_key)?;
        if event.index != n {
            return Err(EventLogError::NonDenseIndex(list_key.clone(), n, event.index));
        }

        let expected_starting_index = match self.last(list_key)? {
            Some(prev) => prev.blinded_commitment_starting_index + prev.blinded_commitments.len() as u64,
            None => 0,
        };
        if event.blinded_commitment_starting_index != expected_starting_index {
            return Err(EventLogError::StartingIndexMismatch {
                expected: expected_starting_index,
                actual: event.blinded_commitment_starting_index,
            });
        }

        self.tree
            .insert(key(list_key, event.index), bincode::serialize(&event)?)?;
        Ok(())
    }
}
