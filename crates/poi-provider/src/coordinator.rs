//! Event queue coordinator.
//!
//! Owns the single-writer invariant over the POI event log for one
//! `listKey`. An explicit, dependency-injected object constructed once at
//! bootstrap and shared by every poller that wants to append to this list,
//! so there is exactly one writer no matter how many networks feed it.
//!
//! Unsigned events are buffered in a FIFO queue. Draining the queue signs
//! and appends events one at a time under a dedicated write lock that spans
//! the entire read-modify-append (current length, previous event, sign,
//! append); two concurrent drains cannot observe the same log length and
//! race to append the same index.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::{
    hex_types::{BlindedCommitment, CommitmentHash, ListKey},
    signer::{Proof, Signer},
    store::{EventLogError, EventLogStore, SignedPoiEvent},
};

#[derive(Debug, Clone)]
pub enum UnsignedPoiEvent {
    Shield {
        commitment_hash: CommitmentHash,
        blinded_commitment: BlindedCommitment,
    },
    Transact {
        blinded_commitments: Vec<BlindedCommitment>,
        proof: Proof,
    },
}

pub struct EventQueueCoordinator {
    list_key: ListKey,
    signer: Arc<dyn Signer>,
    log: Arc<EventLogStore>,
    queue: Mutex<VecDeque<UnsignedPoiEvent>>,
    /// Held across the full read-modify-append in `sign_and_append`, not
    /// just the queue pop/push, so concurrent `drain` calls serialize.
    write_lock: Mutex<()>,
    /// Set once a drain hits a log invariant violation. Further drains
    /// refuse to run rather than risk appending past a corrupted log.
    halted: AtomicBool,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("event log error: {0}")]
    Log(#[from] EventLogError),
    #[error("signer error: {0}")]
    Signer(#[from] crate::signer::SignerError),
    #[error("coordinator halted after a log invariant violation")]
    Halted,
}

impl CoordinatorError {
    /// Invariant violations in the log mean the next write would be built
    /// on a corrupted view of it; everything else (I/O, signing) is safe to
    /// retry on the next drain.
    fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Log(
                EventLogError::NonDenseIndex(..) | EventLogError::StartingIndexMismatch { .. }
            )
        )
    }
}

impl EventQueueCoordinator {
    pub fn new(list_key: ListKey, signer: Arc<dyn Signer>, log: Arc<EventLogStore>) -> Self {
        EventQueueCoordinator {
            list_key,
            signer,
            log,
            queue: Mutex::new(VecDeque::new()),
            write_lock: Mutex::new(()),
            halted: AtomicBool::new(false),
        }
    }

    pub fn list_key(&self) -> &ListKey {
        &self.list_key
    }

    /// Whether a prior drain hit a fatal log invariant violation and halted.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub async fn queue_unsigned_poi_shield_event(
        &self,
        commitment_hash: CommitmentHash,
        blinded_commitment: BlindedCommitment,
    ) {
        self.queue.lock().await.push_back(UnsignedPoiEvent::Shield {
            commitment_hash,
            blinded_commitment,
        });
    }

    pub async fn queue_unsigned_poi_transact_event(
        &self,
        blinded_commitments: Vec<BlindedCommitment>,
        proof: Proof,
    ) {
        self.queue
            .lock()
            .await
            .push_back(UnsignedPoiEvent::Transact {
                blinded_commitments,
                proof,
            });
    }

    /// Drains the internal queue in FIFO order, signing and appending each
    /// event to the log. A transient failure (signer, I/O) returns the
    /// event to the head of the queue so a later pass can retry it. A log
    /// invariant violation halts the coordinator instead of requeuing:
    /// continuing to append would build on a view of the log that is
    /// already known to be inconsistent.
    pub async fn drain(&self) -> Result<usize, CoordinatorError> {
        if self.is_halted() {
            return Err(CoordinatorError::Halted);
        }

        // Held for the whole drain, not just each pop/push, so two pollers
        // draining the same coordinator concurrently run one after another
        // instead of both reading the log's current length at once.
        let _write_guard = self.write_lock.lock().await;
        let mut appended = 0;

        loop {
            let next = {
                let mut queue = self.queue.lock().await;
                match queue.pop_front() {
                    Some(event) => event,
                    None => break,
                }
            };

            match self.sign_and_append(&next).await {
                Ok(()) => appended += 1,
                Err(e) if e.is_fatal() => {
                    error!(
                        "halting POI event coordinator for list {} after log invariant violation: {}",
                        self.list_key, e
                    );
                    self.queue.lock().await.push_front(next);
                    self.halted.store(true, Ordering::Release);
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        "failed to sign/append POI event for list {}: {}; requeuing",
                        self.list_key, e
                    );
                    self.queue.lock().await.push_front(next);
                    break;
                }
            }
        }

        Ok(appended)
    }

    async fn sign_and_append(&self, event: &UnsignedPoiEvent) -> Result<(), CoordinatorError> {
        let index = self.log.len(&self.list_key)?;
        let starting_index = match self.log.last(&self.list_key)? {
            Some(prev) => {
                prev.blinded_commitment_starting_index + prev.blinded_commitments.len() as u64
            }
            None => 0,
        };

        let signed = match event {
            UnsignedPoiEvent::Shield {
                commitment_hash,
                blinded_commitment,
            } => {
                let signature = self.signer.sign_shield_event(
                    index,
                    starting_index,
                    commitment_hash,
                    blinded_commitment,
                )?;
                SignedPoiEvent {
                    index,
                    blinded_commitment_starting_index: starting_index,
                    blinded_commitments: vec![blinded_commitment.clone()],
                    proof: None,
                    signature: signature.to_bytes().to_vec(),
                }
            }
            UnsignedPoiEvent::Transact {
                blinded_commitments,
                proof,
            } => {
                let signature = self.signer.sign_transact_event(
                    index,
                    starting_index,
                    blinded_commitments,
                    proof,
                )?;
                SignedPoiEvent {
                    index,
                    blinded_commitment_starting_index: starting_index,
                    blinded_commitments: blinded_commitments.clone(),
                    proof: Some(proof.clone()),
                    signature: signature.to_bytes().to_vec(),
                }
            }
        };

        self.log.append(&self.list_key, signed)?;
        info!("appended POI event {} for list {}", index, self.list_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::KeypairSigner;

    fn coordinator() -> (Arc<EventLogStore>, EventQueueCoordinator) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let log = Arc::new(EventLogStore::open(&db).unwrap());
        let signer = Arc::new(KeypairSigner::generate());
        let list_key = signer.list_key();
        let coordinator = EventQueueCoordinator::new(list_key, signer, log.clone());
        (log, coordinator)
    }

    #[tokio::test]
    async fn drains_fifo_and_chains_starting_indices() {
        let (log, coordinator) = coordinator();

        coordinator
            .queue_unsigned_poi_shield_event("0x1".into(), "0xa".into())
            .await;
        coordinator
            .queue_unsigned_poi_shield_event("0x2".into(), "0xb".into())
            .await;

        let appended = coordinator.drain().await.unwrap();
        assert_eq!(appended, 2);

        let list_key = coordinator.list_key();
        assert_eq!(log.len(list_key).unwrap(), 2);

        let e0 = log.get(list_key, 0).unwrap().unwrap();
        let e1 = log.get(list_key, 1).unwrap().unwrap();
        assert_eq!(e0.blinded_commitment_starting_index, 0);
        assert_eq!(e1.blinded_commitment_starting_index, 1);
    }

    #[tokio::test]
    async fn transact_event_carries_multiple_blinded_commitments() {
        let (log, coordinator) = coordinator();

        coordinator
            .queue_unsigned_poi_transact_event(
                vec!["0x1234".into(), "0x2345".into()],
                crate::signer::Proof(b"MOCK_SNARK_PROOF".to_vec()),
            )
            .await;
        coordinator.drain().await.unwrap();

        let list_key = coordinator.list_key();
        let event = log.get(list_key, 0).unwrap().unwrap();
        assert_eq!(event.blinded_commitments.len(), 2);
        assert!(event.proof.is_some());
    }

    #[tokio::test]
    async fn empty_queue_drains_to_zero() {
        let (_log, coordinator) = coordinator();
        assert_eq!(coordinator.drain().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn non_dense_index_halts_the_coordinator_instead_of_requeuing() {
        let (log, coordinator) = coordinator();

        // Simulate a second writer appending behind the coordinator's back,
        // the way a second concurrent `drain` without the write lock would.
        let list_key = coordinator.list_key().clone();
        let signer = KeypairSigner::generate();
        let foreign = crate::store::SignedPoiEvent {
            index: 0,
            blinded_commitment_starting_index: 0,
            blinded_commitments: vec!["0xdead".into()],
            proof: None,
            signature: signer
                .sign_shield_event(0, 0, &"0xdead".into(), &"0xdead".into())
                .unwrap()
                .to_bytes()
                .to_vec(),
        };
        log.append(&list_key, foreign).unwrap();

        coordinator
            .queue_unsigned_poi_shield_event("0x1".into(), "0xa".into())
            .await;

        let err = coordinator.drain().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Log(EventLogError::NonDenseIndex(..))));
        assert!(coordinator.is_halted());

        let err = coordinator.drain().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Halted));
    }
}
