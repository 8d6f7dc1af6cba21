//! Ed25519 list signer.
//!
//! A trait for "a thing that can sign and report its public identity", plus
//! a concrete key-backed implementation. The list's public key, hex-encoded,
//! *is* the list key.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::hex_types::{BlindedCommitment, CommitmentHash, ListKey};

/// Canonical zk-SNARK proof payload. The proving stack itself is out of
/// core scope (it belongs to the wallet/engine library); only the proof's
/// canonical byte encoding matters for the signing message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Proof(pub Vec<u8>);

impl Proof {
    pub fn canonical_bytes(&self) -> &[u8] {
        &self.0
    }
}

const SHIELD_DOMAIN: u8 = 0x01;
const TRANSACT_DOMAIN: u8 = 0x02;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid hex in signing input: {0}")]
    Hex(#[from] crate::hex_types::HexError),
}

pub trait Signer: Send + Sync {
    fn list_key(&self) -> ListKey;

    /// Signs a shield-event message: domain byte, big-endian indices, the
    /// shield's commitment hash, then its single blinded commitment.
    fn sign_shield_event(
        &self,
        index: u64,
        blinded_commitment_starting_index: u64,
        commitment_hash: &CommitmentHash,
        blinded_commitment: &BlindedCommitment,
    ) -> Result<Signature, SignerError>;

    /// Signs a transact-event message: domain byte, big-endian indices, the
    /// concatenated blinded commitments, then the proof's canonical bytes.
    fn sign_transact_event(
        &self,
        index: u64,
        blinded_commitment_starting_index: u64,
        blinded_commitments: &[BlindedCommitment],
        proof: &Proof,
    ) -> Result<Signature, SignerError>;

    /// Signs a blocked-shield record: `commitmentHash ‖ blindedCommitment ‖
    /// (blockReason ?? "")`, all hex-decoded / UTF-8 bytes concatenated.
    fn sign_blocked_shield(
        &self,
        commitment_hash: &CommitmentHash,
        blinded_commitment: &BlindedCommitment,
        block_reason: Option<&str>,
    ) -> Result<Signature, SignerError>;

    fn verify(&self, message: &[u8], signature: &Signature) -> bool;
}

pub fn shield_event_message(
    index: u64,
    blinded_commitment_starting_index: u64,
    commitment_hash: &CommitmentHash,
    blinded_commitment: &BlindedCommitment,
) -> Result<Vec<u8>, SignerError> {
    let mut msg = Vec::new();
    msg.push(SHIELD_DOMAIN);
    msg.extend_from_slice(&index.to_be_bytes());
    msg.extend_from_slice(&blinded_commitment_starting_index.to_be_bytes());
    msg.extend_from_slice(&commitment_hash.to_bytes()?);
    msg.extend_from_slice(&blinded_commitment.to_bytes()?);
    Ok(msg)
}

pub fn transact_event_message(
    index: u64,
    blinded_commitment_starting_index: u64,
    blinded_commitments: &[BlindedCommitment],
    proof: &Proof,
) -> Result<Vec<u8>, SignerError> {
    let mut msg = Vec::new();
    msg.push(TRANSACT_DOMAIN);
    msg.extend_from_slice(&index.to_be_bytes());
    msg.extend_from_slice(&blinded_commitment_starting_index.to_be_bytes());
    for bc in blinded_commitments {
        msg.extend_from_slice(&bc.to_bytes()?);
    }
    msg.extend_from_slice(proof.canonical_bytes());
    Ok(msg)
}

pub fn blocked_shield_message(
    commitment_hash: &CommitmentHash,
    blinded_commitment: &BlindedCommitment,
    block_reason: Option<&str>,
) -> Result<Vec<u8>, SignerError> {
    let mut msg = Vec::new();
    msg.extend_from_slice(&commitment_hash.to_bytes()?);
    msg.extend_from_slice(&blinded_commitment.to_bytes()?);
    msg.extend_from_slice(block_reason.unwrap_or("").as_bytes());
    Ok(msg)
}

/// Ed25519 keypair-backed signer. Holds the private key for the lifetime of
/// the process; has no persisted state beyond the key itself.
pub struct KeypairSigner {
    signing_key: SigningKey,
}

impl KeypairSigner {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        KeypairSigner { signing_key }
    }

    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        KeypairSigner {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl Signer for KeypairSigner {
    fn list_key(&self) -> ListKey {
        ListKey::from_public_key_bytes(self.verifying_key().as_bytes())
    }

    fn sign_shield_event(
        &self,
        index: u64,
        blinded_commitment_starting_index: u64,
        commitment_hash: &CommitmentHash,
        blinded_commitment: &BlindedCommitment,
    ) -> Result<Signature, SignerError> {
        let msg = shield_event_message(
            index,
            blinded_commitment_starting_index,
            commitment_hash,
            blinded_commitment,
        )?;
        Ok(self.signing_key.sign(&msg))
    }

    fn sign_transact_event(
        &self,
        index: u64,
        blinded_commitment_starting_index: u64,
        blinded_commitments: &[BlindedCommitment],
        proof: &Proof,
    ) -> Result<Signature, SignerError> {
        let msg = transact_event_message(
            index,
            blinded_commitment_starting_index,
            blinded_commitments,
            proof,
        )?;
        Ok(self.signing_key.sign(&msg))
    }

    fn sign_blocked_shield(
        &self,
        commitment_hash: &CommitmentHash,
        blinded_commitment: &BlindedCommitment,
        block_reason: Option<&str>,
    ) -> Result<Signature, SignerError> {
        let msg = blocked_shield_message(commitment_hash, blinded_commitment, block_reason)?;
        Ok(self.signing_key.sign(&msg))
    }

    fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.verifying_key().verify(message, signature).is_ok()
    }
}
