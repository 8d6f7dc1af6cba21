//! Hex-encoded identifier newtypes.
//!
//! Txids, commitment hashes, and blinded commitments are all variable-length
//! hex blobs; wrapping them in `HexBytes` rather than passing bare `String`s
//! positionally keeps them from being accidentally swapped at a call site.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HexBytes(String);

#[derive(Debug, thiserror::Error)]
pub enum HexError {
    #[error("hex decoding error: {0}")]
    Decode(#[from] hex::FromHexError),
}

impl HexBytes {
    pub fn new(value: impl Into<String>) -> Self {
        let mut s: String = value.into();
        if let Some(stripped) = s.strip_prefix("0x") {
            s = stripped.to_string();
        }
        HexBytes(s.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, HexError> {
        Ok(hex::decode(&self.0)?)
    }
}

impl fmt::Display for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.0)
    }
}

impl From<&str> for HexBytes {
    fn from(value: &str) -> Self {
        HexBytes::new(value)
    }
}

impl From<String> for HexBytes {
    fn from(value: String) -> Self {
        HexBytes::new(value)
    }
}

pub type Txid = HexBytes;
pub type CommitmentHash = HexBytes;
pub type BlindedCommitment = HexBytes;

/// Hex encoding (no `0x` prefix) of the list's Ed25519 public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListKey(String);

impl ListKey {
    pub fn from_public_key_bytes(bytes: &[u8; 32]) -> Self {
        ListKey(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
