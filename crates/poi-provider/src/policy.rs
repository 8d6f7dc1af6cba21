//! List operator policy gate.
//!
//! Supplied by the list operator as a single capability and consumed as a
//! plain trait object: given a shield's network, txid, sender address, and
//! timestamp, decide whether it is allowed onto the list or blocked.

use crate::network::Network;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Block { reason: Option<String> },
}

#[async_trait::async_trait]
pub trait PolicyGate: Send + Sync {
    /// `from_address` is always lowercase; callers are responsible for
    /// normalising before invoking the gate.
    async fn evaluate(
        &self,
        network: Network,
        txid: &str,
        from_address_lowercase: &str,
        timestamp: i64,
    ) -> PolicyDecision;
}

/// Trivial gate that allows everything. Useful as a default and for tests
/// exercising the allow path.
pub struct AllowAllPolicy;

#[async_trait::async_trait]
impl PolicyGate for AllowAllPolicy {
    async fn evaluate(
        &self,
        _network: Network,
        _txid: &str,
        _from_address_lowercase: &str,
        _timestamp: i64,
    ) -> PolicyDecision {
        PolicyDecision::Allow
    }
}

/// Blocks a fixed set of addresses. Useful for tests exercising the block
/// path and as a minimal real-world starting point for an operator.
pub struct AddressDenylistPolicy {
    denied: Vec<String>,
    reason: String,
}

impl AddressDenylistPolicy {
    pub fn new(denied: Vec<String>, reason: impl Into<String>) -> Self {
        AddressDenylistPolicy {
            denied: denied.into_iter().map(|a| a.to_lowercase()).collect(),
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl PolicyGate for AddressDenylistPolicy {
    async fn evaluate(
        &self,
        _network: Network,
        _txid: &str,
        from_address_lowercase: &str,
        _timestamp: i64,
    ) -> PolicyDecision {
        if self.denied.iter().any(|a| a == from_address_lowercase) {
            PolicyDecision::Block {
                reason: Some(self.reason.clone()),
            }
        } else {
            PolicyDecision::Allow
        }
    }
}
