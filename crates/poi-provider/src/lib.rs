//! Proof-of-Innocence list-provider node: observes shield events on one or
//! more Railgun-compatible networks, classifies them through an operator
//! policy gate, and publishes a signed append-only event log under an
//! Ed25519 list key.

pub mod chain_observer;
pub mod config;
pub mod coordinator;
pub mod hex_types;
pub mod network;
pub mod node;
pub mod policy;
pub mod pollers;
pub mod signer;
pub mod store;
