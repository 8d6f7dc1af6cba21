//! Closed set of supported networks and their static chain configuration.
//!
//! Each network's contract address and sync starting point is a compiled-in
//! constant, looked up by the `Network` enum rather than passed around as a
//! bare chain id.

use std::{fmt, str::FromStr};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Network {
    EthereumMainnet,
    EthereumSepolia,
    Polygon,
    Arbitrum,
}

#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub network: Network,
    pub chain_id: u64,
    pub railgun_smart_wallet: Address,
    /// Floor for initial ingest when no `NetworkStatus` row exists yet.
    pub deployment_block: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown network name: {0}")]
pub struct UnknownNetwork(pub String);

impl Network {
    pub const ALL: &'static [Network] = &[
        Network::EthereumMainnet,
        Network::EthereumSepolia,
        Network::Polygon,
        Network::Arbitrum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::EthereumMainnet => "ethereum",
            Network::EthereumSepolia => "ethereum_sepolia",
            Network::Polygon => "polygon",
            Network::Arbitrum => "arbitrum",
        }
    }

    pub fn config(&self) -> NetworkConfig {
        match self {
            Network::EthereumMainnet => NetworkConfig {
                network: *self,
                chain_id: 1,
                railgun_smart_wallet: "0xFA7093CDD9EE6932B4eb2c9e1cde7CE00B1FA4b9"
                    .parse()
                    .expect("valid address literal"),
                deployment_block: 14_693_013,
            },
            Network::EthereumSepolia => NetworkConfig {
                network: *self,
                chain_id: 11_155_111,
                railgun_smart_wallet: "0xeCFCf3b4eC647c4Ca6D49108b311b7a7C9543fea"
                    .parse()
                    .expect("valid address literal"),
                deployment_block: 5_784_774,
            },
            Network::Polygon => NetworkConfig {
                network: *self,
                chain_id: 137,
                railgun_smart_wallet: "0x19B620929f97b7b990801496c3b361CA5dEf8c0"
                    .parse()
                    .expect("valid address literal"),
                deployment_block: 28_083_681,
            },
            Network::Arbitrum => NetworkConfig {
                network: *self,
                chain_id: 42_161,
                railgun_smart_wallet: "0xFA7093CDD9EE6932B4eb2c9e1cde7CE00B1FA4b9"
                    .parse()
                    .expect("valid address literal"),
                deployment_block: 52_402_967,
            },
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::ALL
            .iter()
            .copied()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| UnknownNetwork(s.to_string()))
    }
}
