//! List operator configuration.
//!
//! Recognised keys are read from the environment first, with an optional
//! `config.toml` file (pointed to by `--config`) supplying defaults for
//! anything the environment doesn't set.

use std::{collections::HashMap, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::network::Network;

/// Query caps for the read-side HTTP surface. That surface itself is out of
/// core scope here, but a future collaborator should not have to re-derive
/// these numbers.
pub const MAX_EVENT_QUERY_RANGE: u64 = 500;
pub const MAX_BLOCKED_SHIELDS_SYNCED: usize = 50;
pub const MAX_TRANSACT_PROOFS_SYNCED: usize = 500;

const DEFAULT_QUEUE_SHIELDS_DELAY_MSEC: u64 = 20 * 60 * 1000;
const DEFAULT_VALIDATE_SHIELDS_DELAY_MSEC: u64 = 30 * 1000;
const DEFAULT_PENDING_PERIOD_HOURS: u64 = 24 * 7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(String, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(String, toml::de::Error),
    #[error("unknown network in NETWORK_NAMES: {0}")]
    UnknownNetwork(#[from] crate::network::UnknownNetwork),
    #[error("missing required setting: {0}")]
    Missing(String),
}

/// Per-network settings that the chain observer and status store need to
/// bootstrap: where to start scanning if no `NetworkStatus` row exists yet,
/// and which RPC endpoint to use.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSettings {
    pub rpc_url: String,
    #[serde(default)]
    pub deployment_block_override: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    name: Option<String>,
    description: Option<String>,
    queue_shields_override_delay_msec: Option<u64>,
    validate_shields_override_delay_msec: Option<u64>,
    hours_shield_pending_period: Option<u64>,
    network_names: Option<Vec<String>>,
    networks: Option<HashMap<String, NetworkSettings>>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub description: String,
    pub queue_shields_override_delay: Option<Duration>,
    pub validate_shields_override_delay: Option<Duration>,
    pub pending_period: Duration,
    pub networks: Vec<Network>,
    pub network_settings: HashMap<Network, NetworkSettings>,
}

impl Config {
    pub fn queue_shields_delay(&self) -> Duration {
        self.queue_shields_override_delay
            .unwrap_or(Duration::from_millis(DEFAULT_QUEUE_SHIELDS_DELAY_MSEC))
    }

    /// The validate poller falls back to its own default delay; it never
    /// inherits the queue poller's override.
    pub fn validate_shields_delay(&self) -> Duration {
        self.validate_shields_override_delay
            .unwrap_or(Duration::from_millis(DEFAULT_VALIDATE_SHIELDS_DELAY_MSEC))
    }

    pub fn settings_for(&self, network: Network) -> Option<&NetworkSettings> {
        self.network_settings.get(&network)
    }

    /// Loads configuration, merging environment variables over an optional
    /// TOML file. Environment variables win where both are present.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
                toml::from_str(&contents)
                    .map_err(|e| ConfigError::Parse(path.display().to_string(), e))?
            }
            None => FileConfig::default(),
        };

        let name = env_or("POI_PROVIDER_NAME").or(file.name).unwrap_or_default();
        let description = env_or("POI_PROVIDER_DESCRIPTION")
            .or(file.description)
            .unwrap_or_default();

        let queue_shields_override_delay = env_or("POI_PROVIDER_QUEUE_SHIELDS_OVERRIDE_DELAY_MSEC")
            .and_then(|v| v.parse::<u64>().ok())
            .or(file.queue_shields_override_delay_msec)
            .map(Duration::from_millis);

        let validate_shields_override_delay =
            env_or("POI_PROVIDER_VALIDATE_SHIELDS_OVERRIDE_DELAY_MSEC")
                .and_then(|v| v.parse::<u64>().ok())
                .or(file.validate_shields_override_delay_msec)
                .map(Duration::from_millis);

        let pending_period_hours = env_or("POI_PROVIDER_HOURS_SHIELD_PENDING_PERIOD")
            .and_then(|v| v.parse::<u64>().ok())
            .or(file.hours_shield_pending_period)
            .unwrap_or(DEFAULT_PENDING_PERIOD_HOURS);

        let network_names: Vec<String> = env_or("POI_PROVIDER_NETWORK_NAMES")
            .map(|v| v.split(',').map(str::to_string).collect())
            .or(file.network_names)
            .ok_or_else(|| ConfigError::Missing("NETWORK_NAMES".to_string()))?;

        let mut networks = Vec::with_capacity(network_names.len());
        for name in &network_names {
            networks.push(name.parse::<Network>()?);
        }

        let network_settings = file.networks.unwrap_or_default();
        let mut resolved_settings = HashMap::new();
        for network in &networks {
            let env_key = format!("POI_PROVIDER_RPC_URL_{}", network.as_str().to_uppercase());
            let rpc_url = env_or(&env_key)
                .or_else(|| {
                    network_settings
                        .get(network.as_str())
                        .map(|s| s.rpc_url.clone())
                })
                .ok_or_else(|| ConfigError::Missing(env_key.clone()))?;
            let deployment_block_override = network_settings
                .get(network.as_str())
                .and_then(|s| s.deployment_block_override);
            resolved_settings.insert(
                *network,
                NetworkSettings {
                    rpc_url,
                    deployment_block_override,
                },
            );
        }

        Ok(Config {
            name,
            description,
            queue_shields_override_delay,
            validate_shields_override_delay,
            pending_period: Duration::from_secs(pending_period_hours * 3600),
            networks,
            network_settings: resolved_settings,
        })
    }
}

fn env_or(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
