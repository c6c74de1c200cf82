//! Consumer-side discovery and liveness configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use super::distributor::{DEFAULT_PORT_COUNT, DEFAULT_PRODUCER_PORT};
use super::serde_utils::duration_millis;
use super::TransportOptions;
use crate::error::ConfigError;
use crate::types::{Credential, PortRange};

/// First port consumers bind their own socket on
pub const DEFAULT_CONSUMER_PORT: u16 = 29999;

/// Configuration for a consumer's discovery manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Host whose producer port range is probed
    pub base_ip: IpAddr,

    /// Facility to subscribe to
    pub facility: String,

    /// Shared credential presented to producers
    pub credential: Credential,

    /// Ports probed on `base_ip`
    pub discovery_ports: PortRange,

    /// Address to bind our own socket on
    pub bind_ip: IpAddr,

    /// A random port from this range is bound
    pub bind_ports: PortRange,

    /// Random bind attempts before giving up
    pub bind_attempts: usize,

    /// Period of the discovery broadcast
    #[serde(with = "duration_millis")]
    pub discovery_interval: Duration,

    /// Silence after which a heartbeat is sent
    #[serde(with = "duration_millis")]
    pub heartbeat_interval: Duration,

    /// Wait for a heartbeat answer before declaring the peer dead
    #[serde(with = "duration_millis")]
    pub heartbeat_timeout: Duration,

    /// Period of the per-peer liveness check
    #[serde(with = "duration_millis")]
    pub tick_interval: Duration,

    /// Received notices buffered for the application
    pub notice_capacity: usize,

    /// Communicator sizing
    pub transport: TransportOptions,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            base_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            facility: String::new(),
            credential: Credential::default(),
            discovery_ports: PortRange::new(DEFAULT_PRODUCER_PORT, DEFAULT_PORT_COUNT),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_ports: PortRange::new(DEFAULT_CONSUMER_PORT, DEFAULT_PORT_COUNT),
            bind_attempts: 100,
            discovery_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_millis(250),
            notice_capacity: 1024,
            transport: TransportOptions::default(),
        }
    }
}

impl SubscriberConfig {
    /// Check the settings a manager cannot run without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.facility.is_empty() {
            return Err(ConfigError::MissingField("facility".to_string()));
        }
        if self.discovery_ports.is_empty() {
            return Err(ConfigError::Invalid(
                "discovery_ports must contain at least one port".to_string(),
            ));
        }
        if self.bind_ports.is_empty() || self.bind_attempts == 0 {
            return Err(ConfigError::Invalid(
                "bind_ports and bind_attempts must be non-zero".to_string(),
            ));
        }
        if self.tick_interval.is_zero() || self.discovery_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "tick_interval and discovery_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
