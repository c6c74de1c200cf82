//! Producer-side distributor configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use super::serde_utils::{duration_micros, duration_secs};
use super::TransportOptions;
use crate::process;
use crate::types::{Credential, PortRange};

/// First port producers listen on; consumers probe the same range
pub const DEFAULT_PRODUCER_PORT: u16 = 19999;

/// Number of ports in the producer range
pub const DEFAULT_PORT_COUNT: u16 = 100;

/// Configuration for a producer's distributor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// Facility advertised to consumers (defaults to the program name)
    pub facility: Option<String>,

    /// Shared credential consumers must present
    pub credential: Credential,

    /// Address to bind on
    pub listen_ip: IpAddr,

    /// A random port from this range is bound
    pub listen_ports: PortRange,

    /// Notices buffered between `publish` and the egress loop
    pub channel_capacity: usize,

    /// Longest `publish` waits for room in the channel
    #[serde(with = "duration_micros")]
    pub hand_off_timeout: Duration,

    /// Wait before retrying a failed bind
    #[serde(with = "duration_secs")]
    pub bind_retry_delay: Duration,

    /// Idle notices kept for reuse
    pub pool_capacity: usize,

    /// Communicator sizing
    pub transport: TransportOptions,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            facility: None,
            credential: Credential::default(),
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_ports: PortRange::new(DEFAULT_PRODUCER_PORT, DEFAULT_PORT_COUNT),
            channel_capacity: 256,
            hand_off_timeout: Duration::from_micros(10),
            bind_retry_delay: Duration::from_secs(30),
            pool_capacity: 256,
            transport: TransportOptions::default(),
        }
    }
}

impl DistributorConfig {
    /// Facility to advertise, falling back to the program name
    pub fn facility_name(&self) -> String {
        self.facility
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| process::program_name().to_string())
    }
}
