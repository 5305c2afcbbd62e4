//! uplink-core: configuration and address types shared by the uplink crates.
//!
//! - **`config`**: `uplink.toml` model, validation, duration parsing
//! - **`net`**: `Ipv4Cidr`, the backup destination prefix with the
//!   network-address/netmask normalization the firewall API requires

pub mod config;
pub mod net;

pub use config::{
    ConfigError, ConfigResult, DeployConfig, FailoverConfig, FirewallConfig, ProbeConfig,
    ScheduleConfig, UplinkConfig, parse_duration,
};
pub use net::{Ipv4Cidr, NetError};
