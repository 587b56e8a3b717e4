//! Configuration types for policy-router
//!
//! Configuration is loaded from JSON and validated once at startup. Every
//! section has defaults, so an empty object is a valid configuration.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Operating mode of the tunnel
    #[serde(default)]
    pub mode: OperatingMode,

    /// Synthetic resolver addresses of the tunnel
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Initial values of the global policy toggles
    #[serde(default)]
    pub toggles: TogglesConfig,

    /// Retry gate timing
    #[serde(default)]
    pub gate: GateConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tunnel.validate()?;
        self.gate.validate()?;
        Ok(())
    }

    /// Create a minimal default configuration
    #[must_use]
    pub fn default_config() -> Self {
        Self::default()
    }
}

/// Operating mode of the tunnel.
///
/// DNS-only mode resolves through the tunnel without firewalling flows,
/// firewall-only mode does the opposite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// DNS only
    Dns,
    /// Firewall only
    Firewall,
    /// DNS and firewall
    #[default]
    DnsFirewall,
}

impl OperatingMode {
    /// Parse a mode name
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` for unknown names.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dns" | "dns_only" => Ok(Self::Dns),
            "firewall" | "firewall_only" => Ok(Self::Firewall),
            "dns_firewall" | "dns+firewall" => Ok(Self::DnsFirewall),
            _ => Err(ConfigError::ParseError(format!("unknown mode: {s}"))),
        }
    }

    /// Whether queries go through the tunnel resolver with no firewall
    #[must_use]
    pub const fn is_dns(self) -> bool {
        matches!(self, Self::Dns)
    }

    /// Whether both the resolver and the firewall are active
    #[must_use]
    pub const fn is_dns_firewall(self) -> bool {
        matches!(self, Self::DnsFirewall)
    }

    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Self::Dns => 0,
            Self::Firewall => 1,
            Self::DnsFirewall => 2,
        }
    }

    pub(crate) const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Dns,
            1 => Self::Firewall,
            _ => Self::DnsFirewall,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns => write!(f, "dns"),
            Self::Firewall => write!(f, "firewall"),
            Self::DnsFirewall => write!(f, "dns_firewall"),
        }
    }
}

/// IP families routed through the tunnel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InternetProtocol {
    /// IPv4 only
    #[default]
    Ipv4,
    /// IPv6 only
    Ipv6,
    /// Dual stack
    Ipv46,
}

/// Tunnel resolver settings.
///
/// The tunnel answers DNS on a synthetic address inside its own subnet;
/// traffic to it is internal to the tunnel and exempt from the firewall.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TunnelConfig {
    /// Address families the tunnel carries
    #[serde(default)]
    pub protocol: InternetProtocol,

    /// Synthetic IPv4 resolver address
    #[serde(default = "default_dns_ipv4")]
    pub dns_ipv4: Ipv4Addr,

    /// Synthetic IPv6 resolver address
    #[serde(default = "default_dns_ipv6")]
    pub dns_ipv6: Ipv6Addr,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            protocol: InternetProtocol::default(),
            dns_ipv4: default_dns_ipv4(),
            dns_ipv6: default_dns_ipv6(),
        }
    }
}

impl TunnelConfig {
    /// Validate tunnel configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for unspecified resolver addresses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dns_ipv4.is_unspecified() || self.dns_ipv6.is_unspecified() {
            return Err(ConfigError::ValidationError(
                "tunnel resolver addresses must be specified".into(),
            ));
        }
        Ok(())
    }

    /// Whether `ip` is the tunnel's own resolver for the active families
    #[must_use]
    pub fn is_resolver(&self, ip: IpAddr) -> bool {
        let v4 = ip == IpAddr::V4(self.dns_ipv4);
        let v6 = ip == IpAddr::V6(self.dns_ipv6);
        match self.protocol {
            InternetProtocol::Ipv4 => v4,
            InternetProtocol::Ipv6 => v6,
            InternetProtocol::Ipv46 => v4 || v6,
        }
    }
}

/// Initial values of the global policy toggles.
///
/// Mirrors [`crate::policy::GlobalToggles`], which holds the live values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct TogglesConfig {
    /// Block flows whose owning app cannot be identified
    #[serde(default)]
    pub block_unknown_apps: bool,

    /// Hold flows of never-seen apps until they are classified
    #[serde(default)]
    pub block_newly_installed: bool,

    /// Bind flows to all underlying networks (disables wifi/mobile app rules)
    #[serde(default)]
    pub use_multiple_networks: bool,

    /// OS-level always-on VPN lockdown is active
    #[serde(default)]
    pub vpn_lockdown: bool,

    /// Block all flows on metered networks
    #[serde(default)]
    pub block_metered: bool,

    /// Block every flow not explicitly allowed
    #[serde(default)]
    pub universal_lockdown: bool,

    /// Block plain HTTP (port 80)
    #[serde(default)]
    pub block_http: bool,

    /// Block flows while the device is locked
    #[serde(default)]
    pub block_when_locked: bool,

    /// Block UDP other than DNS and system NTP
    #[serde(default)]
    pub block_udp: bool,

    /// Block apps that are not in the foreground
    #[serde(default)]
    pub block_background: bool,

    /// Block flows that did not resolve through the tunnel resolver
    #[serde(default)]
    pub disallow_dns_bypass: bool,

    /// Trap all port-53 traffic into the tunnel resolver
    #[serde(default = "default_true")]
    pub prevent_dns_leaks: bool,

    /// Cache DNS responses (prefixes the transport id)
    #[serde(default = "default_true")]
    pub dns_cache: bool,
}

impl Default for TogglesConfig {
    fn default() -> Self {
        Self {
            block_unknown_apps: false,
            block_newly_installed: false,
            use_multiple_networks: false,
            vpn_lockdown: false,
            block_metered: false,
            universal_lockdown: false,
            block_http: false,
            block_when_locked: false,
            block_udp: false,
            block_background: false,
            disallow_dns_bypass: false,
            prevent_dns_leaks: true,
            dns_cache: true,
        }
    }
}

/// Retry gate timing.
///
/// The gate polls for `budget_secs` with jittered exponential backoff
/// starting at `base_delay_ms`, then stalls for `stall_secs` before
/// reporting a timeout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GateConfig {
    /// Stall after an unsuccessful polling window, in seconds
    #[serde(default = "default_stall_secs")]
    pub stall_secs: u64,

    /// Polling window, in seconds
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,

    /// First backoff delay, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            stall_secs: default_stall_secs(),
            budget_secs: default_budget_secs(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl GateConfig {
    /// Validate gate timing
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for a zero budget or delay, or
    /// a base delay longer than the budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget_secs == 0 {
            return Err(ConfigError::ValidationError(
                "gate budget_secs must be greater than 0".into(),
            ));
        }
        if self.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "gate base_delay_ms must be greater than 0".into(),
            ));
        }
        if self.base_delay_ms > self.budget_secs.saturating_mul(1000) {
            return Err(ConfigError::ValidationError(
                "gate base_delay_ms must not exceed the budget".into(),
            ));
        }
        Ok(())
    }

    /// Stall duration
    #[must_use]
    pub const fn stall(&self) -> Duration {
        Duration::from_secs(self.stall_secs)
    }

    /// Polling budget
    #[must_use]
    pub const fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }

    /// First backoff delay
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Include target (module path)
    #[serde(default = "default_true")]
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_dns_ipv4() -> Ipv4Addr {
    Ipv4Addr::new(10, 111, 222, 3)
}

const fn default_dns_ipv6() -> Ipv6Addr {
    Ipv6Addr::new(0xfd66, 0xf83a, 0xc650, 0, 0, 0, 0, 3)
}

const fn default_stall_secs() -> u64 {
    20
}

const fn default_budget_secs() -> u64 {
    10
}

const fn default_base_delay_ms() -> u64 {
    50
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}
