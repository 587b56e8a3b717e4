//! Route targets and proxy kinds

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Wire prefix of WireGuard targets
pub const WIREGUARD_PREFIX: &str = "wg";

/// Egress chosen for a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteTarget {
    /// Drop the flow
    Block,
    /// Leave through the underlying network
    Base,
    /// Leave through the WireGuard tunnel with this config id
    WireGuard(u32),
    /// User SOCKS5 proxy
    Socks5,
    /// User HTTP proxy
    HttpProxy,
    /// Anonymizing proxy
    Orbot,
    /// TCP-only relay
    TcpBase,
}

impl RouteTarget {
    /// Proxy kind that serves this target, if any
    #[must_use]
    pub const fn kind(self) -> Option<ProxyKind> {
        match self {
            Self::Block | Self::Base => None,
            Self::WireGuard(_) => Some(ProxyKind::WireGuard),
            Self::Socks5 => Some(ProxyKind::Socks5),
            Self::HttpProxy => Some(ProxyKind::Http),
            Self::Orbot => Some(ProxyKind::Orbot),
            Self::TcpBase => Some(ProxyKind::Tcp),
        }
    }

    /// Whether this target drops the flow
    #[must_use]
    pub const fn is_block(self) -> bool {
        matches!(self, Self::Block)
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => write!(f, "Block"),
            Self::Base => write!(f, "Base"),
            Self::WireGuard(id) => write!(f, "{WIREGUARD_PREFIX}{id}"),
            Self::Socks5 => write!(f, "S5"),
            Self::HttpProxy => write!(f, "HTTP"),
            Self::Orbot => write!(f, "ORBOT"),
            Self::TcpBase => write!(f, "TCP"),
        }
    }
}

/// Error returned for an unknown route target id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown route target: {0}")]
pub struct UnknownTarget(pub String);

impl FromStr for RouteTarget {
    type Err = UnknownTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Block" => Ok(Self::Block),
            "Base" => Ok(Self::Base),
            "S5" => Ok(Self::Socks5),
            "HTTP" => Ok(Self::HttpProxy),
            "ORBOT" => Ok(Self::Orbot),
            "TCP" => Ok(Self::TcpBase),
            _ => s
                .strip_prefix(WIREGUARD_PREFIX)
                .and_then(|id| id.parse().ok())
                .map(Self::WireGuard)
                .ok_or_else(|| UnknownTarget(s.to_string())),
        }
    }
}

/// Proxy subsystem that can be switched on globally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// WireGuard configs
    WireGuard,
    /// TCP-only relay
    Tcp,
    /// Anonymizing proxy
    Orbot,
    /// User SOCKS5 proxy
    Socks5,
    /// User HTTP proxy
    Http,
}

impl ProxyKind {
    /// Every proxy kind
    pub const ALL: [Self; 5] = [Self::WireGuard, Self::Tcp, Self::Orbot, Self::Socks5, Self::Http];

    /// Parse a kind name
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "wireguard" | "wg" => Some(Self::WireGuard),
            "tcp" => Some(Self::Tcp),
            "orbot" | "tor" => Some(Self::Orbot),
            "socks5" | "s5" => Some(Self::Socks5),
            "http" => Some(Self::Http),
            _ => None,
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WireGuard => write!(f, "wireguard"),
            Self::Tcp => write!(f, "tcp"),
            Self::Orbot => write!(f, "orbot"),
            Self::Socks5 => write!(f, "socks5"),
            Self::Http => write!(f, "http"),
        }
    }
}
