//! Flow metadata
//!
//! A [`FlowMetadata`] is built by the decision façade for each new flow,
//! tagged by the rule evaluator, handed to the flow logger and dropped.

use std::borrow::Borrow;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::policy::AppUid;
use crate::rules::RuleOutcome;

/// Well-known DNS port
pub const DNS_PORT: u16 = 53;

/// Well-known NTP port
pub const NTP_PORT: u16 = 123;

/// Well-known plain HTTP port
pub const HTTP_PORT: u16 = 80;

/// Transport protocol of a flow, by IANA number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// ICMP (1)
    Icmp,
    /// TCP (6)
    Tcp,
    /// UDP (17)
    Udp,
    /// ICMPv6 (58)
    Icmpv6,
    /// Anything else
    Other(u8),
}

impl Protocol {
    /// Map an engine-supplied protocol number; out-of-range values become
    /// `Other(255)` (reserved)
    #[must_use]
    pub fn from_number(number: i64) -> Self {
        u8::try_from(number).map_or(Self::Other(u8::MAX), Self::from)
    }

    /// IANA protocol number
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Icmp => 1,
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::Icmpv6 => 58,
            Self::Other(n) => n,
        }
    }
}

impl From<u8> for Protocol {
    fn from(n: u8) -> Self {
        match n {
            1 => Self::Icmp,
            6 => Self::Tcp,
            17 => Self::Udp,
            58 => Self::Icmpv6,
            n => Self::Other(n),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Icmp => write!(f, "icmp"),
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Icmpv6 => write!(f, "icmpv6"),
            Self::Other(n) => write!(f, "proto-{n}"),
        }
    }
}

/// Opaque flow token: 8 random bytes as lowercase hex
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(String);

impl FlowId {
    /// Generate a fresh id
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; 8] = rand::random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// The id as text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FlowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FlowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for FlowId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse an `addr:port` endpoint as reported by the forwarding engine.
///
/// Accepts `1.2.3.4:80`, `[::1]:443`, bare addresses and garbage; an
/// unparsable address yields `None` and an unparsable port yields `0`.
#[must_use]
pub fn parse_endpoint(s: &str) -> (Option<IpAddr>, u16) {
    let s = s.trim();
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return (Some(addr.ip()), addr.port());
    }
    if let Ok(ip) = s.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return (Some(ip), 0);
    }
    match s.rsplit_once(':') {
        Some((host, port)) => {
            let ip = host.trim_matches(|c| c == '[' || c == ']').parse().ok();
            (ip, port.parse().unwrap_or(0))
        }
        None => (None, 0),
    }
}

/// Metadata of one flow
#[derive(Debug, Clone)]
pub struct FlowMetadata {
    /// Owning app
    pub uid: AppUid,
    /// Transport protocol
    pub protocol: Protocol,
    /// Source address, if parsable
    pub src_ip: Option<IpAddr>,
    /// Source port, `0` if unparsable
    pub src_port: u16,
    /// Destination address, if parsable
    pub dst_ip: Option<IpAddr>,
    /// Destination port, `0` if unparsable
    pub dst_port: u16,
    /// Domain the destination was resolved from
    pub query: Option<String>,
    /// Flow token
    pub id: FlowId,
    /// Rule that decided the flow; set by the evaluator
    pub rule: Option<RuleOutcome>,
    /// Blocklists that matched the domain at resolution time
    pub blocklists: String,
    /// Whether the flow is blocked; set by the evaluator
    pub blocked: bool,
    /// When the flow was seen
    pub created: Instant,
}

impl FlowMetadata {
    /// Create metadata with a fresh flow id
    #[must_use]
    pub fn new(
        uid: AppUid,
        protocol: Protocol,
        src_ip: Option<IpAddr>,
        src_port: u16,
        dst_ip: Option<IpAddr>,
        dst_port: u16,
    ) -> Self {
        Self {
            uid,
            protocol,
            src_ip,
            src_port,
            dst_ip,
            dst_port,
            query: None,
            id: FlowId::generate(),
            rule: None,
            blocklists: String::new(),
            blocked: false,
            created: Instant::now(),
        }
    }

    /// Builder method to set the resolved domain; empty names are ignored
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = if query.trim().is_empty() { None } else { Some(query) };
        self
    }

    /// Builder method to set blocklist provenance
    #[must_use]
    pub fn with_blocklists(mut self, blocklists: impl Into<String>) -> Self {
        self.blocklists = blocklists.into();
        self
    }

    /// Builder method to set the flow id
    #[must_use]
    pub fn with_id(mut self, id: FlowId) -> Self {
        self.id = id;
        self
    }

    /// Resolved domain, if any
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Whether the flow is UDP
    #[must_use]
    pub fn is_udp(&self) -> bool {
        self.protocol == Protocol::Udp
    }

    /// Whether the destination port is DNS
    #[must_use]
    pub const fn is_dns(&self) -> bool {
        self.dst_port == DNS_PORT
    }
}

impl fmt::Display for FlowMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ip = |ip: Option<IpAddr>| ip.map_or_else(String::new, |ip| ip.to_string());
        write!(
            f,
            "{} {} uid={} {}:{} -> {}:{}",
            self.id,
            self.protocol,
            self.uid,
            ip(self.src_ip),
            self.src_port,
            ip(self.dst_ip),
            self.dst_port
        )?;
        if let Some(query) = &self.query {
            write!(f, " ({query})")?;
        }
        Ok(())
    }
}

/// Final accounting of a closed flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSummary {
    /// Flow token
    pub id: FlowId,
    /// Owning app
    #[serde(default)]
    pub uid: Option<AppUid>,
    /// Bytes received from the destination
    #[serde(default)]
    pub bytes_in: u64,
    /// Bytes sent to the destination
    #[serde(default)]
    pub bytes_out: u64,
    /// Lifetime in seconds
    #[serde(default)]
    pub duration_secs: u64,
    /// Handshake round trip in milliseconds (TCP only)
    #[serde(default)]
    pub synack_ms: u64,
    /// Close reason reported by the forwarding engine
    #[serde(default)]
    pub reason: String,
}

impl FlowSummary {
    /// Create an empty summary for a flow
    #[must_use]
    pub fn new(id: FlowId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Builder method to set byte counts
    #[must_use]
    pub fn with_bytes(mut self, bytes_in: u64, bytes_out: u64) -> Self {
        self.bytes_in = bytes_in;
        self.bytes_out = bytes_out;
        self
    }

    /// Builder method to set the lifetime
    #[must_use]
    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Builder method to set the close reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// Outcome of one DNS transaction, as reported by the resolver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsSummary {
    /// Query name
    pub name: String,
    /// Query type
    #[serde(default)]
    pub qtype: u16,
    /// Transport that answered
    #[serde(default)]
    pub transport: String,
    /// Round trip in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Answer records, comma separated
    #[serde(default)]
    pub answers: String,
    /// Blocklists that matched
    #[serde(default)]
    pub blocklists: String,
    /// Error text, if the query failed
    #[serde(default)]
    pub error: Option<String>,
}

impl DnsSummary {
    /// Whether the query was answered by blocking it
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        !self.blocklists.is_empty()
    }
}
