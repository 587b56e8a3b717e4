//! New-flow requests from the forwarding engine

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::connection::{parse_endpoint, FlowMetadata, Protocol};
use crate::policy::AppUid;

/// A new flow as reported by the forwarding engine.
///
/// Fields are raw engine values; nothing here is validated until
/// [`FlowRequest::to_metadata`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRequest {
    /// IP protocol number
    pub protocol: i64,
    /// Owner identity; negative when unknown
    pub uid: i64,
    /// Source `addr:port`
    pub src: String,
    /// Destination `addr:port`
    pub dst: String,
    /// Comma separated addresses the destination domain resolved to
    #[serde(default)]
    pub real_ips: Option<String>,
    /// Comma separated domains the destination was resolved from
    #[serde(default)]
    pub domains: Option<String>,
    /// Blocklists that matched at resolution time
    #[serde(default)]
    pub blocklists: String,
}

impl FlowRequest {
    /// Create a request without resolution data
    #[must_use]
    pub fn new(protocol: i64, uid: i64, src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            protocol,
            uid,
            src: src.into(),
            dst: dst.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the real addresses
    #[must_use]
    pub fn with_real_ips(mut self, real_ips: impl Into<String>) -> Self {
        self.real_ips = Some(real_ips.into());
        self
    }

    /// Builder method to set the resolved domains
    #[must_use]
    pub fn with_domains(mut self, domains: impl Into<String>) -> Self {
        self.domains = Some(domains.into());
        self
    }

    /// Builder method to set blocklist provenance
    #[must_use]
    pub fn with_blocklists(mut self, blocklists: impl Into<String>) -> Self {
        self.blocklists = blocklists.into();
        self
    }

    /// Whether the flow carries resolution data (domain and real addresses)
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        non_blank(self.domains.as_deref()).is_some() && non_blank(self.real_ips.as_deref()).is_some()
    }

    /// Build flow metadata, returning it with the "any real IP blocked" flag.
    ///
    /// Resolved flows take the first domain as their query and the first
    /// real address as destination. A real address of `0.0.0.0` or `::`
    /// means the resolver blocked the domain.
    #[must_use]
    pub fn to_metadata(&self) -> (FlowMetadata, bool) {
        let (src_ip, src_port) = parse_endpoint(&self.src);
        let (dst_ip, dst_port) = parse_endpoint(&self.dst);
        let flow = FlowMetadata::new(
            AppUid::from_raw(self.uid),
            Protocol::from_number(self.protocol),
            src_ip,
            src_port,
            dst_ip,
            dst_port,
        )
        .with_blocklists(self.blocklists.as_str());

        let (Some(domains), Some(real_ips)) = (
            non_blank(self.domains.as_deref()),
            non_blank(self.real_ips.as_deref()),
        ) else {
            return (flow, false);
        };

        let ips: Vec<IpAddr> = real_ips
            .split(',')
            .filter_map(|ip| ip.trim().parse().ok())
            .collect();
        let any_real_ip_blocked = ips.iter().any(IpAddr::is_unspecified);

        let mut flow = match domains.split(',').map(str::trim).find(|d| !d.is_empty()) {
            Some(domain) => flow.with_query(domain),
            None => flow,
        };
        if let Some(&ip) = ips.first() {
            flow.dst_ip = Some(ip);
        }
        (flow, any_real_ip_blocked)
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}
