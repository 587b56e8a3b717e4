//! Rule outcomes
//!
//! Every evaluation ends in exactly one [`RuleOutcome`]. The set is closed;
//! each outcome has a stable id (used in logs and flow records) and a fixed
//! verdict.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Rule that decided a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleOutcome {
    /// No rule matched
    NoRule,
    /// App is blocked on every network
    #[serde(rename = "app-rule-block")]
    AppBlock,
    /// App not classified within the gate budget
    NewlyInstalledBlock,
    /// Evaluation failed; fail closed
    #[serde(rename = "evaluation-failure-block")]
    EvaluationFailure,
    /// App blocked on unmetered networks
    #[serde(rename = "app-wifi-block")]
    WifiBlock,
    /// App blocked on metered networks
    #[serde(rename = "app-mobile-block")]
    MobileDataBlock,
    /// Metered networks blocked globally
    MeteredBlock,
    /// Isolated app, destination not trusted
    IsolateMode,
    /// App bypasses the DNS firewall
    DnsFirewallBypass,
    /// Per-app IP block
    IpBlock,
    /// Per-app IP trust
    IpTrust,
    /// Global IP bypass
    GlobalIpBypass,
    /// Global IP block
    GlobalIpBlock,
    /// Per-app domain block
    DomainBlock,
    /// Per-app domain trust
    DomainTrust,
    /// A resolved address of the domain was blocked at DNS time
    AnyRealIpBlocked,
    /// Universal-bypass app, but the destination was blocked at DNS time
    UniversalBypassBlock,
    /// Global domain block
    GlobalDomainBlock,
    /// Global domain trust
    GlobalDomainTrust,
    /// Device is locked
    DeviceLocked,
    /// App is in the background
    BackgroundBlock,
    /// Owner of the flow is unknown
    UnknownAppBlock,
    /// UDP blocked
    UdpBlock,
    /// Flow skipped the tunnel resolver
    DnsBypassed,
    /// Universal-bypass app allowed
    UniversalBypassAllow,
    /// Port-53 traffic trapped into the tunnel resolver
    DnsTrap,
    /// Anonymizing proxy helper is bootstrapping
    ProxyBootstrapAllow,
    /// Plain HTTP blocked
    HttpBlock,
    /// Everything blocked
    UniversalLockdown,
    /// Flow goes out through a proxy
    ProxyRoute,
}

impl RuleOutcome {
    /// Every outcome
    pub const ALL: [Self; 30] = [
        Self::NoRule,
        Self::AppBlock,
        Self::NewlyInstalledBlock,
        Self::EvaluationFailure,
        Self::WifiBlock,
        Self::MobileDataBlock,
        Self::MeteredBlock,
        Self::IsolateMode,
        Self::DnsFirewallBypass,
        Self::IpBlock,
        Self::IpTrust,
        Self::GlobalIpBypass,
        Self::GlobalIpBlock,
        Self::DomainBlock,
        Self::DomainTrust,
        Self::AnyRealIpBlocked,
        Self::UniversalBypassBlock,
        Self::GlobalDomainBlock,
        Self::GlobalDomainTrust,
        Self::DeviceLocked,
        Self::BackgroundBlock,
        Self::UnknownAppBlock,
        Self::UdpBlock,
        Self::DnsBypassed,
        Self::UniversalBypassAllow,
        Self::DnsTrap,
        Self::ProxyBootstrapAllow,
        Self::HttpBlock,
        Self::UniversalLockdown,
        Self::ProxyRoute,
    ];

    /// Stable identifier
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::NoRule => "no-rule",
            Self::AppBlock => "app-rule-block",
            Self::NewlyInstalledBlock => "newly-installed-block",
            Self::EvaluationFailure => "evaluation-failure-block",
            Self::WifiBlock => "app-wifi-block",
            Self::MobileDataBlock => "app-mobile-block",
            Self::MeteredBlock => "metered-block",
            Self::IsolateMode => "isolate-mode",
            Self::DnsFirewallBypass => "dns-firewall-bypass",
            Self::IpBlock => "ip-block",
            Self::IpTrust => "ip-trust",
            Self::GlobalIpBypass => "global-ip-bypass",
            Self::GlobalIpBlock => "global-ip-block",
            Self::DomainBlock => "domain-block",
            Self::DomainTrust => "domain-trust",
            Self::AnyRealIpBlocked => "any-real-ip-blocked",
            Self::UniversalBypassBlock => "universal-bypass-block",
            Self::GlobalDomainBlock => "global-domain-block",
            Self::GlobalDomainTrust => "global-domain-trust",
            Self::DeviceLocked => "device-locked",
            Self::BackgroundBlock => "background-block",
            Self::UnknownAppBlock => "unknown-app-block",
            Self::UdpBlock => "udp-block",
            Self::DnsBypassed => "dns-bypassed",
            Self::UniversalBypassAllow => "universal-bypass-allow",
            Self::DnsTrap => "dns-trap",
            Self::ProxyBootstrapAllow => "proxy-bootstrap-allow",
            Self::HttpBlock => "http-block",
            Self::UniversalLockdown => "universal-lockdown",
            Self::ProxyRoute => "proxy-route",
        }
    }

    /// Whether this outcome is grounds to block the flow
    #[must_use]
    pub const fn blocks(self) -> bool {
        !matches!(
            self,
            Self::NoRule
                | Self::DnsFirewallBypass
                | Self::IpTrust
                | Self::GlobalIpBypass
                | Self::DomainTrust
                | Self::GlobalDomainTrust
                | Self::UniversalBypassAllow
                | Self::DnsTrap
                | Self::ProxyBootstrapAllow
                | Self::ProxyRoute
        )
    }
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Error returned when parsing an unknown outcome id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rule outcome: {0}")]
pub struct UnknownOutcome(pub String);

impl FromStr for RuleOutcome {
    type Err = UnknownOutcome;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|o| o.id() == s)
            .ok_or_else(|| UnknownOutcome(s.to_string()))
    }
}
