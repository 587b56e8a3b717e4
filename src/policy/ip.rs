//! Per-address rules
//!
//! Lookup order for one scope:
//!
//! 1. exact address and port
//! 2. exact address, any port (port `0`)
//! 3. the longest matching subnet whose port is `0` or equal to the flow's

use std::fmt;
use std::net::IpAddr;

use dashmap::DashMap;
use ipnet::IpNet;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RuleScope;
use crate::error::LookupError;

/// Status of an IP rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpRuleStatus {
    /// No rule
    #[default]
    None,
    /// Block the address
    Block,
    /// Allow the address, skipping later rules
    Trust,
    /// Exempt the address from universal rules
    BypassUniversal,
}

impl IpRuleStatus {
    /// Parse a status name
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "block" => Some(Self::Block),
            "trust" | "allow" => Some(Self::Trust),
            "bypass" | "bypass_universal" => Some(Self::BypassUniversal),
            _ => None,
        }
    }
}

impl fmt::Display for IpRuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Block => write!(f, "block"),
            Self::Trust => write!(f, "trust"),
            Self::BypassUniversal => write!(f, "bypass_universal"),
        }
    }
}

/// Read access to IP rules
pub trait IpRules: Send + Sync {
    /// Rule for `ip:port` in exactly `scope`
    ///
    /// # Errors
    ///
    /// Returns `LookupError` if the store cannot answer.
    fn ip_status(&self, scope: RuleScope, ip: IpAddr, port: u16) -> Result<IpRuleStatus, LookupError>;
}

#[derive(Debug, Clone)]
struct SubnetRule {
    scope: RuleScope,
    net: IpNet,
    port: u16,
    status: IpRuleStatus,
}

/// In-memory IP rule store
#[derive(Debug, Default)]
pub struct IpRuleStore {
    exact: DashMap<(RuleScope, IpAddr, u16), IpRuleStatus>,
    subnets: RwLock<Vec<SubnetRule>>,
}

impl IpRuleStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for one address; port `0` matches any port and `None`
    /// removes the rule
    pub fn set(&self, scope: RuleScope, ip: IpAddr, port: u16, status: IpRuleStatus) {
        debug!("ip rule {}:{} [{}] = {}", ip, port, scope, status);
        if status == IpRuleStatus::None {
            self.exact.remove(&(scope, ip, port));
        } else {
            self.exact.insert((scope, ip, port), status);
        }
    }

    /// Set the rule for a subnet; `None` removes it
    pub fn set_subnet(&self, scope: RuleScope, net: IpNet, port: u16, status: IpRuleStatus) {
        debug!("subnet rule {}:{} [{}] = {}", net, port, scope, status);
        let net = net.trunc();
        let mut subnets = self.subnets.write();
        subnets.retain(|r| !(r.scope == scope && r.net == net && r.port == port));
        if status != IpRuleStatus::None {
            subnets.push(SubnetRule {
                scope,
                net,
                port,
                status,
            });
        }
    }

    /// Number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.subnets.read().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IpRules for IpRuleStore {
    fn ip_status(&self, scope: RuleScope, ip: IpAddr, port: u16) -> Result<IpRuleStatus, LookupError> {
        if let Some(status) = self.exact.get(&(scope, ip, port)) {
            return Ok(*status);
        }
        if port != 0 {
            if let Some(status) = self.exact.get(&(scope, ip, 0)) {
                return Ok(*status);
            }
        }

        let subnets = self.subnets.read();
        let best = subnets
            .iter()
            .filter(|r| r.scope == scope && (r.port == 0 || r.port == port) && r.net.contains(&ip))
            .max_by_key(|r| (r.net.prefix_len(), r.port != 0));

        Ok(best.map_or(IpRuleStatus::None, |r| r.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AppUid;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_exact_port_before_any_port() {
        let store = IpRuleStore::new();
        store.set(RuleScope::Everybody, ip("1.2.3.4"), 0, IpRuleStatus::Block);
        store.set(RuleScope::Everybody, ip("1.2.3.4"), 443, IpRuleStatus::Trust);

        let status = |port| store.ip_status(RuleScope::Everybody, ip("1.2.3.4"), port).unwrap();
        assert_eq!(status(443), IpRuleStatus::Trust);
        assert_eq!(status(80), IpRuleStatus::Block);
        assert_eq!(status(0), IpRuleStatus::Block);
    }

    #[test]
    fn test_subnet_longest_prefix() {
        let store = IpRuleStore::new();
        store.set_subnet(
            RuleScope::Everybody,
            "10.0.0.0/8".parse().unwrap(),
            0,
            IpRuleStatus::Block,
        );
        store.set_subnet(
            RuleScope::Everybody,
            "10.1.0.0/16".parse().unwrap(),
            0,
            IpRuleStatus::BypassUniversal,
        );

        let status = |s| store.ip_status(RuleScope::Everybody, ip(s), 53).unwrap();
        assert_eq!(status("10.2.3.4"), IpRuleStatus::Block);
        assert_eq!(status("10.1.3.4"), IpRuleStatus::BypassUniversal);
        assert_eq!(status("192.168.1.1"), IpRuleStatus::None);
    }

    #[test]
    fn test_subnet_port_filter() {
        let store = IpRuleStore::new();
        store.set_subnet(
            RuleScope::Everybody,
            "2001:db8::/32".parse().unwrap(),
            853,
            IpRuleStatus::Trust,
        );
        assert_eq!(
            store
                .ip_status(RuleScope::Everybody, ip("2001:db8::1"), 853)
                .unwrap(),
            IpRuleStatus::Trust
        );
        assert_eq!(
            store
                .ip_status(RuleScope::Everybody, ip("2001:db8::1"), 443)
                .unwrap(),
            IpRuleStatus::None
        );
    }

    #[test]
    fn test_exact_wins_over_subnet() {
        let store = IpRuleStore::new();
        store.set_subnet(
            RuleScope::Everybody,
            "8.8.0.0/16".parse().unwrap(),
            0,
            IpRuleStatus::Block,
        );
        store.set(RuleScope::Everybody, ip("8.8.8.8"), 0, IpRuleStatus::Trust);
        assert_eq!(
            store.ip_status(RuleScope::Everybody, ip("8.8.8.8"), 53).unwrap(),
            IpRuleStatus::Trust
        );
    }

    #[test]
    fn test_scopes_are_independent() {
        let app = RuleScope::App(AppUid::new(10_200));
        let store = IpRuleStore::new();
        store.set(app, ip("9.9.9.9"), 0, IpRuleStatus::Block);

        assert_eq!(
            store.ip_status(app, ip("9.9.9.9"), 53).unwrap(),
            IpRuleStatus::Block
        );
        assert_eq!(
            store.ip_status(RuleScope::Everybody, ip("9.9.9.9"), 53).unwrap(),
            IpRuleStatus::None
        );
    }

    #[test]
    fn test_set_none_removes() {
        let store = IpRuleStore::new();
        let net: IpNet = "172.16.0.0/12".parse().unwrap();
        store.set_subnet(RuleScope::Everybody, net, 0, IpRuleStatus::Block);
        store.set(RuleScope::Everybody, ip("1.1.1.1"), 0, IpRuleStatus::Block);
        assert_eq!(store.len(), 2);

        store.set_subnet(RuleScope::Everybody, net, 0, IpRuleStatus::None);
        store.set(RuleScope::Everybody, ip("1.1.1.1"), 0, IpRuleStatus::None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(IpRuleStatus::parse("bypass"), Some(IpRuleStatus::BypassUniversal));
        assert_eq!(IpRuleStatus::parse("Trust"), Some(IpRuleStatus::Trust));
        assert_eq!(IpRuleStatus::parse("drop"), None);
    }
}
