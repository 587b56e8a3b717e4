//! DNS transport selection
//!
//! Each query the tunnel resolver receives is answered through a named
//! transport. The selector picks that name from the global domain rules and
//! the operating mode.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::OperatingMode;
use crate::policy::{AppRules, DomainRuleStatus, DomainRules, GlobalToggles, RuleScope, Toggle};

/// The user's preferred upstream
pub const PREFERRED: &str = "Preferred";

/// Answer every query with a block
pub const BLOCK_ALL: &str = "BlockAll";

/// Upstream that applies no blocklists
pub const BLOCK_FREE: &str = "BlockFree";

/// Resolve normally and let the per-flow evaluator decide
pub const ALG: &str = "Alg";

/// Prefix asking the resolver to cache answers
pub const CACHE_PREFIX: &str = "CT+";

/// Picks the transport for a DNS query
#[derive(Clone)]
pub struct DnsTransportSelector {
    apps: Arc<dyn AppRules>,
    domains: Arc<dyn DomainRules>,
    toggles: Arc<GlobalToggles>,
}

impl DnsTransportSelector {
    /// Create a selector
    #[must_use]
    pub fn new(
        apps: Arc<dyn AppRules>,
        domains: Arc<dyn DomainRules>,
        toggles: Arc<GlobalToggles>,
    ) -> Self {
        Self {
            apps,
            domains,
            toggles,
        }
    }

    /// Transport for `query`, given the resolver's own suggestion
    #[must_use]
    pub fn select(&self, query: Option<&str>, suggested: Option<&str>) -> String {
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            return match suggested {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => self.determine(PREFERRED, suggested),
            };
        };

        let mode = self.toggles.mode();
        let id = match mode {
            OperatingMode::Dns => self.select_dns_only(query, suggested),
            OperatingMode::DnsFirewall => self.select_dns_firewall(query, suggested),
            OperatingMode::Firewall => self.determine(PREFERRED, suggested),
        };
        debug!("query {} ({}) -> {}", query, mode, id);
        id
    }

    /// Apply the suggestion and cache prefix to a chosen transport.
    ///
    /// A non-empty suggestion wins unless the choice is [`BLOCK_ALL`]; a
    /// block is never downgraded.
    #[must_use]
    pub fn determine(&self, chosen: &str, suggested: Option<&str>) -> String {
        match suggested {
            Some(id) if !id.is_empty() && chosen != BLOCK_ALL => id.to_string(),
            _ if self.toggles.get(Toggle::DnsCache) => format!("{CACHE_PREFIX}{chosen}"),
            _ => chosen.to_string(),
        }
    }

    fn select_dns_only(&self, query: &str, suggested: Option<&str>) -> String {
        let chosen = match self.global_rule(query) {
            DomainRuleStatus::Trust => BLOCK_FREE,
            DomainRuleStatus::Block => BLOCK_ALL,
            DomainRuleStatus::None => PREFERRED,
        };
        self.determine(chosen, suggested)
    }

    fn select_dns_firewall(&self, query: &str, suggested: Option<&str>) -> String {
        if self.apps.any_app_bypasses_dns() || self.trusted_anywhere(query) {
            return ALG.to_string();
        }
        if self.global_rule(query) == DomainRuleStatus::Block {
            return BLOCK_ALL.to_string();
        }
        self.determine(PREFERRED, suggested)
    }

    fn global_rule(&self, query: &str) -> DomainRuleStatus {
        self.domains
            .domain_status(query, RuleScope::Everybody)
            .unwrap_or_else(|e| {
                warn!("global domain rule lookup for {} failed: {}", query, e);
                DomainRuleStatus::None
            })
    }

    fn trusted_anywhere(&self, query: &str) -> bool {
        self.domains.is_trusted_anywhere(query).unwrap_or_else(|e| {
            warn!("domain trust lookup for {} failed: {}", query, e);
            false
        })
    }
}
