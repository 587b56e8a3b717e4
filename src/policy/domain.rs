//! Per-domain rules
//!
//! Rules are keyed by (scope, pattern). A pattern is either an exact name
//! (`api.example.com`) or a wildcard over subdomains (`*.example.com`).
//! Exact entries win over wildcards, and longer wildcards win over shorter
//! ones.

use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RuleScope;
use crate::error::LookupError;

/// Status of a domain rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainRuleStatus {
    /// No rule
    #[default]
    None,
    /// Block the domain
    Block,
    /// Allow the domain, skipping later rules
    Trust,
}

impl DomainRuleStatus {
    /// Parse a status name
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "block" => Some(Self::Block),
            "trust" | "allow" => Some(Self::Trust),
            _ => None,
        }
    }
}

impl fmt::Display for DomainRuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Block => write!(f, "block"),
            Self::Trust => write!(f, "trust"),
        }
    }
}

/// Read access to domain rules
pub trait DomainRules: Send + Sync {
    /// Rule for `domain` in exactly `scope` (per-app lookups do not fall
    /// back to global rules)
    ///
    /// # Errors
    ///
    /// Returns `LookupError` if the store cannot answer.
    fn domain_status(&self, domain: &str, scope: RuleScope) -> Result<DomainRuleStatus, LookupError>;

    /// Whether any scope trusts `domain`
    ///
    /// # Errors
    ///
    /// Returns `LookupError` if the store cannot answer.
    fn is_trusted_anywhere(&self, domain: &str) -> Result<bool, LookupError>;
}

/// In-memory domain rule store
#[derive(Debug, Default)]
pub struct DomainRuleStore {
    rules: DashMap<(RuleScope, String), DomainRuleStatus>,
}

impl DomainRuleStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for a pattern; `None` removes it
    pub fn set(&self, pattern: &str, scope: RuleScope, status: DomainRuleStatus) {
        let key = (scope, normalize(pattern));
        if key.1.is_empty() {
            return;
        }
        debug!("domain rule {} [{}] = {}", key.1, scope, status);
        if status == DomainRuleStatus::None {
            self.rules.remove(&key);
        } else {
            self.rules.insert(key, status);
        }
    }

    /// Number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn lookup(&self, name: &str, scope: RuleScope) -> DomainRuleStatus {
        if let Some(status) = self.rules.get(&(scope, name.to_string())) {
            return *status;
        }

        let mut rest = name;
        while let Some(idx) = rest.find('.') {
            rest = &rest[idx + 1..];
            if rest.is_empty() {
                break;
            }
            if let Some(status) = self.rules.get(&(scope, format!("*.{rest}"))) {
                return *status;
            }
        }

        DomainRuleStatus::None
    }
}

impl DomainRules for DomainRuleStore {
    fn domain_status(&self, domain: &str, scope: RuleScope) -> Result<DomainRuleStatus, LookupError> {
        let name = normalize(domain);
        if name.is_empty() {
            return Ok(DomainRuleStatus::None);
        }
        Ok(self.lookup(&name, scope))
    }

    fn is_trusted_anywhere(&self, domain: &str) -> Result<bool, LookupError> {
        let name = normalize(domain);
        if name.is_empty() {
            return Ok(false);
        }
        Ok(self
            .rules
            .iter()
            .any(|r| *r.value() == DomainRuleStatus::Trust && pattern_matches(&r.key().1, &name)))
    }
}

fn normalize(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern == name {
        return true;
    }
    pattern
        .strip_prefix('*')
        .is_some_and(|suffix| suffix.starts_with('.') && name.ends_with(suffix))
}
