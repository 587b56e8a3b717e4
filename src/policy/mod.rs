//! Policy stores consulted by the rule evaluator
//!
//! The stores are owned by configuration collaborators. The engine holds
//! read handles behind the traits below and never caches their answers
//! across evaluations.
//!
//! - [`AppRules`]: per-app firewall status
//! - [`DomainRules`]: per-domain rules, per app or for everybody
//! - [`IpRules`]: per-address (and port) rules, per app or for everybody
//! - [`GlobalToggles`]: universal switches, shared and atomically mutable
//!
//! Each trait has a thread-safe in-memory implementation
//! ([`AppRuleStore`], [`DomainRuleStore`], [`IpRuleStore`]).
//!
//! # Example
//!
//! ```
//! use policy_router::policy::{AppUid, DomainRuleStatus, DomainRuleStore, DomainRules, RuleScope};
//!
//! let store = DomainRuleStore::new();
//! store.set("*.ads.example", RuleScope::Everybody, DomainRuleStatus::Block);
//! store.set("cdn.ads.example", RuleScope::App(AppUid::new(10_123)), DomainRuleStatus::Trust);
//!
//! let status = store.domain_status("x.ads.example", RuleScope::Everybody).unwrap();
//! assert_eq!(status, DomainRuleStatus::Block);
//! ```

pub mod app;
pub mod classify;
pub mod domain;
pub mod ip;
pub mod signals;
pub mod toggles;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use app::{AppFirewallStatus, AppRuleStore, AppRules};
pub use classify::{
    AppClassifier, AppRefresher, DiscardingClassifier, PendingClassifications, SpawningClassifier,
};
pub use domain::{DomainRuleStatus, DomainRuleStore, DomainRules};
pub use ip::{IpRuleStatus, IpRuleStore, IpRules};
pub use signals::{DeviceState, ForegroundSignal, NetworkState, SignalBoard};
pub use toggles::{GlobalToggles, Toggle};

/// Identity of the app that owns a flow.
///
/// Negative values mean the forwarding engine could not attribute the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppUid(i32);

impl AppUid {
    /// Owner could not be looked up
    pub const MISSING: Self = Self(-1);

    /// Owner lookup returned garbage
    pub const INVALID: Self = Self(-2);

    /// Wrap a uid
    #[must_use]
    pub const fn new(uid: i32) -> Self {
        Self(uid)
    }

    /// Convert an engine-supplied identity; out-of-range values are invalid
    #[must_use]
    pub fn from_raw(raw: i64) -> Self {
        i32::try_from(raw).map_or(Self::INVALID, Self)
    }

    /// Raw value
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Whether the owner is unknown
    #[must_use]
    pub const fn is_missing_or_invalid(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for AppUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a domain or IP rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleScope {
    /// Global ("universal") rule
    Everybody,
    /// Rule for one app
    App(AppUid),
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everybody => write!(f, "*"),
            Self::App(uid) => write!(f, "{uid}"),
        }
    }
}

impl FromStr for RuleScope {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*" | "everybody" => Ok(Self::Everybody),
            _ => Ok(Self::App(AppUid::new(s.parse()?))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_from_raw() {
        assert_eq!(AppUid::from_raw(10_042), AppUid::new(10_042));
        assert_eq!(AppUid::from_raw(i64::MAX), AppUid::INVALID);
        assert!(AppUid::from_raw(-1).is_missing_or_invalid());
        assert!(!AppUid::from_raw(0).is_missing_or_invalid());
    }

    #[test]
    fn test_scope_parse_and_display() {
        assert_eq!("*".parse::<RuleScope>().unwrap(), RuleScope::Everybody);
        assert_eq!(
            "42".parse::<RuleScope>().unwrap(),
            RuleScope::App(AppUid::new(42))
        );
        assert!("app".parse::<RuleScope>().is_err());
        assert_eq!(RuleScope::App(AppUid::new(7)).to_string(), "7");
        assert_eq!(RuleScope::Everybody.to_string(), "*");
    }
}
