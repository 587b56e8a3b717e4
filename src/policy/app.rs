//! Per-app firewall status

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AppUid;
use crate::error::LookupError;

/// Firewall state of one app.
///
/// The flags are orthogonal; the evaluator decides which one wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct AppFirewallStatus {
    /// Blocked on every network
    #[serde(default)]
    pub blocked: bool,
    /// Blocked on unmetered (wifi) networks
    #[serde(default)]
    pub block_wifi: bool,
    /// Blocked on metered (mobile) networks
    #[serde(default)]
    pub block_mobile: bool,
    /// Only explicitly trusted destinations are reachable
    #[serde(default)]
    pub isolate: bool,
    /// Skips DNS-level blocking and universal rules
    #[serde(default)]
    pub bypass_dns_firewall: bool,
    /// Skips universal rules, but not DNS-level blocks
    #[serde(default)]
    pub bypass_universal: bool,
    /// Excluded from the tunnel altogether
    #[serde(default)]
    pub excluded: bool,
    /// Never seen before; classification pending
    #[serde(default)]
    pub untracked: bool,
    /// Preinstalled system app
    #[serde(default)]
    pub system_app: bool,
    /// The anonymizing proxy helper app
    #[serde(default)]
    pub proxy_helper: bool,
}

impl AppFirewallStatus {
    /// Status reported for apps the store has never seen
    #[must_use]
    pub const fn untracked() -> Self {
        Self {
            blocked: false,
            block_wifi: false,
            block_mobile: false,
            isolate: false,
            bypass_dns_firewall: false,
            bypass_universal: false,
            excluded: false,
            untracked: true,
            system_app: false,
            proxy_helper: false,
        }
    }

    /// Whether any connection-level block applies
    #[must_use]
    pub const fn is_firewalled(&self) -> bool {
        self.blocked || self.block_wifi || self.block_mobile
    }
}

/// Read access to per-app firewall status
pub trait AppRules: Send + Sync {
    /// Status of `uid`; unknown uids report [`AppFirewallStatus::untracked`]
    ///
    /// # Errors
    ///
    /// Returns `LookupError` if the store cannot answer.
    fn app_status(&self, uid: AppUid) -> Result<AppFirewallStatus, LookupError>;

    /// Whether any app bypasses the DNS firewall
    fn any_app_bypasses_dns(&self) -> bool;
}

/// In-memory app rule store
#[derive(Debug, Default)]
pub struct AppRuleStore {
    apps: DashMap<AppUid, AppFirewallStatus>,
}

impl AppRuleStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the status of an app
    pub fn set(&self, uid: AppUid, status: AppFirewallStatus) {
        debug!("app {} status set: {:?}", uid, status);
        self.apps.insert(uid, status);
    }

    /// Modify the status of an app in place, tracking it if needed
    pub fn update(&self, uid: AppUid, f: impl FnOnce(&mut AppFirewallStatus)) {
        let mut entry = self.apps.entry(uid).or_default();
        f(entry.value_mut());
    }

    /// Record that an app has been classified
    pub fn mark_tracked(&self, uid: AppUid) {
        self.update(uid, |status| status.untracked = false);
    }

    /// Apps routed around the tunnel, sorted
    #[must_use]
    pub fn excluded_uids(&self) -> Vec<AppUid> {
        let mut uids: Vec<AppUid> = self
            .apps
            .iter()
            .filter(|r| r.value().excluded)
            .map(|r| *r.key())
            .collect();
        uids.sort_unstable();
        uids
    }

    /// Forget an app
    pub fn remove(&self, uid: AppUid) -> Option<AppFirewallStatus> {
        self.apps.remove(&uid).map(|(_, v)| v)
    }

    /// Whether the app has been seen
    #[must_use]
    pub fn contains(&self, uid: AppUid) -> bool {
        self.apps.contains_key(&uid)
    }

    /// Number of known apps
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Whether no app is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

impl AppRules for AppRuleStore {
    fn app_status(&self, uid: AppUid) -> Result<AppFirewallStatus, LookupError> {
        Ok(self
            .apps
            .get(&uid)
            .map_or_else(AppFirewallStatus::untracked, |r| *r.value()))
    }

    fn any_app_bypasses_dns(&self) -> bool {
        self.apps.iter().any(|r| r.value().bypass_dns_firewall)
    }
}
