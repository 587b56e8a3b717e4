//! Proxy registry
//!
//! Which proxy subsystems are switched on, which app maps to which proxy,
//! and which proxies are currently up. The route selector only reads it.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::{DashMap, DashSet};
use tracing::{debug, info};

use super::target::{ProxyKind, RouteTarget};
use crate::policy::AppUid;

/// Read access to proxy state
pub trait ProxyRegistry: Send + Sync {
    /// Whether a proxy subsystem is switched on
    fn is_enabled(&self, kind: ProxyKind) -> bool;

    /// Whether any proxy subsystem is switched on
    fn any_enabled(&self) -> bool {
        ProxyKind::ALL.into_iter().any(|kind| self.is_enabled(kind))
    }

    /// Proxy `uid` is mapped to; `None` means the system default
    fn proxy_for(&self, uid: AppUid) -> Option<RouteTarget>;

    /// WireGuard config `uid` is mapped to
    fn wireguard_config(&self, uid: AppUid) -> Option<u32> {
        match self.proxy_for(uid) {
            Some(RouteTarget::WireGuard(id)) => Some(id),
            _ => None,
        }
    }

    /// Whether the proxy behind `target` is up
    fn is_active(&self, target: RouteTarget) -> bool;

    /// Whether the anonymizing proxy is bootstrapping
    fn orbot_setting_up(&self) -> bool;
}

/// In-memory proxy registry
#[derive(Debug, Default)]
pub struct ProxyTable {
    enabled: DashSet<ProxyKind>,
    mapped: DashMap<AppUid, RouteTarget>,
    active: DashSet<RouteTarget>,
    orbot_setting_up: AtomicBool,
}

impl ProxyTable {
    /// Create a registry with every proxy switched off
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch a proxy subsystem on or off
    pub fn set_enabled(&self, kind: ProxyKind, enabled: bool) {
        info!("proxy {} {}", kind, if enabled { "enabled" } else { "disabled" });
        if enabled {
            self.enabled.insert(kind);
        } else {
            self.enabled.remove(&kind);
        }
    }

    /// Assign a WireGuard config to an app.
    ///
    /// `None` unassigns it, leaving a mapping to any other proxy alone.
    pub fn assign_wireguard(&self, uid: AppUid, config_id: Option<u32>) {
        debug!("app {} wireguard config: {:?}", uid, config_id);
        match config_id {
            Some(id) => {
                self.mapped.insert(uid, RouteTarget::WireGuard(id));
            }
            None => {
                self.mapped
                    .remove_if(&uid, |_, target| matches!(target, RouteTarget::WireGuard(_)));
            }
        }
    }

    /// Map an app to a proxy; `None` restores the system default
    pub fn map_app(&self, uid: AppUid, target: Option<RouteTarget>) {
        debug!("app {} proxy: {:?}", uid, target);
        match target {
            Some(target) => {
                self.mapped.insert(uid, target);
            }
            None => {
                self.mapped.remove(&uid);
            }
        }
    }

    /// Mark a proxy as up or down
    pub fn set_active(&self, target: RouteTarget, active: bool) {
        info!("proxy {} {}", target, if active { "up" } else { "down" });
        if active {
            self.active.insert(target);
        } else {
            self.active.remove(&target);
        }
    }

    /// Record whether the anonymizing proxy is bootstrapping
    pub fn set_orbot_setting_up(&self, setting_up: bool) {
        self.orbot_setting_up.store(setting_up, Ordering::Relaxed);
    }
}

impl ProxyRegistry for ProxyTable {
    fn is_enabled(&self, kind: ProxyKind) -> bool {
        self.enabled.contains(&kind)
    }

    fn proxy_for(&self, uid: AppUid) -> Option<RouteTarget> {
        self.mapped.get(&uid).map(|r| *r.value())
    }

    fn is_active(&self, target: RouteTarget) -> bool {
        self.active.contains(&target)
    }

    fn orbot_setting_up(&self) -> bool {
        self.orbot_setting_up.load(Ordering::Relaxed)
    }
}
