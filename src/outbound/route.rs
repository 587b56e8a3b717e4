//! Route selection for allowed flows
//!
//! First match wins:
//!
//! 1. blocked flows go nowhere
//! 2. no proxy subsystem on: base network
//! 3. the app's active WireGuard config
//! 4. the TCP relay, when the app is mapped to it
//! 5. the anonymizing proxy, when the app is mapped to it
//! 6. SOCKS5, for every app
//! 7. HTTP, for every app
//! 8. base network

use std::sync::Arc;

use tracing::{debug, warn};

use super::registry::ProxyRegistry;
use super::target::{ProxyKind, RouteTarget};
use crate::policy::AppUid;

/// Picks the egress of an allowed flow
#[derive(Clone)]
pub struct RouteSelector {
    proxies: Arc<dyn ProxyRegistry>,
}

impl RouteSelector {
    /// Create a selector over a proxy registry
    #[must_use]
    pub fn new(proxies: Arc<dyn ProxyRegistry>) -> Self {
        Self { proxies }
    }

    /// Egress for a flow of `uid`
    #[must_use]
    pub fn select(&self, uid: AppUid, blocked: bool) -> RouteTarget {
        if blocked {
            return RouteTarget::Block;
        }

        let proxies = self.proxies.as_ref();
        if !proxies.any_enabled() {
            return RouteTarget::Base;
        }

        if proxies.is_enabled(ProxyKind::WireGuard) {
            match proxies.wireguard_config(uid).map(RouteTarget::WireGuard) {
                Some(target) if proxies.is_active(target) => {
                    debug!("app {} routed to {}", uid, target);
                    return target;
                }
                Some(target) => debug!("app {} mapped to inactive {}", uid, target),
                None => {}
            }
        }

        let mapped = proxies.proxy_for(uid);

        if proxies.is_enabled(ProxyKind::Tcp) && mapped == Some(RouteTarget::TcpBase) {
            return RouteTarget::TcpBase;
        }

        if proxies.is_enabled(ProxyKind::Orbot) {
            if mapped == Some(RouteTarget::Orbot) {
                return RouteTarget::Orbot;
            }
            warn!("orbot enabled but app {} is not included", uid);
        }

        if proxies.is_enabled(ProxyKind::Socks5) {
            return RouteTarget::Socks5;
        }

        if proxies.is_enabled(ProxyKind::Http) {
            return RouteTarget::HttpProxy;
        }

        RouteTarget::Base
    }

    /// Whether flows of `uid` leave through a proxy that is up
    #[must_use]
    pub fn is_proxied(&self, uid: AppUid) -> bool {
        let proxies = self.proxies.as_ref();
        if !proxies.any_enabled() {
            return false;
        }

        if proxies.is_enabled(ProxyKind::Socks5) || proxies.is_enabled(ProxyKind::Http) {
            return true;
        }

        // WireGuard, Orbot and the TCP relay only carry mapped apps
        proxies.proxy_for(uid).is_some_and(|target| {
            target.kind().is_some_and(|kind| proxies.is_enabled(kind)) && proxies.is_active(target)
        })
    }

    /// Whether `uid` may pass while the anonymizing proxy bootstraps
    #[must_use]
    pub fn orbot_setting_up(&self) -> bool {
        self.proxies.orbot_setting_up()
    }
}
