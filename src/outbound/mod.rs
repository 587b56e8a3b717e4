//! Outbound route selection
//!
//! An allowed flow leaves either through the underlying network or through
//! one of several proxy subsystems. This module only names the egress; the
//! forwarding engine does the transport.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use policy_router::outbound::{ProxyKind, ProxyTable, RouteSelector, RouteTarget};
//! use policy_router::policy::AppUid;
//!
//! let table = Arc::new(ProxyTable::new());
//! table.set_enabled(ProxyKind::WireGuard, true);
//! table.assign_wireguard(AppUid::new(42), Some(3));
//! table.set_active(RouteTarget::WireGuard(3), true);
//!
//! let selector = RouteSelector::new(table);
//! assert_eq!(selector.select(AppUid::new(42), false).to_string(), "wg3");
//! assert_eq!(selector.select(AppUid::new(42), true), RouteTarget::Block);
//! ```

mod registry;
mod route;
mod target;

pub use registry::{ProxyRegistry, ProxyTable};
pub use route::RouteSelector;
pub use target::{ProxyKind, RouteTarget, UnknownTarget, WIREGUARD_PREFIX};
