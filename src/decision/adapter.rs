//! Tunnel adapter handle
//!
//! The tunnel adapter is the live forwarding engine. It is torn down and
//! rebuilt when the tunnel restarts, so the façade holds it in a slot that
//! may be empty. Management calls are serialized through one mutex that
//! the decision path never takes.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AdapterError;
use crate::policy::AppUid;

/// State of a proxy inside the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    /// Carrying traffic
    Active,
    /// Handshake in progress
    Connecting,
    /// Last attempt failed
    Failed,
    /// Added but not started
    Stopped,
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Connecting => write!(f, "connecting"),
            Self::Failed => write!(f, "failed"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Management interface of the forwarding engine
pub trait TunnelAdapter: Send + Sync {
    /// Add the WireGuard proxy for a config
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the engine rejects the config.
    fn add_wireguard(&self, config_id: u32) -> Result<(), AdapterError>;

    /// Remove the WireGuard proxy for a config
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the engine fails to remove it.
    fn remove_wireguard(&self, config_id: u32) -> Result<(), AdapterError>;

    /// Re-read proxy configuration
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the engine fails to reload.
    fn refresh_proxies(&self) -> Result<(), AdapterError>;

    /// Status of a proxy by its wire id
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::UnknownProxy` for ids the engine does not know.
    fn proxy_status(&self, id: &str) -> Result<ProxyStatus, AdapterError>;

    /// Replace the set of apps routed around the tunnel
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the engine rejects the set.
    fn set_excluded_apps(&self, uids: &[AppUid]) -> Result<(), AdapterError>;
}

#[derive(Default)]
struct SlotState {
    adapter: Option<Arc<dyn TunnelAdapter>>,
    excluded: BTreeSet<AppUid>,
}

/// Holder for the current tunnel adapter
#[derive(Default)]
pub struct AdapterSlot {
    state: Mutex<SlotState>,
}

impl AdapterSlot {
    /// Create an empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an adapter and push the excluded-app set to it
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the new adapter rejects the excluded set;
    /// the adapter stays installed.
    pub fn install(&self, adapter: Arc<dyn TunnelAdapter>) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        let excluded: Vec<AppUid> = state.excluded.iter().copied().collect();
        state.adapter = Some(Arc::clone(&adapter));
        info!("tunnel adapter installed ({} excluded apps)", excluded.len());
        if excluded.is_empty() {
            Ok(())
        } else {
            adapter.set_excluded_apps(&excluded)
        }
    }

    /// Remove the adapter; returns whether one was installed
    pub fn clear(&self) -> bool {
        let removed = self.state.lock().adapter.take().is_some();
        if removed {
            info!("tunnel adapter cleared");
        }
        removed
    }

    /// Add a WireGuard proxy
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::NotInstalled` without an adapter, or the
    /// adapter's error.
    pub fn add_wireguard(&self, config_id: u32) -> Result<(), AdapterError> {
        debug!("adding wireguard proxy {}", config_id);
        self.with_adapter(|adapter| adapter.add_wireguard(config_id))
    }

    /// Remove a WireGuard proxy
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::NotInstalled` without an adapter, or the
    /// adapter's error.
    pub fn remove_wireguard(&self, config_id: u32) -> Result<(), AdapterError> {
        debug!("removing wireguard proxy {}", config_id);
        self.with_adapter(|adapter| adapter.remove_wireguard(config_id))
    }

    /// Refresh all proxies
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::NotInstalled` without an adapter, or the
    /// adapter's error.
    pub fn refresh_proxies(&self) -> Result<(), AdapterError> {
        self.with_adapter(|adapter| adapter.refresh_proxies())
    }

    /// Status of a proxy
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::NotInstalled` without an adapter, or the
    /// adapter's error.
    pub fn proxy_status(&self, id: &str) -> Result<ProxyStatus, AdapterError> {
        self.with_adapter(|adapter| adapter.proxy_status(id))
    }

    /// Replace the excluded-app set.
    ///
    /// The set is remembered and pushed to every adapter installed later.
    /// Returns `Ok(false)` when the set did not change.
    ///
    /// # Errors
    ///
    /// Returns the installed adapter's error; the new set is kept.
    pub fn set_excluded_apps(
        &self,
        uids: impl IntoIterator<Item = AppUid>,
    ) -> Result<bool, AdapterError> {
        let mut state = self.state.lock();
        let excluded: BTreeSet<AppUid> = uids.into_iter().collect();
        if excluded == state.excluded {
            return Ok(false);
        }
        info!("excluded apps changed: {} -> {}", state.excluded.len(), excluded.len());
        state.excluded = excluded;

        if let Some(adapter) = &state.adapter {
            let uids: Vec<AppUid> = state.excluded.iter().copied().collect();
            adapter.set_excluded_apps(&uids)?;
        }
        Ok(true)
    }

    /// Current excluded-app set, sorted
    #[must_use]
    pub fn excluded_apps(&self) -> Vec<AppUid> {
        self.state.lock().excluded.iter().copied().collect()
    }

    fn with_adapter<T>(
        &self,
        op: impl FnOnce(&dyn TunnelAdapter) -> Result<T, AdapterError>,
    ) -> Result<T, AdapterError> {
        let state = self.state.lock();
        let adapter = state.adapter.as_deref().ok_or(AdapterError::NotInstalled)?;
        op(adapter)
    }
}

impl fmt::Debug for AdapterSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AdapterSlot")
            .field("installed", &state.adapter.is_some())
            .field("excluded", &state.excluded)
            .finish()
    }
}
