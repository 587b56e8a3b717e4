//! External signals sampled during evaluation
//!
//! These are live device facts owned by other subsystems. The evaluator
//! samples them on every call and never caches an answer.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashSet;
use tracing::debug;

use super::AppUid;
use crate::connection::FlowMetadata;

/// Which apps are in the foreground
pub trait ForegroundSignal: Send + Sync {
    /// Whether the signal source works at all (e.g. the accessibility
    /// service is running)
    fn is_functional(&self) -> bool;

    /// Whether `uid` currently has a foreground activity
    fn is_foreground(&self, uid: AppUid) -> bool;
}

/// Metered state of the network a flow leaves through
pub trait NetworkState: Send + Sync {
    /// Whether `flow` would egress over a metered network
    fn is_metered(&self, flow: &FlowMetadata) -> bool;
}

/// Device lock state
pub trait DeviceState: Send + Sync {
    /// Whether the screen is locked
    fn is_locked(&self) -> bool;
}

/// In-memory implementation of every signal trait.
///
/// The console binary and tests drive it directly; embedders feed it from
/// platform callbacks.
#[derive(Debug)]
pub struct SignalBoard {
    functional: AtomicBool,
    metered: AtomicBool,
    locked: AtomicBool,
    foreground: DashSet<AppUid>,
}

impl Default for SignalBoard {
    fn default() -> Self {
        Self {
            functional: AtomicBool::new(true),
            metered: AtomicBool::new(false),
            locked: AtomicBool::new(false),
            foreground: DashSet::new(),
        }
    }
}

impl SignalBoard {
    /// Create a board with a working foreground source, an unmetered network
    /// and an unlocked device
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the foreground signal source as working or broken
    pub fn set_functional(&self, functional: bool) {
        self.functional.store(functional, Ordering::Relaxed);
    }

    /// Set the metered state of the active network
    pub fn set_metered(&self, metered: bool) {
        self.metered.store(metered, Ordering::Relaxed);
    }

    /// Set the device lock state
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Relaxed);
    }

    /// Move an app in or out of the foreground
    pub fn set_foreground(&self, uid: AppUid, foreground: bool) {
        debug!("app {} foreground: {}", uid, foreground);
        if foreground {
            self.foreground.insert(uid);
        } else {
            self.foreground.remove(&uid);
        }
    }
}

impl ForegroundSignal for SignalBoard {
    fn is_functional(&self) -> bool {
        self.functional.load(Ordering::Relaxed)
    }

    fn is_foreground(&self, uid: AppUid) -> bool {
        self.foreground.contains(&uid)
    }
}

impl NetworkState for SignalBoard {
    fn is_metered(&self, _flow: &FlowMetadata) -> bool {
        self.metered.load(Ordering::Relaxed)
    }
}

impl DeviceState for SignalBoard {
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Protocol;

    #[test]
    fn test_defaults() {
        let board = SignalBoard::new();
        assert!(board.is_functional());
        assert!(!board.is_locked());
        let flow = FlowMetadata::new(AppUid::new(1), Protocol::Tcp, None, 0, None, 443);
        assert!(!board.is_metered(&flow));
    }

    #[test]
    fn test_foreground_set() {
        let board = SignalBoard::new();
        let uid = AppUid::new(10_077);
        assert!(!board.is_foreground(uid));
        board.set_foreground(uid, true);
        assert!(board.is_foreground(uid));
        board.set_foreground(uid, false);
        assert!(!board.is_foreground(uid));
    }

    #[test]
    fn test_switches() {
        let board = SignalBoard::new();
        board.set_functional(false);
        board.set_locked(true);
        board.set_metered(true);
        assert!(!board.is_functional());
        assert!(board.is_locked());
        let flow = FlowMetadata::new(AppUid::new(1), Protocol::Udp, None, 0, None, 53);
        assert!(board.is_metered(&flow));
    }
}
