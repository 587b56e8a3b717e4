//! Open-flow ledger
//!
//! An id is present from the moment its flow is admitted until the
//! forwarding engine reports it closed. Blocked flows are never opened.

use dashmap::DashSet;
use tracing::trace;

use super::flow::FlowId;

/// Set of flows currently open
#[derive(Debug, Default)]
pub struct FlowLedger {
    open: DashSet<FlowId>,
}

impl FlowLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a flow as open; returns `false` if it already was
    pub fn open(&self, id: FlowId) -> bool {
        trace!("flow {} opened", id);
        self.open.insert(id)
    }

    /// Record a flow as closed; returns `false` if it was not open
    pub fn close(&self, id: &str) -> bool {
        trace!("flow {} closed", id);
        self.open.remove(id).is_some()
    }

    /// Whether a flow is open
    #[must_use]
    pub fn is_open(&self, id: &str) -> bool {
        self.open.contains(id)
    }

    /// Number of open flows
    #[must_use]
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Whether no flow is open
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
