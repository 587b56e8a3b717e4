//! Flow bookkeeping
//!
//! This module provides:
//! - Flow metadata and endpoint parsing
//! - The open-flow ledger
//! - Decision statistics

mod flow;
mod ledger;
mod stats;

pub use flow::{
    parse_endpoint, DnsSummary, FlowId, FlowMetadata, FlowSummary, Protocol, DNS_PORT, HTTP_PORT,
    NTP_PORT,
};
pub use ledger::FlowLedger;
pub use stats::{DecisionStats, DecisionStatsSnapshot};
