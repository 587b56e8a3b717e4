//! Flow and DNS event sinks

use tracing::info;

use crate::connection::{DnsSummary, FlowMetadata, FlowSummary};

/// Receives decided flows and close reports.
///
/// Called on the decision path; implementations must not block.
pub trait FlowLogger: Send + Sync {
    /// A flow was decided (blocked or allowed)
    fn log_flow(&self, flow: &FlowMetadata);

    /// A flow closed
    fn log_summary(&self, summary: &FlowSummary);

    /// A DNS transaction completed
    fn log_dns(&self, summary: &DnsSummary);
}

/// Emits flow records as structured `tracing` events under the
/// `policy_router::flows` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFlowLogger;

impl FlowLogger for TracingFlowLogger {
    fn log_flow(&self, flow: &FlowMetadata) {
        info!(
            target: "policy_router::flows",
            id = %flow.id,
            uid = %flow.uid,
            proto = %flow.protocol,
            dst = ?flow.dst_ip,
            port = flow.dst_port,
            query = flow.query.as_deref().unwrap_or(""),
            rule = flow.rule.map_or("", |r| r.id()),
            blocked = flow.blocked,
            blocklists = %flow.blocklists,
            "flow"
        );
    }

    fn log_summary(&self, summary: &FlowSummary) {
        info!(
            target: "policy_router::flows",
            id = %summary.id,
            bytes_in = summary.bytes_in,
            bytes_out = summary.bytes_out,
            duration_secs = summary.duration_secs,
            synack_ms = summary.synack_ms,
            reason = %summary.reason,
            "flow closed"
        );
    }

    fn log_dns(&self, summary: &DnsSummary) {
        info!(
            target: "policy_router::dns",
            name = %summary.name,
            qtype = summary.qtype,
            transport = %summary.transport,
            latency_ms = summary.latency_ms,
            blocked = summary.is_blocked(),
            error = summary.error.as_deref().unwrap_or(""),
            "dns"
        );
    }
}
