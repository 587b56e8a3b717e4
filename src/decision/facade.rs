//! Decision façade
//!
//! The single entry point the forwarding engine calls. Every call returns a
//! decision; failures inside are resolved to a block by the evaluator and
//! never surface here.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, trace};

use super::adapter::{AdapterSlot, ProxyStatus, TunnelAdapter};
use super::logger::FlowLogger;
use super::request::FlowRequest;
use super::response::RouteDecision;
use crate::config::TunnelConfig;
use crate::connection::{DecisionStats, DnsSummary, FlowLedger, FlowMetadata, FlowSummary};
use crate::dns::DnsTransportSelector;
use crate::error::AdapterError;
use crate::outbound::RouteTarget;
use crate::policy::AppUid;
use crate::rules::{RuleEvaluator, RuleOutcome};

/// Entry point for flow, query and close callbacks
pub struct DecisionFacade {
    evaluator: RuleEvaluator,
    transports: DnsTransportSelector,
    logger: Arc<dyn FlowLogger>,
    tunnel: ArcSwap<TunnelConfig>,
    ledger: FlowLedger,
    stats: DecisionStats,
    adapter: AdapterSlot,
}

impl DecisionFacade {
    /// Create a façade over an evaluator
    #[must_use]
    pub fn new(evaluator: RuleEvaluator, logger: Arc<dyn FlowLogger>, tunnel: TunnelConfig) -> Self {
        let transports =
            DnsTransportSelector::new(evaluator.apps(), evaluator.domains(), evaluator.toggles());
        Self {
            evaluator,
            transports,
            logger,
            tunnel: ArcSwap::from_pointee(tunnel),
            ledger: FlowLedger::new(),
            stats: DecisionStats::new(),
            adapter: AdapterSlot::new(),
        }
    }

    /// Decide a new flow.
    ///
    /// Blocked flows are logged and answered with [`RouteTarget::Block`].
    /// Allowed flows are opened in the ledger before their route is chosen.
    pub fn on_new_flow(&self, request: &FlowRequest) -> RouteDecision {
        let (mut flow, any_real_ip_blocked) = request.to_metadata();
        trace!("new flow {} (resolved: {})", flow, request.is_resolved());

        let blocked = if self.is_resolver_query(&flow) {
            debug!("flow {} goes to the tunnel resolver, not evaluated", flow.id);
            self.stats.record_exempt();
            false
        } else {
            self.decide(&mut flow, any_real_ip_blocked)
        };

        if blocked {
            return RouteDecision::new(RouteTarget::Block, flow.id, flow.uid);
        }

        self.ledger.open(flow.id.clone());
        let target = self.evaluator.routes().select(flow.uid, false);
        debug!("flow {} routed to {}", flow.id, target);
        RouteDecision::new(target, flow.id, flow.uid)
    }

    /// Pick the DNS transport for a query
    pub fn on_query(&self, name: Option<&str>, suggested: Option<&str>) -> String {
        self.stats.record_query();
        self.transports.select(name, suggested)
    }

    /// Handle a close report; unknown ids are still logged
    pub fn on_flow_closed(&self, summary: &FlowSummary) {
        if !self.ledger.close(summary.id.as_str()) {
            trace!("close for untracked flow {}", summary.id);
        }
        self.stats.record_closed(summary.bytes_in, summary.bytes_out);
        self.logger.log_summary(summary);
    }

    /// Handle a completed DNS transaction
    pub fn on_dns_response(&self, summary: &DnsSummary) {
        self.logger.log_dns(summary);
    }

    /// Whether a flow is open
    #[must_use]
    pub fn is_flow_tracked(&self, id: &str) -> bool {
        self.ledger.is_open(id)
    }

    /// Replace the tunnel resolver settings after a tunnel rebuild
    pub fn reload_tunnel(&self, tunnel: TunnelConfig) {
        info!(
            "tunnel resolver now {} / {} ({:?})",
            tunnel.dns_ipv4, tunnel.dns_ipv6, tunnel.protocol
        );
        self.tunnel.store(Arc::new(tunnel));
    }

    /// Rule evaluator
    #[must_use]
    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    /// Open-flow ledger
    #[must_use]
    pub fn ledger(&self) -> &FlowLedger {
        &self.ledger
    }

    /// Decision statistics
    #[must_use]
    pub fn stats(&self) -> &DecisionStats {
        &self.stats
    }

    // Tunnel adapter management

    /// Install the tunnel adapter
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the adapter rejects the excluded-app set.
    pub fn install_adapter(&self, adapter: Arc<dyn TunnelAdapter>) -> Result<(), AdapterError> {
        self.adapter.install(adapter)
    }

    /// Remove the tunnel adapter; returns whether one was installed
    pub fn clear_adapter(&self) -> bool {
        self.adapter.clear()
    }

    /// Add a WireGuard proxy to the tunnel
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if no adapter is installed or it fails.
    pub fn add_wireguard(&self, config_id: u32) -> Result<(), AdapterError> {
        self.adapter.add_wireguard(config_id)
    }

    /// Remove a WireGuard proxy from the tunnel
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if no adapter is installed or it fails.
    pub fn remove_wireguard(&self, config_id: u32) -> Result<(), AdapterError> {
        self.adapter.remove_wireguard(config_id)
    }

    /// Refresh all tunnel proxies
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if no adapter is installed or it fails.
    pub fn refresh_proxies(&self) -> Result<(), AdapterError> {
        self.adapter.refresh_proxies()
    }

    /// Status of a tunnel proxy by id
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if no adapter is installed or the id is unknown.
    pub fn proxy_status(&self, id: &str) -> Result<ProxyStatus, AdapterError> {
        self.adapter.proxy_status(id)
    }

    /// Replace the set of apps routed around the tunnel
    ///
    /// # Errors
    ///
    /// Returns `AdapterError` if the installed adapter rejects the set.
    pub fn set_excluded_apps(
        &self,
        uids: impl IntoIterator<Item = AppUid>,
    ) -> Result<bool, AdapterError> {
        self.adapter.set_excluded_apps(uids)
    }

    /// Apps routed around the tunnel
    #[must_use]
    pub fn excluded_apps(&self) -> Vec<AppUid> {
        self.adapter.excluded_apps()
    }

    fn is_resolver_query(&self, flow: &FlowMetadata) -> bool {
        flow.is_dns() && flow.dst_ip.is_some_and(|ip| self.tunnel.load().is_resolver(ip))
    }

    fn decide(&self, flow: &mut FlowMetadata, any_real_ip_blocked: bool) -> bool {
        let outcome = self.evaluator.apply(flow, any_real_ip_blocked);
        if outcome == RuleOutcome::EvaluationFailure {
            self.stats.record_failure();
        }
        self.stats.record_evaluated(flow.blocked);
        self.logger.log_flow(flow);
        flow.blocked
    }
}
