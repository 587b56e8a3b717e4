//! Ordered rule evaluator
//!
//! A flow is run through a fixed list of steps. Each step looks at the
//! same [`EvalContext`] and either returns an outcome, which ends the
//! evaluation, or falls through to the next step. A flow no step claims is
//! allowed with [`RuleOutcome::NoRule`].
//!
//! # Failure handling
//!
//! - Domain and IP lookups that fail are logged and read as "no rule".
//! - A failed app status lookup, or a panic inside any step, blocks the
//!   flow with [`RuleOutcome::EvaluationFailure`].
//! - The background check fails open: a broken foreground signal switches
//!   background blocking off and lets the flow through.
//!
//! # Blocking
//!
//! Two steps wait on the [`RetryGate`] and may hold the calling thread for
//! the gate's budget plus stall. Only untracked apps and background
//! blocking pay this.

use std::any::Any;
use std::cell::OnceCell;
use std::net::IpAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::gate::{Clock, RetryGate, SystemClock};
use super::outcome::RuleOutcome;
use crate::config::GateConfig;
use crate::connection::{FlowMetadata, HTTP_PORT, NTP_PORT};
use crate::error::EvaluationError;
use crate::outbound::{ProxyRegistry, ProxyTable, RouteSelector};
use crate::policy::{
    AppClassifier, AppFirewallStatus, AppRuleStore, AppRules, DeviceState, DiscardingClassifier,
    DomainRuleStatus, DomainRuleStore, DomainRules, ForegroundSignal, GlobalToggles, IpRuleStatus,
    IpRuleStore, IpRules, NetworkState, RuleScope, SignalBoard, Toggle,
};

/// One rule of the precedence list
type Step = fn(&RuleEvaluator, &EvalContext<'_>) -> Option<RuleOutcome>;

/// Precedence list, first match wins
const STEPS: &[(&str, Step)] = &[
    ("proxy-bootstrap", RuleEvaluator::proxy_bootstrap),
    ("unknown-app", RuleEvaluator::unknown_app),
    ("newly-installed", RuleEvaluator::newly_installed),
    ("app-block", RuleEvaluator::app_block),
    ("app-domain", RuleEvaluator::app_domain),
    ("app-ip", RuleEvaluator::app_ip),
    ("dns-firewall-bypass", RuleEvaluator::dns_firewall_bypass),
    ("isolate", RuleEvaluator::isolate),
    ("bypass-universal", RuleEvaluator::bypass_universal),
    ("global-domain", RuleEvaluator::global_domain),
    ("global-ip", RuleEvaluator::global_ip),
    ("any-real-ip-blocked", RuleEvaluator::real_ip_blocked),
    ("metered", RuleEvaluator::metered),
    ("universal-lockdown", RuleEvaluator::universal_lockdown),
    ("http", RuleEvaluator::http),
    ("device-locked", RuleEvaluator::device_locked),
    ("udp", RuleEvaluator::udp),
    ("background", RuleEvaluator::background),
    ("dns-trap", RuleEvaluator::dns_trap),
    ("dns-bypassed", RuleEvaluator::dns_bypassed),
    ("proxy-route", RuleEvaluator::proxy_route),
];

/// Per-evaluation state shared by every step
#[derive(Debug)]
pub struct EvalContext<'a> {
    /// Flow under evaluation
    pub flow: &'a FlowMetadata,
    /// App status, looked up once
    pub status: AppFirewallStatus,
    /// Whether a resolved address of the flow's domain was blocked at DNS time
    pub any_real_ip_blocked: bool,
    global_domain: OnceCell<DomainRuleStatus>,
}

impl<'a> EvalContext<'a> {
    fn new(flow: &'a FlowMetadata, status: AppFirewallStatus, any_real_ip_blocked: bool) -> Self {
        Self {
            flow,
            status,
            any_real_ip_blocked,
            global_domain: OnceCell::new(),
        }
    }
}

/// Rule evaluator
#[derive(Clone)]
pub struct RuleEvaluator {
    apps: Arc<dyn AppRules>,
    domains: Arc<dyn DomainRules>,
    ips: Arc<dyn IpRules>,
    toggles: Arc<GlobalToggles>,
    foreground: Arc<dyn ForegroundSignal>,
    network: Arc<dyn NetworkState>,
    device: Arc<dyn DeviceState>,
    classifier: Arc<dyn AppClassifier>,
    routes: RouteSelector,
    gate: RetryGate,
}

impl RuleEvaluator {
    /// Start building an evaluator over empty in-memory stores
    #[must_use]
    pub fn builder() -> RuleEvaluatorBuilder {
        RuleEvaluatorBuilder::new()
    }

    /// Evaluate a flow without touching it
    #[must_use]
    pub fn evaluate(&self, flow: &FlowMetadata, any_real_ip_blocked: bool) -> RuleOutcome {
        match self.try_evaluate(flow, any_real_ip_blocked) {
            Ok(outcome) => {
                debug!("flow {} -> {}", flow, outcome);
                outcome
            }
            Err(e) => {
                error!("evaluation of flow {} failed, blocking: {}", flow, e);
                RuleOutcome::EvaluationFailure
            }
        }
    }

    /// Evaluate a flow and tag it with the outcome
    pub fn apply(&self, flow: &mut FlowMetadata, any_real_ip_blocked: bool) -> RuleOutcome {
        let outcome = self.evaluate(flow, any_real_ip_blocked);
        flow.rule = Some(outcome);
        flow.blocked = outcome.blocks();
        outcome
    }

    /// Evaluate a flow, surfacing failures
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError` if the app status cannot be read or a step
    /// panics.
    pub fn try_evaluate(
        &self,
        flow: &FlowMetadata,
        any_real_ip_blocked: bool,
    ) -> Result<RuleOutcome, EvaluationError> {
        let status = guarded("app-status", || self.apps.app_status(flow.uid))??;
        let ctx = EvalContext::new(flow, status, any_real_ip_blocked);

        for &(name, step) in STEPS {
            if let Some(outcome) = guarded(name, || step(self, &ctx))? {
                debug!("flow {} matched step {}", flow.id, name);
                return Ok(outcome);
            }
        }

        Ok(RuleOutcome::NoRule)
    }

    /// App rule store
    #[must_use]
    pub fn apps(&self) -> Arc<dyn AppRules> {
        Arc::clone(&self.apps)
    }

    /// Domain rule store
    #[must_use]
    pub fn domains(&self) -> Arc<dyn DomainRules> {
        Arc::clone(&self.domains)
    }

    /// Global toggles
    #[must_use]
    pub fn toggles(&self) -> Arc<GlobalToggles> {
        Arc::clone(&self.toggles)
    }

    /// Route selector sharing this evaluator's proxy registry
    #[must_use]
    pub fn routes(&self) -> &RouteSelector {
        &self.routes
    }

    // Lookups

    fn domain_rule(&self, domain: Option<&str>, scope: RuleScope) -> DomainRuleStatus {
        let Some(domain) = domain else {
            return DomainRuleStatus::None;
        };
        self.domains.domain_status(domain, scope).unwrap_or_else(|e| {
            warn!("domain rule lookup for {} [{}] failed: {}", domain, scope, e);
            DomainRuleStatus::None
        })
    }

    fn ip_rule(&self, ip: Option<IpAddr>, port: u16, scope: RuleScope) -> IpRuleStatus {
        let Some(ip) = ip else {
            return IpRuleStatus::None;
        };
        self.ips.ip_status(scope, ip, port).unwrap_or_else(|e| {
            warn!("ip rule lookup for {}:{} [{}] failed: {}", ip, port, scope, e);
            IpRuleStatus::None
        })
    }

    fn global_domain_rule(&self, ctx: &EvalContext<'_>) -> DomainRuleStatus {
        *ctx.global_domain
            .get_or_init(|| self.domain_rule(ctx.flow.domain(), RuleScope::Everybody))
    }

    fn toggle(&self, toggle: Toggle) -> bool {
        self.toggles.get(toggle)
    }

    fn dns_proxied(&self, port: u16) -> bool {
        self.toggles.mode().is_dns_firewall()
            && self.toggle(Toggle::PreventDnsLeaks)
            && port == crate::connection::DNS_PORT
    }

    fn tracked_and_allowed(&self, ctx: &EvalContext<'_>) -> bool {
        match self.apps.app_status(ctx.flow.uid) {
            Ok(status) => !status.untracked && !status.is_firewalled(),
            Err(e) => {
                debug!("app {} status unavailable while waiting: {}", ctx.flow.uid, e);
                false
            }
        }
    }

    // Steps

    fn proxy_bootstrap(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        (ctx.status.proxy_helper && self.routes.orbot_setting_up())
            .then_some(RuleOutcome::ProxyBootstrapAllow)
    }

    fn unknown_app(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        (self.toggle(Toggle::BlockUnknownApps) && ctx.flow.uid.is_missing_or_invalid())
            .then_some(RuleOutcome::UnknownAppBlock)
    }

    fn newly_installed(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        let uid = ctx.flow.uid;
        if !ctx.status.untracked {
            return None;
        }

        self.classifier.request_classification(uid);
        // unattributed flows are left to the unknown-app rule
        if uid.is_missing_or_invalid() || !self.toggle(Toggle::BlockNewlyInstalled) {
            return None;
        }

        let outcome = self.gate.wait(|| self.tracked_and_allowed(ctx));
        debug!("newly installed app {}: {}", uid, outcome);
        (!outcome.is_satisfied()).then_some(RuleOutcome::NewlyInstalledBlock)
    }

    fn app_block(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        let status = &ctx.status;
        if status.blocked {
            return Some(RuleOutcome::AppBlock);
        }

        if self.toggle(Toggle::UseMultipleNetworks) || self.toggle(Toggle::VpnLockdown) {
            return None;
        }
        if !status.block_wifi && !status.block_mobile {
            return None;
        }

        let metered = self.network.is_metered(ctx.flow);
        if status.block_wifi && !metered {
            return Some(RuleOutcome::WifiBlock);
        }
        if status.block_mobile && metered {
            return Some(RuleOutcome::MobileDataBlock);
        }
        None
    }

    fn app_domain(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        match self.domain_rule(ctx.flow.domain(), RuleScope::App(ctx.flow.uid)) {
            DomainRuleStatus::Block => Some(RuleOutcome::DomainBlock),
            DomainRuleStatus::Trust => Some(RuleOutcome::DomainTrust),
            DomainRuleStatus::None => None,
        }
    }

    fn app_ip(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        let flow = ctx.flow;
        match self.ip_rule(flow.dst_ip, flow.dst_port, RuleScope::App(flow.uid)) {
            IpRuleStatus::Block => Some(RuleOutcome::IpBlock),
            IpRuleStatus::Trust => Some(RuleOutcome::IpTrust),
            // universal bypass is decided after the app rules
            IpRuleStatus::BypassUniversal | IpRuleStatus::None => None,
        }
    }

    fn dns_firewall_bypass(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        ctx.status
            .bypass_dns_firewall
            .then_some(RuleOutcome::DnsFirewallBypass)
    }

    fn isolate(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        ctx.status.isolate.then_some(RuleOutcome::IsolateMode)
    }

    fn bypass_universal(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        if !ctx.status.bypass_universal {
            return None;
        }

        // blocked at DNS time, and the user has not trusted the domain
        if ctx.any_real_ip_blocked && self.global_domain_rule(ctx) != DomainRuleStatus::Trust {
            return Some(RuleOutcome::UniversalBypassBlock);
        }

        if self.dns_proxied(ctx.flow.dst_port) {
            Some(RuleOutcome::DnsTrap)
        } else {
            Some(RuleOutcome::UniversalBypassAllow)
        }
    }

    fn global_domain(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        match self.global_domain_rule(ctx) {
            DomainRuleStatus::Trust => Some(RuleOutcome::GlobalDomainTrust),
            DomainRuleStatus::Block => Some(RuleOutcome::GlobalDomainBlock),
            DomainRuleStatus::None => None,
        }
    }

    fn global_ip(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        let flow = ctx.flow;
        match self.ip_rule(flow.dst_ip, flow.dst_port, RuleScope::Everybody) {
            IpRuleStatus::Block => Some(RuleOutcome::GlobalIpBlock),
            IpRuleStatus::BypassUniversal => Some(RuleOutcome::GlobalIpBypass),
            IpRuleStatus::Trust | IpRuleStatus::None => None,
        }
    }

    fn real_ip_blocked(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        ctx.any_real_ip_blocked
            .then_some(RuleOutcome::AnyRealIpBlocked)
    }

    fn metered(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        (self.toggle(Toggle::BlockMetered) && self.network.is_metered(ctx.flow))
            .then_some(RuleOutcome::MeteredBlock)
    }

    fn universal_lockdown(&self, _ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        self.toggle(Toggle::UniversalLockdown)
            .then_some(RuleOutcome::UniversalLockdown)
    }

    fn http(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        (ctx.flow.dst_port == HTTP_PORT && self.toggle(Toggle::BlockHttp))
            .then_some(RuleOutcome::HttpBlock)
    }

    fn device_locked(&self, _ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        (self.toggle(Toggle::BlockWhenLocked) && self.device.is_locked())
            .then_some(RuleOutcome::DeviceLocked)
    }

    fn udp(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        let flow = ctx.flow;
        if !self.toggle(Toggle::BlockUdp) || !flow.is_udp() {
            return None;
        }
        // later rules decide DNS
        if flow.is_dns() {
            return None;
        }
        if flow.dst_port == NTP_PORT && ctx.status.system_app {
            return None;
        }
        Some(RuleOutcome::UdpBlock)
    }

    fn background(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        if !self.toggle(Toggle::BlockBackground) {
            return None;
        }

        if !self.foreground.is_functional() {
            warn!("foreground signal not functional, disabling background blocking");
            self.toggles.set(Toggle::BlockBackground, false);
            return None;
        }

        let uid = ctx.flow.uid;
        let outcome = self.gate.wait(|| self.foreground.is_foreground(uid));
        debug!("background check for app {}: {}", uid, outcome);
        (!outcome.is_satisfied()).then_some(RuleOutcome::BackgroundBlock)
    }

    fn dns_trap(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        self.dns_proxied(ctx.flow.dst_port)
            .then_some(RuleOutcome::DnsTrap)
    }

    fn dns_bypassed(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        (self.toggle(Toggle::DisallowDnsBypass) && ctx.flow.domain().is_none())
            .then_some(RuleOutcome::DnsBypassed)
    }

    fn proxy_route(&self, ctx: &EvalContext<'_>) -> Option<RuleOutcome> {
        self.routes
            .is_proxied(ctx.flow.uid)
            .then_some(RuleOutcome::ProxyRoute)
    }
}

/// Run `f`, turning a panic into an evaluation error
fn guarded<T>(step: &'static str, f: impl FnOnce() -> T) -> Result<T, EvaluationError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| EvaluationError::Panicked {
        step,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for [`RuleEvaluator`].
///
/// Every collaborator defaults to an empty in-memory implementation, the
/// system clock and default gate timing. Classification requests are
/// dropped unless a classifier is set.
pub struct RuleEvaluatorBuilder {
    apps: Arc<dyn AppRules>,
    domains: Arc<dyn DomainRules>,
    ips: Arc<dyn IpRules>,
    toggles: Arc<GlobalToggles>,
    foreground: Arc<dyn ForegroundSignal>,
    network: Arc<dyn NetworkState>,
    device: Arc<dyn DeviceState>,
    classifier: Arc<dyn AppClassifier>,
    proxies: Arc<dyn ProxyRegistry>,
    gate: GateConfig,
    clock: Arc<dyn Clock>,
}

impl RuleEvaluatorBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        let signals = Arc::new(SignalBoard::new());
        Self {
            apps: Arc::new(AppRuleStore::new()),
            domains: Arc::new(DomainRuleStore::new()),
            ips: Arc::new(IpRuleStore::new()),
            toggles: Arc::new(GlobalToggles::default()),
            foreground: Arc::clone(&signals) as Arc<dyn ForegroundSignal>,
            network: Arc::clone(&signals) as Arc<dyn NetworkState>,
            device: signals,
            classifier: Arc::new(DiscardingClassifier),
            proxies: Arc::new(ProxyTable::new()),
            gate: GateConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the app rule store
    #[must_use]
    pub fn apps(mut self, apps: Arc<dyn AppRules>) -> Self {
        self.apps = apps;
        self
    }

    /// Set the domain rule store
    #[must_use]
    pub fn domains(mut self, domains: Arc<dyn DomainRules>) -> Self {
        self.domains = domains;
        self
    }

    /// Set the IP rule store
    #[must_use]
    pub fn ips(mut self, ips: Arc<dyn IpRules>) -> Self {
        self.ips = ips;
        self
    }

    /// Set the global toggles
    #[must_use]
    pub fn toggles(mut self, toggles: Arc<GlobalToggles>) -> Self {
        self.toggles = toggles;
        self
    }

    /// Use one board for the foreground, network and device signals
    #[must_use]
    pub fn signals(mut self, signals: Arc<SignalBoard>) -> Self {
        self.foreground = Arc::clone(&signals) as Arc<dyn ForegroundSignal>;
        self.network = Arc::clone(&signals) as Arc<dyn NetworkState>;
        self.device = signals;
        self
    }

    /// Set the foreground signal
    #[must_use]
    pub fn foreground(mut self, foreground: Arc<dyn ForegroundSignal>) -> Self {
        self.foreground = foreground;
        self
    }

    /// Set the metered-network signal
    #[must_use]
    pub fn network(mut self, network: Arc<dyn NetworkState>) -> Self {
        self.network = network;
        self
    }

    /// Set the device lock signal
    #[must_use]
    pub fn device(mut self, device: Arc<dyn DeviceState>) -> Self {
        self.device = device;
        self
    }

    /// Set the classification trigger
    #[must_use]
    pub fn classifier(mut self, classifier: Arc<dyn AppClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Set the proxy registry
    #[must_use]
    pub fn proxies(mut self, proxies: Arc<dyn ProxyRegistry>) -> Self {
        self.proxies = proxies;
        self
    }

    /// Set gate timing
    #[must_use]
    pub fn gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// Set the clock the gate sleeps on
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the evaluator
    #[must_use]
    pub fn build(self) -> RuleEvaluator {
        RuleEvaluator {
            apps: self.apps,
            domains: self.domains,
            ips: self.ips,
            toggles: self.toggles,
            foreground: self.foreground,
            network: self.network,
            device: self.device,
            classifier: self.classifier,
            routes: RouteSelector::new(self.proxies),
            gate: RetryGate::new(&self.gate, self.clock),
        }
    }
}

impl Default for RuleEvaluatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
