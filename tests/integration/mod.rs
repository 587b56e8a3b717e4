//! Integration tests for policy-router
//!
//! These tests drive the decision façade end to end over the in-memory
//! policy stores, the way the forwarding engine would.
//!
//! # Test Organization
//!
//! - `scenarios`: end-to-end flows and queries from a clean state
//! - `precedence`: ordering between rule families
//! - `failures`: fail-closed and fail-open behaviour
//! - `concurrency`: parallel callbacks and the flow ledger
//! - `config`: loading configuration from files
//!
//! # Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test --test integration_tests
//!
//! # Run specific test module
//! cargo test --test integration_tests scenarios
//! ```
//!
//! Gate waits run on a manual clock, so timeouts cost no wall time.

pub mod concurrency;
pub mod config;
pub mod failures;
pub mod precedence;
pub mod scenarios;

use std::sync::Arc;

use parking_lot::Mutex;

use policy_router::config::{GateConfig, TunnelConfig};
use policy_router::connection::{DnsSummary, FlowMetadata, FlowSummary};
use policy_router::decision::{DecisionFacade, FlowLogger, FlowRequest, RouteDecision};
use policy_router::outbound::{ProxyRegistry, ProxyTable};
use policy_router::policy::{
    AppClassifier, AppRuleStore, AppRules, AppUid, DomainRuleStore, DomainRules, GlobalToggles,
    IpRuleStore, IpRules, PendingClassifications, SignalBoard,
};
use policy_router::rules::{Clock, ManualClock, RuleEvaluator, RuleEvaluatorBuilder, RuleOutcome};

/// Logger that keeps every record
#[derive(Default)]
pub struct RecordingLogger {
    pub flows: Mutex<Vec<FlowMetadata>>,
    pub summaries: Mutex<Vec<FlowSummary>>,
    pub dns: Mutex<Vec<DnsSummary>>,
}

impl RecordingLogger {
    /// Rule recorded for the most recent flow
    pub fn last_rule(&self) -> Option<RuleOutcome> {
        self.flows.lock().last().and_then(|f| f.rule)
    }
}

impl FlowLogger for RecordingLogger {
    fn log_flow(&self, flow: &FlowMetadata) {
        self.flows.lock().push(flow.clone());
    }

    fn log_summary(&self, summary: &FlowSummary) {
        self.summaries.lock().push(summary.clone());
    }

    fn log_dns(&self, summary: &DnsSummary) {
        self.dns.lock().push(summary.clone());
    }
}

/// A façade wired to in-memory stores, a manual clock and a recording logger
pub struct Harness {
    pub apps: Arc<AppRuleStore>,
    pub domains: Arc<DomainRuleStore>,
    pub ips: Arc<IpRuleStore>,
    pub toggles: Arc<GlobalToggles>,
    pub signals: Arc<SignalBoard>,
    pub proxies: Arc<ProxyTable>,
    pub pending: Arc<PendingClassifications>,
    pub clock: Arc<ManualClock>,
    pub logger: Arc<RecordingLogger>,
    pub facade: DecisionFacade,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    /// Build with a hook to override parts of the evaluator
    pub fn with(customize: impl FnOnce(RuleEvaluatorBuilder) -> RuleEvaluatorBuilder) -> Self {
        let apps = Arc::new(AppRuleStore::new());
        let domains = Arc::new(DomainRuleStore::new());
        let ips = Arc::new(IpRuleStore::new());
        let toggles = Arc::new(GlobalToggles::default());
        let signals = Arc::new(SignalBoard::new());
        let proxies = Arc::new(ProxyTable::new());
        let pending = Arc::new(PendingClassifications::new());
        let clock = Arc::new(ManualClock::new());
        let logger = Arc::new(RecordingLogger::default());

        let builder = RuleEvaluator::builder()
            .apps(Arc::clone(&apps) as Arc<dyn AppRules>)
            .domains(Arc::clone(&domains) as Arc<dyn DomainRules>)
            .ips(Arc::clone(&ips) as Arc<dyn IpRules>)
            .toggles(Arc::clone(&toggles))
            .signals(Arc::clone(&signals))
            .proxies(Arc::clone(&proxies) as Arc<dyn ProxyRegistry>)
            .classifier(Arc::clone(&pending) as Arc<dyn AppClassifier>)
            .gate(GateConfig::default())
            .clock(Arc::clone(&clock) as Arc<dyn Clock>);

        let facade = DecisionFacade::new(
            customize(builder).build(),
            Arc::clone(&logger) as Arc<dyn FlowLogger>,
            TunnelConfig::default(),
        );

        Self {
            apps,
            domains,
            ips,
            toggles,
            signals,
            proxies,
            pending,
            clock,
            logger,
            facade,
        }
    }

    /// Mark an app as classified
    pub fn track(&self, uid: i32) -> AppUid {
        let uid = AppUid::new(uid);
        self.apps.mark_tracked(uid);
        uid
    }

    /// Plain TCP flow to a public address
    pub fn tcp(&self, uid: i64, port: u16) -> RouteDecision {
        self.facade.on_new_flow(&FlowRequest::new(
            6,
            uid,
            "10.111.222.1:40000",
            format!("93.184.216.34:{port}"),
        ))
    }

    /// TCP flow to a domain the tunnel resolved
    pub fn resolved(&self, uid: i64, domain: &str, real_ips: &str) -> RouteDecision {
        self.facade.on_new_flow(
            &FlowRequest::new(6, uid, "10.111.222.1:40000", "10.111.222.40:443")
                .with_domains(domain)
                .with_real_ips(real_ips),
        )
    }
}
