//! Fail-closed and fail-open behaviour

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use policy_router::error::LookupError;
use policy_router::outbound::RouteTarget;
use policy_router::policy::{
    AppFirewallStatus, AppRules, AppUid, DomainRuleStatus, DomainRules, IpRuleStatus, IpRules,
    RuleScope, Toggle,
};
use policy_router::rules::RuleOutcome;

use super::Harness;

struct BrokenApps;

impl AppRules for BrokenApps {
    fn app_status(&self, _uid: AppUid) -> Result<AppFirewallStatus, LookupError> {
        Err(LookupError::Unavailable { store: "app" })
    }

    fn any_app_bypasses_dns(&self) -> bool {
        false
    }
}

struct BrokenDomains;

impl DomainRules for BrokenDomains {
    fn domain_status(&self, _: &str, _: RuleScope) -> Result<DomainRuleStatus, LookupError> {
        Err(LookupError::failed("domain", "trie corrupt"))
    }

    fn is_trusted_anywhere(&self, _: &str) -> Result<bool, LookupError> {
        Err(LookupError::failed("domain", "trie corrupt"))
    }
}

struct PanickingIps;

impl IpRules for PanickingIps {
    fn ip_status(&self, _: RuleScope, _: IpAddr, _: u16) -> Result<IpRuleStatus, LookupError> {
        panic!("ip index poisoned");
    }
}

#[test]
fn test_app_store_failure_blocks() {
    let h = Harness::with(|b| b.apps(Arc::new(BrokenApps)));

    let decision = h.tcp(42, 443);
    assert_eq!(decision.target, RouteTarget::Block);
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::EvaluationFailure));
    assert!(!h.facade.is_flow_tracked(decision.flow_id.as_str()));
    assert_eq!(h.facade.stats().failed(), 1);
}

#[test]
fn test_panicking_step_blocks_and_engine_survives() {
    let h = Harness::with(|b| b.ips(Arc::new(PanickingIps)));
    h.track(42);

    for _ in 0..3 {
        assert!(h.tcp(42, 443).is_block());
        assert_eq!(h.logger.last_rule(), Some(RuleOutcome::EvaluationFailure));
    }
    assert_eq!(h.facade.stats().failed(), 3);
}

#[test]
fn test_domain_store_failure_degrades_to_no_rule() {
    let h = Harness::with(|b| b.domains(Arc::new(BrokenDomains)));
    h.track(42);

    let decision = h.resolved(42, "example.com", "93.184.216.34");
    assert!(!decision.is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::NoRule));
}

#[test]
fn test_dns_selector_degrades_on_domain_failure() {
    let h = Harness::with(|b| b.domains(Arc::new(BrokenDomains)));
    assert_eq!(h.facade.on_query(Some("example.com"), None), "CT+Preferred");
}

#[test]
fn test_background_block_fails_open_without_signal() {
    let h = Harness::new();
    h.track(42);
    h.toggles.set(Toggle::BlockBackground, true);
    h.signals.set_functional(false);

    assert!(!h.tcp(42, 443).is_block());
    assert!(!h.toggles.get(Toggle::BlockBackground));
    assert_eq!(h.clock.elapsed(), Duration::ZERO);
}

#[test]
fn test_background_app_waits_then_blocks() {
    let h = Harness::new();
    let uid = h.track(42);
    h.toggles.set(Toggle::BlockBackground, true);

    assert!(h.tcp(42, 443).is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::BackgroundBlock));
    assert_eq!(h.clock.elapsed(), Duration::from_secs(30));

    h.signals.set_foreground(uid, true);
    assert!(!h.tcp(42, 443).is_block());
    assert_eq!(h.clock.elapsed(), Duration::from_secs(30));
}

#[test]
fn test_malformed_metadata_is_still_decided() {
    let h = Harness::new();
    h.track(42);

    let decision = h.facade.on_new_flow(&policy_router::decision::FlowRequest::new(
        250, 42, "not-an-address", "::::",
    ));
    assert!(!decision.is_block());
    let flow = h.logger.flows.lock().last().cloned().unwrap();
    assert_eq!(flow.dst_port, 0);
    assert!(flow.dst_ip.is_none());
}
