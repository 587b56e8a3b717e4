//! End-to-end decision scenarios

use std::time::Duration;

use policy_router::outbound::{ProxyKind, RouteTarget};
use policy_router::policy::{AppUid, DomainRuleStatus, RuleScope, Toggle};
use policy_router::rules::RuleOutcome;

use super::Harness;

#[test]
fn test_clean_state_allows_directly() {
    let h = Harness::new();
    h.track(42);

    let decision = h.tcp(42, 443);
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::NoRule));
    assert_eq!(decision.target, RouteTarget::Base);
    assert_eq!(decision.uid, AppUid::new(42));
    assert!(decision.to_string().starts_with("Base,"));
    assert!(decision.to_string().ends_with(",42"));
    assert!(h.facade.is_flow_tracked(decision.flow_id.as_str()));
}

#[test]
fn test_global_domain_block_at_query_and_flow() {
    let h = Harness::new();
    h.track(42);
    h.domains
        .set("ads.example.com", RuleScope::Everybody, DomainRuleStatus::Block);

    assert_eq!(h.facade.on_query(Some("ads.example.com"), None), "BlockAll");

    let decision = h.resolved(42, "ads.example.com", "0.0.0.0");
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::GlobalDomainBlock));
    assert_eq!(decision.target, RouteTarget::Block);
    assert!(!h.facade.is_flow_tracked(decision.flow_id.as_str()));
}

#[test]
fn test_app_domain_block_overrides_global() {
    let h = Harness::new();
    let uid = h.track(42);
    h.domains
        .set("ads.example.com", RuleScope::Everybody, DomainRuleStatus::Block);
    h.domains
        .set("ads.example.com", RuleScope::App(uid), DomainRuleStatus::Block);

    h.resolved(42, "ads.example.com", "0.0.0.0");
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::DomainBlock));
}

#[test]
fn test_isolated_app_is_blocked_regardless_of_global_rules() {
    let h = Harness::new();
    let uid = h.track(7);
    h.apps.update(uid, |s| s.isolate = true);
    h.domains
        .set("example.com", RuleScope::Everybody, DomainRuleStatus::Trust);

    let decision = h.resolved(7, "example.com", "93.184.216.34");
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::IsolateMode));
    assert!(decision.is_block());
}

#[test]
fn test_newly_installed_app_times_out() {
    let h = Harness::new();
    h.toggles.set(Toggle::BlockNewlyInstalled, true);

    let decision = h.tcp(10_999, 443);
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::NewlyInstalledBlock));
    assert!(decision.is_block());

    // budget plus stall, spent on the manual clock
    assert_eq!(h.clock.elapsed(), Duration::from_secs(30));
    assert_eq!(h.pending.drain(), vec![AppUid::new(10_999)]);
}

#[test]
fn test_newly_installed_app_without_toggle_is_classified_but_allowed() {
    let h = Harness::new();

    let decision = h.tcp(10_998, 443);
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::NoRule));
    assert!(!decision.is_block());
    assert_eq!(h.clock.elapsed(), Duration::ZERO);
    assert_eq!(h.pending.drain(), vec![AppUid::new(10_998)]);
}

#[test]
fn test_wireguard_route_for_mapped_app() {
    let h = Harness::new();
    let uid = h.track(9);
    h.proxies.set_enabled(ProxyKind::WireGuard, true);
    h.proxies.assign_wireguard(uid, Some(3));
    h.proxies.set_active(RouteTarget::WireGuard(3), true);

    let decision = h.tcp(9, 443);
    assert_eq!(decision.target, RouteTarget::WireGuard(3));
    assert!(decision.to_string().starts_with("wg3,"));

    // inactive config falls back to the base network
    h.proxies.set_active(RouteTarget::WireGuard(3), false);
    assert_eq!(h.tcp(9, 443).target, RouteTarget::Base);
}

#[test]
fn test_wireguard_routed_flow_is_logged_as_proxy_route() {
    let h = Harness::new();
    let uid = h.track(9);
    h.proxies.set_enabled(ProxyKind::WireGuard, true);
    h.proxies.assign_wireguard(uid, Some(3));
    h.proxies.set_active(RouteTarget::WireGuard(3), true);

    let decision = h.tcp(9, 443);
    assert_eq!(decision.target, RouteTarget::WireGuard(3));
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::ProxyRoute));

    // unmapped apps on the same tunnel take the base network, unproxied
    h.track(10);
    assert_eq!(h.tcp(10, 443).target, RouteTarget::Base);
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::NoRule));
}

#[test]
fn test_socks5_route_marks_flow_proxied() {
    let h = Harness::new();
    h.track(11);
    h.proxies.set_enabled(ProxyKind::Socks5, true);

    let decision = h.tcp(11, 443);
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::ProxyRoute));
    assert_eq!(decision.target, RouteTarget::Socks5);
}

#[test]
fn test_close_report_roundtrip() {
    let h = Harness::new();
    h.track(42);
    let decision = h.tcp(42, 443);

    h.facade.on_flow_closed(
        &policy_router::connection::FlowSummary::new(decision.flow_id.clone())
            .with_bytes(1_500, 300)
            .with_reason("fin"),
    );
    assert!(!h.facade.is_flow_tracked(decision.flow_id.as_str()));

    let stats = h.facade.stats().snapshot();
    assert_eq!(stats.closed, 1);
    assert_eq!(stats.total_bytes(), 1_800);
    assert_eq!(h.logger.summaries.lock()[0].reason, "fin");
}

#[test]
fn test_decision_wire_format_parses_back() {
    let h = Harness::new();
    h.track(42);
    let decision = h.tcp(42, 443);

    let parsed: policy_router::decision::RouteDecision = decision.to_string().parse().unwrap();
    assert_eq!(parsed, decision);
}
