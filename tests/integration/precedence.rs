//! Ordering between rule families

use policy_router::decision::FlowRequest;
use policy_router::outbound::ProxyKind;
use policy_router::policy::{AppUid, DomainRuleStatus, IpRuleStatus, RuleScope, Toggle};
use policy_router::rules::RuleOutcome;

use super::Harness;

fn public_ip() -> std::net::IpAddr {
    "93.184.216.34".parse().unwrap()
}

#[test]
fn test_app_block_beats_domain_trust() {
    let h = Harness::new();
    let uid = h.track(42);
    h.apps.update(uid, |s| s.blocked = true);
    h.domains
        .set("example.com", RuleScope::App(uid), DomainRuleStatus::Trust);

    h.resolved(42, "example.com", "93.184.216.34");
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::AppBlock));
}

#[test]
fn test_app_domain_trust_beats_app_ip_block() {
    let h = Harness::new();
    let uid = h.track(42);
    h.domains
        .set("example.com", RuleScope::App(uid), DomainRuleStatus::Trust);
    h.ips
        .set(RuleScope::App(uid), public_ip(), 0, IpRuleStatus::Block);

    let decision = h.resolved(42, "example.com", "93.184.216.34");
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::DomainTrust));
    assert!(!decision.is_block());
}

#[test]
fn test_app_trust_beats_universal_lockdown() {
    let h = Harness::new();
    let uid = h.track(42);
    h.toggles.set(Toggle::UniversalLockdown, true);
    h.ips
        .set(RuleScope::App(uid), public_ip(), 443, IpRuleStatus::Trust);

    assert!(!h.tcp(42, 443).is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::IpTrust));

    assert!(h.tcp(42, 8443).is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::UniversalLockdown));
}

#[test]
fn test_wifi_rule_skipped_with_multiple_networks() {
    let h = Harness::new();
    let uid = h.track(42);
    h.apps.update(uid, |s| s.block_wifi = true);

    assert!(h.tcp(42, 443).is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::WifiBlock));

    h.toggles.set(Toggle::UseMultipleNetworks, true);
    assert!(!h.tcp(42, 443).is_block());
}

#[test]
fn test_bypass_universal_skips_global_block() {
    let h = Harness::new();
    let uid = h.track(42);
    h.apps.update(uid, |s| s.bypass_universal = true);
    h.domains
        .set("example.com", RuleScope::Everybody, DomainRuleStatus::Block);
    h.toggles.set(Toggle::UniversalLockdown, true);

    let decision = h.resolved(42, "example.com", "93.184.216.34");
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::UniversalBypassAllow));
    assert!(!decision.is_block());
}

#[test]
fn test_bypass_universal_respects_dns_time_block() {
    let h = Harness::new();
    let uid = h.track(42);
    h.apps.update(uid, |s| s.bypass_universal = true);

    h.resolved(42, "ads.example.com", "0.0.0.0");
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::UniversalBypassBlock));

    // a globally trusted domain is let through even if the resolver blocked it
    h.domains
        .set("ads.example.com", RuleScope::Everybody, DomainRuleStatus::Trust);
    h.resolved(42, "ads.example.com", "0.0.0.0");
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::UniversalBypassAllow));
}

#[test]
fn test_global_domain_trust_beats_real_ip_block() {
    let h = Harness::new();
    h.track(42);
    h.domains
        .set("example.com", RuleScope::Everybody, DomainRuleStatus::Trust);

    let decision = h.resolved(42, "example.com", "0.0.0.0");
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::GlobalDomainTrust));
    assert!(!decision.is_block());

    h.resolved(42, "other.example.com", "1.2.3.4,::");
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::AnyRealIpBlocked));
}

#[test]
fn test_global_ip_trust_falls_through() {
    let h = Harness::new();
    h.track(42);
    h.toggles.set(Toggle::BlockHttp, true);
    h.ips
        .set(RuleScope::Everybody, public_ip(), 80, IpRuleStatus::Trust);

    assert!(h.tcp(42, 80).is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::HttpBlock));
}

#[test]
fn test_udp_block_exemptions() {
    let h = Harness::new();
    let uid = h.track(1_000);
    h.apps.update(uid, |s| s.system_app = true);
    h.toggles.set(Toggle::BlockUdp, true);

    let udp = |port: u16| {
        h.facade.on_new_flow(&FlowRequest::new(
            17,
            1_000,
            "10.111.222.1:5000",
            format!("93.184.216.34:{port}"),
        ))
    };

    assert!(udp(443).is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::UdpBlock));

    // system NTP passes
    assert!(!udp(123).is_block());

    // port 53 is left to the DNS rules, which trap it
    assert!(!udp(53).is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::DnsTrap));
}

#[test]
fn test_dns_bypass_blocked_without_domain() {
    let h = Harness::new();
    h.track(42);
    h.toggles.set(Toggle::DisallowDnsBypass, true);

    assert!(h.tcp(42, 443).is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::DnsBypassed));

    assert!(!h.resolved(42, "example.com", "93.184.216.34").is_block());
}

#[test]
fn test_unknown_owner() {
    let h = Harness::new();
    assert!(!h.tcp(-1, 443).is_block());

    h.toggles.set(Toggle::BlockUnknownApps, true);
    let decision = h.tcp(-1, 443);
    assert!(decision.is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::UnknownAppBlock));
    assert!(decision.to_string().ends_with(",-1"));

    // only the allowed flow reached classification; neither waited
    assert_eq!(h.pending.drain(), vec![AppUid::MISSING]);
    assert_eq!(h.clock.elapsed(), std::time::Duration::ZERO);
}

#[test]
fn test_proxy_helper_passes_while_orbot_bootstraps() {
    let h = Harness::new();
    let uid = h.track(50);
    h.apps.update(uid, |s| s.proxy_helper = true);
    h.toggles.set(Toggle::UniversalLockdown, true);
    h.proxies.set_enabled(ProxyKind::Orbot, true);
    h.proxies.set_orbot_setting_up(true);

    assert!(!h.tcp(50, 9050).is_block());
    assert_eq!(h.logger.last_rule(), Some(RuleOutcome::ProxyBootstrapAllow));

    h.proxies.set_orbot_setting_up(false);
    assert!(h.tcp(50, 9050).is_block());
}
