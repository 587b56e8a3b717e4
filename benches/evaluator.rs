//! Performance benchmarks for the decision path.
//!
//! Run with: `cargo bench`
//!
//! Performance targets:
//! - Rule evaluation (no match, all steps): <5us
//! - Full façade decision including route selection: <10us
//! - DNS transport selection: <1us

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use policy_router::config::TunnelConfig;
use policy_router::connection::{FlowMetadata, Protocol};
use policy_router::decision::{DecisionFacade, FlowLogger, FlowRequest};
use policy_router::policy::{
    AppRuleStore, AppRules, AppUid, DomainRuleStatus, DomainRuleStore, DomainRules,
    IpRuleStatus, IpRuleStore, IpRules, RuleScope,
};
use policy_router::rules::RuleEvaluator;

// ============================================================================
// Helper Functions
// ============================================================================

/// Logger that drops everything
struct NullLogger;

impl FlowLogger for NullLogger {
    fn log_flow(&self, _: &FlowMetadata) {}
    fn log_summary(&self, _: &policy_router::connection::FlowSummary) {}
    fn log_dns(&self, _: &policy_router::connection::DnsSummary) {}
}

/// Build an evaluator with `rule_count` domain and IP rules per scope.
fn build_evaluator(rule_count: usize) -> RuleEvaluator {
    let apps = Arc::new(AppRuleStore::new());
    let domains = Arc::new(DomainRuleStore::new());
    let ips = Arc::new(IpRuleStore::new());

    for uid in 0..64 {
        apps.mark_tracked(AppUid::new(10_000 + uid));
    }
    for i in 0..rule_count {
        domains.set(
            &format!("*.domain{i}.com"),
            RuleScope::Everybody,
            DomainRuleStatus::Block,
        );
        domains.set(
            &format!("host{i}.example.com"),
            RuleScope::App(AppUid::new(10_000)),
            DomainRuleStatus::Trust,
        );
        let octet = (i % 256) as u8;
        let second = ((i / 256) % 256) as u8;
        ips.set_subnet(
            RuleScope::Everybody,
            format!("10.{second}.{octet}.0/24").parse().expect("valid CIDR"),
            0,
            IpRuleStatus::Block,
        );
    }

    RuleEvaluator::builder()
        .apps(apps as Arc<dyn AppRules>)
        .domains(domains as Arc<dyn DomainRules>)
        .ips(ips as Arc<dyn IpRules>)
        .build()
}

fn flow(domain: &str) -> FlowMetadata {
    FlowMetadata::new(
        AppUid::new(10_001),
        Protocol::Tcp,
        "10.111.222.1".parse().ok(),
        40_000,
        "93.184.216.34".parse().ok(),
        443,
    )
    .with_query(domain)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    for rule_count in [10, 1_000, 10_000] {
        let evaluator = build_evaluator(rule_count);
        let miss = flow("unmatched.example.org");
        let hit = flow("www.domain5.com");

        group.bench_with_input(BenchmarkId::new("no_rule", rule_count), &miss, |b, f| {
            b.iter(|| evaluator.evaluate(black_box(f), false));
        });
        group.bench_with_input(BenchmarkId::new("global_block", rule_count), &hit, |b, f| {
            b.iter(|| evaluator.evaluate(black_box(f), false));
        });
    }

    group.finish();
}

fn bench_facade(c: &mut Criterion) {
    let facade = DecisionFacade::new(
        build_evaluator(1_000),
        Arc::new(NullLogger) as Arc<dyn FlowLogger>,
        TunnelConfig::default(),
    );
    let request = FlowRequest::new(6, 10_001, "10.111.222.1:40000", "10.111.222.40:443")
        .with_domains("cdn.example.org")
        .with_real_ips("93.184.216.34,93.184.216.35");

    c.bench_function("facade_on_new_flow", |b| {
        b.iter(|| {
            let decision = facade.on_new_flow(black_box(&request));
            facade.ledger().close(decision.flow_id.as_str());
            decision
        });
    });

    c.bench_function("facade_on_query", |b| {
        b.iter(|| facade.on_query(black_box(Some("www.domain5.com")), None));
    });
}

criterion_group!(benches, bench_evaluate, bench_facade);
criterion_main!(benches);
