//! Parallel callbacks

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use policy_router::config::GateConfig;
use policy_router::connection::FlowSummary;
use policy_router::decision::{DecisionFacade, FlowLogger, FlowRequest, TracingFlowLogger};
use policy_router::error::LookupError;
use policy_router::policy::{
    AppClassifier, AppRefresher, AppRuleStore, AppRules, AppUid, DomainRuleStatus, RuleScope,
    SpawningClassifier, Toggle,
};
use policy_router::rules::{RuleEvaluator, RuleOutcome};

use super::Harness;

const THREADS: usize = 8;
const FLOWS_PER_THREAD: usize = 200;

#[test]
fn test_parallel_flows_get_unique_ids() {
    let h = Harness::new();
    for uid in 0..THREADS {
        h.track(uid as i32);
    }

    let ids: Vec<String> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let h = &h;
                s.spawn(move || {
                    (0..FLOWS_PER_THREAD)
                        .map(|_| h.tcp(t as i64, 443).flow_id.as_str().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), THREADS * FLOWS_PER_THREAD);
    assert_eq!(h.facade.ledger().len(), THREADS * FLOWS_PER_THREAD);
    assert_eq!(h.facade.stats().evaluated(), (THREADS * FLOWS_PER_THREAD) as u64);
}

#[test]
fn test_parallel_open_and_close() {
    let h = Harness::new();
    h.track(42);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..FLOWS_PER_THREAD {
                    let decision = h.tcp(42, 443);
                    assert!(h.facade.is_flow_tracked(decision.flow_id.as_str()));
                    h.facade
                        .on_flow_closed(&FlowSummary::new(decision.flow_id).with_bytes(10, 1));
                }
            });
        }
    });

    assert!(h.facade.ledger().is_empty());
    let stats = h.facade.stats().snapshot();
    assert_eq!(stats.closed, (THREADS * FLOWS_PER_THREAD) as u64);
    assert_eq!(stats.total_bytes(), (THREADS * FLOWS_PER_THREAD * 11) as u64);
}

#[test]
fn test_rule_changes_during_evaluation() {
    let h = Harness::new();
    let uid = h.track(42);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..FLOWS_PER_THREAD {
                let status = if i % 2 == 0 {
                    DomainRuleStatus::Block
                } else {
                    DomainRuleStatus::None
                };
                h.domains.set("example.com", RuleScope::App(uid), status);
                h.toggles.set(Toggle::BlockHttp, i % 3 == 0);
            }
        });
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..FLOWS_PER_THREAD {
                    h.resolved(42, "example.com", "93.184.216.34");
                }
            });
        }
    });

    // every flow got exactly one of the outcomes the rules allow
    let flows = h.logger.flows.lock();
    assert_eq!(flows.len(), THREADS * FLOWS_PER_THREAD);
    assert!(flows
        .iter()
        .all(|f| matches!(f.rule, Some(RuleOutcome::DomainBlock | RuleOutcome::NoRule))));
}

struct SlowRefresher {
    apps: Arc<AppRuleStore>,
}

#[async_trait::async_trait]
impl AppRefresher for SlowRefresher {
    async fn refresh(&self, uid: AppUid) -> Result<(), LookupError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.apps.mark_tracked(uid);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_newly_installed_app_admitted_after_classification() {
    let apps = Arc::new(AppRuleStore::new());
    let classifier = SpawningClassifier::new(
        Arc::new(SlowRefresher {
            apps: Arc::clone(&apps),
        }),
        tokio::runtime::Handle::current(),
    );
    let evaluator = RuleEvaluator::builder()
        .apps(Arc::clone(&apps) as Arc<dyn AppRules>)
        .classifier(Arc::new(classifier) as Arc<dyn AppClassifier>)
        .gate(GateConfig {
            stall_secs: 1,
            budget_secs: 2,
            base_delay_ms: 10,
        })
        .build();
    evaluator.toggles().set(Toggle::BlockNewlyInstalled, true);

    let facade = Arc::new(DecisionFacade::new(
        evaluator,
        Arc::new(TracingFlowLogger) as Arc<dyn FlowLogger>,
        Default::default(),
    ));

    let decision = tokio::task::spawn_blocking({
        let facade = Arc::clone(&facade);
        move || facade.on_new_flow(&FlowRequest::new(6, 10_500, "10.111.222.1:40000", "1.1.1.1:443"))
    })
    .await
    .unwrap();

    assert!(!decision.is_block());
    assert!(!apps.app_status(AppUid::new(10_500)).unwrap().untracked);
}
