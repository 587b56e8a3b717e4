//! Configuration files driving a façade

use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;

use policy_router::config::{load_config, OperatingMode};
use policy_router::decision::{DecisionFacade, FlowLogger, FlowRequest, TracingFlowLogger};
use policy_router::outbound::RouteTarget;
use policy_router::policy::{GlobalToggles, Toggle};
use policy_router::rules::RuleEvaluator;
use policy_router::ConfigError;

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_seeds_toggles_and_resolver() {
    let file = write_config(
        r#"{
            "mode": "firewall",
            "tunnel": { "protocol": "ipv4", "dns_ipv4": "10.9.0.53" },
            "toggles": { "block_http": true, "dns_cache": false }
        }"#,
    );
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.mode, OperatingMode::Firewall);

    let toggles = Arc::new(GlobalToggles::from_config(&config.toggles, config.mode));
    assert!(toggles.get(Toggle::BlockHttp));
    assert!(!toggles.get(Toggle::DnsCache));

    let facade = DecisionFacade::new(
        RuleEvaluator::builder().toggles(Arc::clone(&toggles)).build(),
        Arc::new(TracingFlowLogger) as Arc<dyn FlowLogger>,
        config.tunnel.clone(),
    );

    // resolver flows are exempt even with port-80 blocking on
    let decision =
        facade.on_new_flow(&FlowRequest::new(17, 10_100, "10.111.222.1:5000", "10.9.0.53:53"));
    assert_eq!(decision.target, RouteTarget::Base);
    assert_eq!(facade.stats().exempt(), 1);

    assert!(facade
        .on_new_flow(&FlowRequest::new(6, 10_100, "10.111.222.1:5000", "1.1.1.1:80"))
        .is_block());

    // firewall-only mode, no cache prefix
    assert_eq!(facade.on_query(Some("example.com"), None), "Preferred");
}

#[test]
fn test_invalid_gate_is_rejected() {
    let file = write_config(r#"{ "gate": { "budget_secs": 1, "base_delay_ms": 5000 } }"#);
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_unspecified_resolver_is_rejected() {
    let file = write_config(r#"{ "tunnel": { "dns_ipv4": "0.0.0.0" } }"#);
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}
