//! policy-router: decision engine console
//!
//! Loads a configuration, builds a decision façade over in-memory policy
//! stores, and answers commands read from stdin, one per line. Flow
//! decisions are printed in the engine wire format.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! ./policy-router
//!
//! # Run with custom configuration
//! ./policy-router -c /path/to/config.json
//!
//! # Run with environment overrides
//! POLICY_ROUTER_LOG_LEVEL=debug ./policy-router
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use policy_router::config::{load_config_with_env, Config, OperatingMode};
use policy_router::connection::{FlowId, FlowSummary};
use policy_router::decision::{DecisionFacade, FlowLogger, FlowRequest, TracingFlowLogger};
use policy_router::error::LookupError;
use policy_router::outbound::{ProxyKind, ProxyRegistry, ProxyTable, RouteTarget};
use policy_router::policy::{
    AppClassifier, AppFirewallStatus, AppRefresher, AppRuleStore, AppRules, AppUid, DomainRuleStatus,
    DomainRuleStore, DomainRules, GlobalToggles, IpRuleStatus, IpRuleStore, IpRules, RuleScope,
    SignalBoard, SpawningClassifier, Toggle,
};
use policy_router::rules::RuleEvaluator;

/// Command-line arguments
struct Args {
    /// Configuration file path
    config_path: PathBuf,
    /// Generate default configuration
    generate_config: bool,
    /// Check configuration only
    check_config: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config_path = PathBuf::from("/etc/policy-router/config.json");
        let mut generate_config = false;
        let mut check_config = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    if let Some(path) = args.next() {
                        config_path = PathBuf::from(path);
                    }
                }
                "-g" | "--generate-config" => {
                    generate_config = true;
                }
                "--check" => {
                    check_config = true;
                }
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    println!("policy-router v{}", policy_router::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        Self {
            config_path,
            generate_config,
            check_config,
        }
    }
}

fn print_help() {
    println!(
        r#"policy-router v{}

Per-flow firewall and route decision engine.

USAGE:
    policy-router [OPTIONS]

OPTIONS:
    -c, --config <PATH>     Configuration file path [default: /etc/policy-router/config.json]
    -g, --generate-config   Generate default configuration and exit
    --check                 Check configuration and exit
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT:
    POLICY_ROUTER_MODE               Override operating mode (dns, firewall, dns_firewall)
    POLICY_ROUTER_LOG_LEVEL          Override log level (trace, debug, info, warn, error)
    POLICY_ROUTER_GATE_BUDGET_SECS   Override retry gate budget
    POLICY_ROUTER_GATE_STALL_SECS    Override retry gate stall

COMMANDS (stdin):
    flow <proto> <uid> <src> <dst> [domains] [real-ips] [blocklists]
    query <name> [suggested]
    close <flow-id> [bytes-in] [bytes-out]
    app <uid> <flag> <on|off>       flags: blocked wifi mobile isolate bypass-dns
                                           bypass-universal excluded system proxy-helper tracked
    domain <pattern> <scope> <none|block|trust>
    ip <scope> <addr|cidr> <port> <none|block|trust|bypass>
    toggle <name> <on|off>          toggle mode <dns|firewall|dns_firewall>
    signal <foreground <uid>|background <uid>|locked|unlocked|metered|unmetered|broken|functional>
    proxy <kind> <on|off>           proxy wg <uid> <config-id|none>
    proxy active <target> <on|off>  proxy map <uid> <target|none>
    stats
    quit

EXAMPLE:
    echo 'flow 6 10042 10.111.222.1:40000 1.1.1.1:443' | policy-router -c config.json
"#,
        policy_router::VERSION
    );
}

/// Initialize logging
fn init_logging(config: &Config) -> Result<()> {
    let level = match config.log.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("tokio=warn".parse()?);

    // Responses go to stdout; logs stay on stderr
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.log.target)
        .with_writer(std::io::stderr);

    if config.log.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    Ok(())
}

/// Classifies apps by marking them tracked in the app store
struct StoreRefresher {
    apps: Arc<AppRuleStore>,
}

#[async_trait]
impl AppRefresher for StoreRefresher {
    async fn refresh(&self, uid: AppUid) -> Result<(), LookupError> {
        self.apps.mark_tracked(uid);
        Ok(())
    }
}

/// Policy stores and the façade built over them
struct Console {
    facade: Arc<DecisionFacade>,
    apps: Arc<AppRuleStore>,
    domains: Arc<DomainRuleStore>,
    ips: Arc<IpRuleStore>,
    proxies: Arc<ProxyTable>,
    signals: Arc<SignalBoard>,
    toggles: Arc<GlobalToggles>,
}

impl Console {
    fn new(config: &Config, handle: Handle) -> Self {
        let apps = Arc::new(AppRuleStore::new());
        let domains = Arc::new(DomainRuleStore::new());
        let ips = Arc::new(IpRuleStore::new());
        let proxies = Arc::new(ProxyTable::new());
        let signals = Arc::new(SignalBoard::new());
        let toggles = Arc::new(GlobalToggles::from_config(&config.toggles, config.mode));
        let classifier = SpawningClassifier::new(
            Arc::new(StoreRefresher {
                apps: Arc::clone(&apps),
            }),
            handle,
        );

        let evaluator = RuleEvaluator::builder()
            .apps(Arc::clone(&apps) as Arc<dyn AppRules>)
            .domains(Arc::clone(&domains) as Arc<dyn DomainRules>)
            .ips(Arc::clone(&ips) as Arc<dyn IpRules>)
            .proxies(Arc::clone(&proxies) as Arc<dyn ProxyRegistry>)
            .signals(Arc::clone(&signals))
            .toggles(Arc::clone(&toggles))
            .classifier(Arc::new(classifier) as Arc<dyn AppClassifier>)
            .gate(config.gate.clone())
            .build();

        let facade = DecisionFacade::new(
            evaluator,
            Arc::new(TracingFlowLogger) as Arc<dyn FlowLogger>,
            config.tunnel.clone(),
        );

        Self {
            facade: Arc::new(facade),
            apps,
            domains,
            ips,
            proxies,
            signals,
            toggles,
        }
    }

    /// Run one command line; returns the text to print, if any
    async fn execute(&self, line: &str) -> Result<Option<String>> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            return Ok(None);
        };

        match command {
            "flow" => self.flow(args).await.map(Some),
            "query" => {
                let name = args.first().copied();
                let suggested = args.get(1).copied();
                Ok(Some(self.facade.on_query(name, suggested)))
            }
            "close" => {
                let id = arg(args, 0, "flow id")?;
                let bytes_in = args.get(1).map_or(Ok(0), |b| b.parse())?;
                let bytes_out = args.get(2).map_or(Ok(0), |b| b.parse())?;
                let summary = FlowSummary::new(FlowId::from(id)).with_bytes(bytes_in, bytes_out);
                self.facade.on_flow_closed(&summary);
                Ok(None)
            }
            "app" => self.app(args).map(|()| None),
            "domain" => {
                let pattern = arg(args, 0, "pattern")?;
                let scope: RuleScope = arg(args, 1, "scope")?.parse()?;
                let status = DomainRuleStatus::parse(arg(args, 2, "status")?)
                    .ok_or_else(|| anyhow!("unknown domain status"))?;
                self.domains.set(pattern, scope, status);
                Ok(None)
            }
            "ip" => self.ip(args).map(|()| None),
            "toggle" => self.toggle(args).map(|()| None),
            "signal" => self.signal(args).map(|()| None),
            "proxy" => self.proxy(args).map(|()| None),
            "stats" => Ok(Some(serde_json::to_string(&self.facade.stats().snapshot())?)),
            _ => bail!("unknown command: {command}"),
        }
    }

    async fn flow(&self, args: &[&str]) -> Result<String> {
        let protocol = arg(args, 0, "protocol")?.parse()?;
        let uid = arg(args, 1, "uid")?.parse()?;
        let mut request = FlowRequest::new(protocol, uid, arg(args, 2, "src")?, arg(args, 3, "dst")?);
        if let Some(domains) = args.get(4) {
            request = request.with_domains(*domains);
        }
        if let Some(real_ips) = args.get(5) {
            request = request.with_real_ips(*real_ips);
        }
        if let Some(blocklists) = args.get(6) {
            request = request.with_blocklists(*blocklists);
        }

        // The retry gate blocks the calling thread
        let facade = Arc::clone(&self.facade);
        let decision = tokio::task::spawn_blocking(move || facade.on_new_flow(&request)).await?;
        Ok(decision.to_string())
    }

    fn app(&self, args: &[&str]) -> Result<()> {
        let uid = AppUid::new(arg(args, 0, "uid")?.parse()?);
        let flag = arg(args, 1, "flag")?;
        let on = on_off(arg(args, 2, "on|off")?)?;

        let set: fn(&mut AppFirewallStatus, bool) = match flag {
            "tracked" => |s, on| s.untracked = !on,
            "blocked" => |s, on| s.blocked = on,
            "wifi" => |s, on| s.block_wifi = on,
            "mobile" => |s, on| s.block_mobile = on,
            "isolate" => |s, on| s.isolate = on,
            "bypass-dns" => |s, on| s.bypass_dns_firewall = on,
            "bypass-universal" => |s, on| s.bypass_universal = on,
            "excluded" => |s, on| s.excluded = on,
            "system" => |s, on| s.system_app = on,
            "proxy-helper" => |s, on| s.proxy_helper = on,
            _ => bail!("unknown app flag: {flag}"),
        };
        self.apps.update(uid, |status| set(status, on));

        if flag == "excluded" {
            if let Err(e) = self.facade.set_excluded_apps(self.apps.excluded_uids()) {
                warn!("failed to push excluded apps: {}", e);
            }
        }
        Ok(())
    }

    fn ip(&self, args: &[&str]) -> Result<()> {
        let scope: RuleScope = arg(args, 0, "scope")?.parse()?;
        let target = arg(args, 1, "address")?;
        let port = arg(args, 2, "port")?.parse()?;
        let status = IpRuleStatus::parse(arg(args, 3, "status")?)
            .ok_or_else(|| anyhow!("unknown ip status"))?;

        if target.contains('/') {
            self.ips.set_subnet(scope, target.parse()?, port, status);
        } else {
            self.ips.set(scope, target.parse()?, port, status);
        }
        Ok(())
    }

    fn toggle(&self, args: &[&str]) -> Result<()> {
        let name = arg(args, 0, "toggle")?;
        let value = arg(args, 1, "value")?;
        if name == "mode" {
            self.toggles.set_mode(OperatingMode::parse(value)?);
            return Ok(());
        }
        let toggle = Toggle::parse(name).ok_or_else(|| anyhow!("unknown toggle: {name}"))?;
        self.toggles.set(toggle, on_off(value)?);
        Ok(())
    }

    fn signal(&self, args: &[&str]) -> Result<()> {
        match arg(args, 0, "signal")? {
            "foreground" => self.signals.set_foreground(AppUid::new(arg(args, 1, "uid")?.parse()?), true),
            "background" => self.signals.set_foreground(AppUid::new(arg(args, 1, "uid")?.parse()?), false),
            "locked" => self.signals.set_locked(true),
            "unlocked" => self.signals.set_locked(false),
            "metered" => self.signals.set_metered(true),
            "unmetered" => self.signals.set_metered(false),
            "broken" => self.signals.set_functional(false),
            "functional" => self.signals.set_functional(true),
            other => bail!("unknown signal: {other}"),
        }
        Ok(())
    }

    fn proxy(&self, args: &[&str]) -> Result<()> {
        match arg(args, 0, "proxy")? {
            "wg" => {
                let uid = AppUid::new(arg(args, 1, "uid")?.parse()?);
                let config = match arg(args, 2, "config id")? {
                    "none" => None,
                    id => Some(id.parse()?),
                };
                self.proxies.assign_wireguard(uid, config);
            }
            "active" => {
                let target: RouteTarget = arg(args, 1, "target")?.parse()?;
                self.proxies.set_active(target, on_off(arg(args, 2, "on|off")?)?);
            }
            "map" => {
                let uid = AppUid::new(arg(args, 1, "uid")?.parse()?);
                let target = match arg(args, 2, "target")? {
                    "none" => None,
                    target => Some(target.parse::<RouteTarget>()?),
                };
                self.proxies.map_app(uid, target);
            }
            kind => {
                let kind = ProxyKind::parse(kind).ok_or_else(|| anyhow!("unknown proxy: {kind}"))?;
                self.proxies.set_enabled(kind, on_off(arg(args, 1, "on|off")?)?);
            }
        }
        Ok(())
    }
}

fn arg<'a>(args: &[&'a str], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| anyhow!("missing argument: {name}"))
}

fn on_off(value: &str) -> Result<bool> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => bail!("expected on or off, got {value}"),
    }
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();

    // Parse arguments
    let args = Args::parse();

    // Handle generate-config
    if args.generate_config {
        policy_router::config::create_default_config(&args.config_path)?;
        println!("Generated default configuration at {:?}", args.config_path);
        return Ok(());
    }

    // Load configuration
    let config = load_config_with_env(&args.config_path).with_context(|| {
        format!("Failed to load configuration from {:?}", args.config_path)
    })?;

    // Handle check-config
    if args.check_config {
        println!("Configuration is valid");
        return Ok(());
    }

    init_logging(&config)?;

    info!("policy-router v{}", policy_router::VERSION);
    info!("Configuration loaded from {:?}", args.config_path);
    info!(
        "Mode: {}, resolver: {} / {}, gate: {:?} budget + {:?} stall",
        config.mode,
        config.tunnel.dns_ipv4,
        config.tunnel.dns_ipv6,
        config.gate.budget(),
        config.gate.stall()
    );

    let console = Console::new(&config, Handle::current());

    info!(
        "Startup complete in {:.2}ms",
        start_time.elapsed().as_secs_f64() * 1000.0
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => {
                info!("Received SIGINT, initiating shutdown...");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let line = line.trim();
        if line == "quit" || line == "exit" {
            break;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match console.execute(line).await {
            Ok(Some(output)) => println!("{output}"),
            Ok(None) => {}
            Err(e) => {
                warn!("command failed: {}: {:#}", line, e);
                println!("error: {e:#}");
            }
        }
    }

    let stats = console.facade.stats().snapshot();
    info!(
        "Final stats: {} evaluated, {} blocked, {} allowed, {} exempt, {} failed",
        stats.evaluated, stats.blocked, stats.allowed, stats.exempt, stats.failed
    );
    info!(
        "Open flows: {}, closed: {}, transferred: {} bytes",
        console.facade.ledger().len(),
        stats.closed,
        stats.total_bytes()
    );
    info!("Shutdown complete");

    Ok(())
}
