//! policy-router: per-flow firewall and route decisions for a VPN tunnel
//!
//! This crate decides, for every new network flow a tunnel intercepts,
//! whether the flow is blocked and which egress carries it, and which DNS
//! transport answers each query.
//!
//! # Features
//!
//! - **Ordered rule evaluation**: app, domain, IP and global rules with a
//!   fixed precedence and a named outcome per decision
//! - **Fail-closed**: lookup failures and panics inside evaluation block
//!   the flow instead of crashing the tunnel
//! - **Bounded waits**: cold paths (newly installed apps, broken foreground
//!   signal) wait through a jittered backoff gate with a hard budget
//! - **Route selection**: WireGuard, SOCKS5, HTTP, Orbot or the base network
//! - **Flow ledger**: open flows tracked from admission until close
//!
//! # Architecture
//!
//! ```text
//! forwarding engine ──▶ DecisionFacade ──▶ RuleEvaluator ──▶ policy stores
//!        ▲                   │                   │
//!        │                   ├──▶ FlowLedger     └──▶ RouteSelector
//!        └── "target,id,uid" ┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use policy_router::config::load_config;
//! use policy_router::decision::{DecisionFacade, FlowLogger, FlowRequest, TracingFlowLogger};
//! use policy_router::policy::GlobalToggles;
//! use policy_router::rules::RuleEvaluator;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("/etc/policy-router/config.json")?;
//!
//! let evaluator = RuleEvaluator::builder()
//!     .toggles(Arc::new(GlobalToggles::from_config(&config.toggles, config.mode)))
//!     .gate(config.gate.clone())
//!     .build();
//! let facade = DecisionFacade::new(evaluator, Arc::new(TracingFlowLogger), config.tunnel.clone());
//!
//! let decision = facade.on_new_flow(&FlowRequest::new(6, 10_042, "10.111.222.1:40000", "1.1.1.1:443"));
//! println!("{decision}");
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration types and loading
//! - [`connection`]: Flow metadata, ledger and statistics
//! - [`decision`]: The façade the forwarding engine calls
//! - [`dns`]: DNS transport selection
//! - [`error`]: Error types
//! - [`outbound`]: Route targets and proxy registry
//! - [`policy`]: Policy stores, toggles and signals
//! - [`rules`]: Rule outcomes, evaluator and retry gate

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod connection;
pub mod decision;
pub mod dns;
pub mod error;
pub mod outbound;
pub mod policy;
pub mod rules;

// Re-export commonly used types at the crate root
pub use config::{Config, OperatingMode, TunnelConfig};
pub use connection::{DecisionStats, FlowLedger, FlowMetadata, FlowSummary};
pub use decision::{DecisionFacade, FlowLogger, FlowRequest, RouteDecision, TracingFlowLogger};
pub use error::{AdapterError, ConfigError, EvaluationError, LookupError, PolicyRouterError};
pub use outbound::{RouteSelector, RouteTarget};
pub use policy::{AppUid, GlobalToggles, Toggle};
pub use rules::{RuleEvaluator, RuleOutcome};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
