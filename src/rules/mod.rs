//! Rule engine for per-flow firewall decisions
//!
//! This module provides:
//! - The closed set of rule outcomes ([`RuleOutcome`])
//! - The ordered rule evaluator ([`RuleEvaluator`])
//! - The bounded retry gate used on cold paths ([`RetryGate`])
//!
//! # Architecture
//!
//! Rules are evaluated in a fixed precedence order. App rules come first,
//! then per-app domain and IP rules, then global ("universal") rules, then
//! the DNS and proxy rules. The first rule that matches decides the flow.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use policy_router::connection::{FlowMetadata, Protocol};
//! use policy_router::policy::{AppRuleStore, AppRules, AppUid};
//! use policy_router::rules::{RuleEvaluator, RuleOutcome};
//!
//! let apps = Arc::new(AppRuleStore::new());
//! apps.update(AppUid::new(7), |status| status.isolate = true);
//!
//! let evaluator = RuleEvaluator::builder()
//!     .apps(apps as Arc<dyn AppRules>)
//!     .build();
//!
//! let mut flow = FlowMetadata::new(
//!     AppUid::new(7),
//!     Protocol::Tcp,
//!     "10.0.0.2".parse().ok(),
//!     40000,
//!     "1.1.1.1".parse().ok(),
//!     443,
//! );
//! assert_eq!(evaluator.apply(&mut flow, false), RuleOutcome::IsolateMode);
//! assert!(flow.blocked);
//! ```

pub mod evaluator;
pub mod gate;
pub mod outcome;

pub use evaluator::{EvalContext, RuleEvaluator, RuleEvaluatorBuilder};
pub use gate::{Clock, GateOutcome, ManualClock, RetryGate, SystemClock};
pub use outcome::{RuleOutcome, UnknownOutcome};
