//! Decision façade for the forwarding engine
//!
//! This module provides:
//! - [`DecisionFacade`]: flow, query and close callbacks
//! - [`FlowRequest`] / [`RouteDecision`]: the engine's request and answer
//! - [`FlowLogger`]: sink for decided flows and close reports
//! - [`TunnelAdapter`] / [`AdapterSlot`]: management of the live tunnel
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use policy_router::config::TunnelConfig;
//! use policy_router::decision::{DecisionFacade, FlowLogger, FlowRequest, TracingFlowLogger};
//! use policy_router::outbound::RouteTarget;
//! use policy_router::rules::RuleEvaluator;
//!
//! let facade = DecisionFacade::new(
//!     RuleEvaluator::builder().build(),
//!     Arc::new(TracingFlowLogger) as Arc<dyn FlowLogger>,
//!     TunnelConfig::default(),
//! );
//!
//! let decision = facade.on_new_flow(&FlowRequest::new(6, 10_042, "10.111.222.1:40000", "1.1.1.1:443"));
//! assert_eq!(decision.target, RouteTarget::Base);
//! assert!(facade.is_flow_tracked(decision.flow_id.as_str()));
//! ```

mod adapter;
mod facade;
mod logger;
mod request;
mod response;

pub use adapter::{AdapterSlot, ProxyStatus, TunnelAdapter};
pub use facade::DecisionFacade;
pub use logger::{FlowLogger, TracingFlowLogger};
pub use request::FlowRequest;
pub use response::{DecisionParseError, RouteDecision};
