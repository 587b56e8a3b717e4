//! Route decision wire format

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::FlowId;
use crate::outbound::{RouteTarget, UnknownTarget};
use crate::policy::AppUid;

/// Answer to a new flow: where it goes, its token, and its owner.
///
/// On the wire this is `"<target>,<flowId>,<uid>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    /// Egress for the flow
    pub target: RouteTarget,
    /// Token the engine reports back on close
    pub flow_id: FlowId,
    /// Owning app
    pub uid: AppUid,
}

impl RouteDecision {
    /// Create a decision
    #[must_use]
    pub const fn new(target: RouteTarget, flow_id: FlowId, uid: AppUid) -> Self {
        Self {
            target,
            flow_id,
            uid,
        }
    }

    /// Whether the flow is dropped
    #[must_use]
    pub const fn is_block(&self) -> bool {
        self.target.is_block()
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.target, self.flow_id, self.uid)
    }
}

/// Error parsing a wire-encoded decision
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionParseError {
    /// Not three comma separated fields
    #[error("malformed route decision: {0}")]
    Malformed(String),

    /// First field is not a route target
    #[error(transparent)]
    Target(#[from] UnknownTarget),

    /// Last field is not a uid
    #[error("invalid uid in route decision: {0}")]
    Uid(String),
}

impl FromStr for RouteDecision {
    type Err = DecisionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.splitn(3, ',');
        let (Some(target), Some(flow_id), Some(uid)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(DecisionParseError::Malformed(s.to_string()));
        };

        let target = target.parse()?;
        let uid = uid
            .trim()
            .parse::<i32>()
            .map_err(|_| DecisionParseError::Uid(uid.to_string()))?;

        Ok(Self::new(target, FlowId::from(flow_id), AppUid::new(uid)))
    }
}
