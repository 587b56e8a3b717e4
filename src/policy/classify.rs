//! App classification trigger
//!
//! When a flow arrives from an app the store has never seen, the evaluator
//! asks for it to be classified and continues without waiting. Whatever
//! performs the classification eventually updates [`super::AppRuleStore`],
//! which the retry gate observes.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use super::AppUid;
use crate::error::LookupError;

/// Fire-and-forget classification request
pub trait AppClassifier: Send + Sync {
    /// Request that `uid` be classified; must not block
    fn request_classification(&self, uid: AppUid);
}

/// Async worker that classifies one app
#[async_trait]
pub trait AppRefresher: Send + Sync + 'static {
    /// Look the app up and record it as tracked
    ///
    /// # Errors
    ///
    /// Returns `LookupError` if the app could not be classified.
    async fn refresh(&self, uid: AppUid) -> Result<(), LookupError>;
}

/// Classifier that runs an [`AppRefresher`] on a tokio runtime.
///
/// Concurrent requests for the same uid collapse into one task.
pub struct SpawningClassifier<R> {
    refresher: Arc<R>,
    handle: Handle,
    in_flight: Arc<DashSet<AppUid>>,
}

impl<R: AppRefresher> SpawningClassifier<R> {
    /// Create a classifier spawning onto `handle`
    #[must_use]
    pub fn new(refresher: Arc<R>, handle: Handle) -> Self {
        Self {
            refresher,
            handle,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Number of classifications still running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl<R: AppRefresher> AppClassifier for SpawningClassifier<R> {
    fn request_classification(&self, uid: AppUid) {
        if !self.in_flight.insert(uid) {
            debug!("classification of app {} already running", uid);
            return;
        }

        let refresher = Arc::clone(&self.refresher);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            uid,
        };
        self.handle.spawn(async move {
            let _guard = guard;
            match refresher.refresh(uid).await {
                Ok(()) => debug!("app {} classified", uid),
                Err(e) => warn!("classification of app {} failed: {}", uid, e),
            }
        });
    }
}

/// Clears an in-flight entry however the classification task ends
struct InFlightGuard {
    in_flight: Arc<DashSet<AppUid>>,
    uid: AppUid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.uid);
    }
}

/// Classifier that drops every request.
///
/// Default for evaluators built without a classifier: untracked apps stay
/// untracked until the embedder updates the app store itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardingClassifier;

impl AppClassifier for DiscardingClassifier {
    fn request_classification(&self, uid: AppUid) {
        trace!("no classifier installed, ignoring app {}", uid);
    }
}

/// Classifier that only records requests, for callers that drain them
#[derive(Debug, Default)]
pub struct PendingClassifications {
    requested: Mutex<Vec<AppUid>>,
}

impl PendingClassifications {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every request recorded so far
    pub fn drain(&self) -> Vec<AppUid> {
        std::mem::take(&mut *self.requested.lock())
    }
}

impl AppClassifier for PendingClassifications {
    fn request_classification(&self, uid: AppUid) {
        self.requested.lock().push(uid);
    }
}
