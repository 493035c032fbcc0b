//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use tokio_util::sync::CancellationToken;

use crate::oracle::Oracle;
use crate::tracker::HeaderTracker;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub oracle: Arc<Oracle>,
    pub tracker: Arc<HeaderTracker>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(oracle: Arc<Oracle>, tracker: Arc<HeaderTracker>, shutdown: CancellationToken) -> Self {
        Self {
            oracle,
            tracker,
            shutdown,
        }
    }

    /// Token for one request; cancelled with the process.
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

impl FromRef<AppState> for Arc<Oracle> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.oracle.clone()
    }
}

impl FromRef<AppState> for Arc<HeaderTracker> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.tracker.clone()
    }
}
