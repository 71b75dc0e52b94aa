use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream};
use tokio_util::sync::CancellationToken;

use crate::registry::HealthRegistry;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Answer given to a discovery backend probing the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
}

impl ServingStatus {
    pub fn is_serving(&self) -> bool {
        matches!(self, ServingStatus::Serving)
    }
}

impl fmt::Display for ServingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServingStatus::Unknown => "unknown",
            ServingStatus::Serving => "serving",
            ServingStatus::NotServing => "not-serving",
        };
        f.write_str(label)
    }
}

impl IntoResponse for ServingStatus {
    fn into_response(self) -> Response {
        match self {
            ServingStatus::Serving => (StatusCode::OK, "serving"),
            ServingStatus::NotServing => (StatusCode::SERVICE_UNAVAILABLE, "not serving"),
            ServingStatus::Unknown => (StatusCode::SERVICE_UNAVAILABLE, "unknown"),
        }
        .into_response()
    }
}

/// Check and watch callbacks handed to the server's health surface.
///
/// Cheap to clone; every clone observes the same registry and shutdown token.
/// Both callbacks may run concurrently from any number of probe tasks.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: HealthRegistry,
    shutdown: CancellationToken,
    poll_interval: Duration,
}

impl HealthMonitor {
    pub fn new(registry: HealthRegistry) -> Self {
        Self {
            registry,
            shutdown: CancellationToken::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Once `shutdown` is cancelled the monitor reports `NotServing`, whatever
    /// the registry says.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn registry(&self) -> &HealthRegistry {
        &self.registry
    }

    /// Single-shot liveness query.
    ///
    /// A registry nobody has registered into yet counts as serving: the
    /// controller is up and has nothing that could be stalled.
    pub fn check(&self) -> ServingStatus {
        if self.shutdown.is_cancelled() {
            return ServingStatus::NotServing;
        }
        let status = self.registry.get_status();
        if status.healthy || status.components.is_empty() {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        }
    }

    /// Stream of status updates for long-lived subscribers.
    ///
    /// The current status is yielded first, then every change seen at the poll
    /// interval. Nothing runs until the stream is polled, and every call starts
    /// an independent stream. The stream ends once `cancel` is cancelled.
    pub fn watch(
        &self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = ServingStatus> + Send + 'static {
        let state = WatchState {
            monitor: self.clone(),
            cancel,
            last: None,
        };
        stream::unfold(state, |mut state| async move {
            loop {
                if state.cancel.is_cancelled() {
                    return None;
                }
                let current = state.monitor.check();
                if state.last != Some(current) {
                    state.last = Some(current);
                    return Some((current, state));
                }
                tokio::select! {
                    _ = state.cancel.cancelled() => return None,
                    _ = tokio::time::sleep(state.monitor.poll_interval) => {}
                }
            }
        })
    }
}

struct WatchState {
    monitor: HealthMonitor,
    cancel: CancellationToken,
    last: Option<ServingStatus>,
}
