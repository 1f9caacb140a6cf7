//! Connectivity tracking for the remote movie service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use moviesync_storage::{MovieProvider, ProbeOutcome};

/// Capacity of the status notification channel. Slow subscribers lag and
/// miss intermediate changes rather than blocking the monitor.
const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Reachability of the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectivityState {
    /// Service reachable and answering.
    Online,
    /// Host cannot be reached at all.
    Offline,
    /// Host reachable, but answering with error statuses.
    ServerDown,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectivityState::Online => "online",
            ConnectivityState::Offline => "offline",
            ConnectivityState::ServerDown => "server-down",
        };
        f.write_str(s)
    }
}

impl From<&ProbeOutcome> for ConnectivityState {
    fn from(outcome: &ProbeOutcome) -> Self {
        match outcome {
            ProbeOutcome::Reachable => ConnectivityState::Online,
            ProbeOutcome::HttpError(_) => ConnectivityState::ServerDown,
            ProbeOutcome::Unreachable(_) => ConnectivityState::Offline,
        }
    }
}

/// Broadcast whenever the status is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ConnectivityState,
}

/// Generic reachability signal from the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    BecameReachable,
    BecameUnreachable,
}

/// Tracks the single current connectivity state and notifies subscribers.
///
/// Any state may follow any other. There is no debouncing: every
/// `set_status` call is broadcast, even when the value does not change.
pub struct ConnectivityMonitor<P: MovieProvider + ?Sized> {
    provider: Arc<P>,
    state: RwLock<ConnectivityState>,
    events: broadcast::Sender<StatusChange>,
}

impl<P: MovieProvider + ?Sized> ConnectivityMonitor<P> {
    /// Create a monitor that assumes the service is online until told
    /// otherwise.
    pub fn new(provider: Arc<P>) -> Self {
        let (events, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            provider,
            state: RwLock::new(ConnectivityState::Online),
            events,
        }
    }

    /// Current state.
    pub fn get_status(&self) -> ConnectivityState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_online(&self) -> bool {
        self.get_status() == ConnectivityState::Online
    }

    /// Overwrite the state and notify subscribers.
    ///
    /// Delivery is fire-and-forget; with no subscribers the notification is
    /// dropped.
    pub fn set_status(&self, status: ConnectivityState) {
        let previous = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, status)
        };

        if previous != status {
            info!("Connectivity changed: {} -> {}", previous, status);
        } else {
            debug!("Connectivity unchanged: {}", status);
        }

        let _ = self.events.send(StatusChange { status });
    }

    /// Subscribe to status notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }

    /// Apply a reachability signal from the host environment.
    pub fn apply_signal(&self, signal: ConnectivitySignal) {
        match signal {
            ConnectivitySignal::BecameReachable => self.set_status(ConnectivityState::Online),
            ConnectivitySignal::BecameUnreachable => self.set_status(ConnectivityState::Offline),
        }
    }

    /// Probe the service once and record the outcome.
    ///
    /// Never fails: a non-success response means `ServerDown`, a transport
    /// failure means `Offline`. Not retried here; the caller owns the
    /// cadence.
    pub async fn check_server_status(&self) -> bool {
        let outcome = self.provider.probe().await;
        match &outcome {
            ProbeOutcome::Reachable => {}
            ProbeOutcome::HttpError(status) => {
                warn!("Probe of {} answered with HTTP {}", self.provider.name(), status)
            }
            ProbeOutcome::Unreachable(reason) => {
                warn!("Probe of {} failed: {}", self.provider.name(), reason)
            }
        }

        self.set_status(ConnectivityState::from(&outcome));
        outcome.is_reachable()
    }
}
