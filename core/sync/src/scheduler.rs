//! Connectivity probing and replay scheduling.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use moviesync_common::{Error, Result};
use moviesync_storage::MovieProvider;

use crate::catalog::{MovieCatalog, ReplayReport};
use crate::connectivity::ConnectivityState;

/// When pending operations are replayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Only when explicitly requested.
    #[default]
    Manual,
    /// Also whenever a status check finds the service online with entries
    /// waiting.
    OnReconnect,
}

enum ProbeRequest {
    Check(oneshot::Sender<ConnectivityState>),
    Sync(oneshot::Sender<Result<ReplayReport>>),
    Shutdown,
}

/// Front end of the probe loop.
///
/// Cheap to clone. Requests are served by the task running the matching
/// `ProbeSchedulerHandle`.
#[derive(Clone)]
pub struct ProbeScheduler {
    request_tx: mpsc::Sender<ProbeRequest>,
}

impl ProbeScheduler {
    /// Create a scheduler probing every `period`.
    pub fn new(period: Duration, mode: SyncMode) -> (Self, ProbeSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(16);
        let handle = ProbeSchedulerHandle {
            period,
            mode,
            request_rx,
        };
        (Self { request_tx }, handle)
    }

    /// Probe immediately and return the resulting state.
    pub async fn check_now(&self) -> Result<ConnectivityState> {
        let (tx, rx) = oneshot::channel();
        self.send(ProbeRequest::Check(tx)).await?;
        rx.await.map_err(|_| not_running())
    }

    /// Replay pending operations now.
    pub async fn sync_now(&self) -> Result<ReplayReport> {
        let (tx, rx) = oneshot::channel();
        self.send(ProbeRequest::Sync(tx)).await?;
        rx.await.map_err(|_| not_running())?
    }

    /// Stop the probe loop.
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send(ProbeRequest::Shutdown).await;
    }

    async fn send(&self, request: ProbeRequest) -> Result<()> {
        self.request_tx.send(request).await.map_err(|_| not_running())
    }
}

fn not_running() -> Error {
    Error::NotPermitted("Probe scheduler not running".to_string())
}

/// Background half of the scheduler.
pub struct ProbeSchedulerHandle {
    period: Duration,
    mode: SyncMode,
    request_rx: mpsc::Receiver<ProbeRequest>,
}

impl ProbeSchedulerHandle {
    /// Run the probe loop until shut down or every `ProbeScheduler` is
    /// dropped.
    ///
    /// The first probe happens immediately. Probes never overlap, and a
    /// replay is never started while another is running.
    pub async fn run<P>(mut self, catalog: Arc<MovieCatalog<P>>)
    where
        P: MovieProvider + ?Sized,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Probe scheduler started (every {:?}, {:?})",
            self.period, self.mode
        );

        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    match request {
                        Some(ProbeRequest::Check(response_tx)) => {
                            let status = self.probe(&catalog).await;
                            let _ = response_tx.send(status);
                        }
                        Some(ProbeRequest::Sync(response_tx)) => {
                            let _ = response_tx.send(catalog.sync_pending_operations().await);
                        }
                        Some(ProbeRequest::Shutdown) | None => {
                            info!("Probe scheduler shutting down");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.probe(&catalog).await;
                }
            }
        }
    }

    /// Check the service once. In `OnReconnect` mode, replay whenever it is
    /// online with work waiting. That covers a log reloaded at startup as
    /// well as one filled while disconnected.
    async fn probe<P>(&self, catalog: &MovieCatalog<P>) -> ConnectivityState
    where
        P: MovieProvider + ?Sized,
    {
        catalog.check_server_status().await;
        let status = catalog.status();
        debug!("Probe finished: {}", status);

        if self.mode == SyncMode::OnReconnect
            && status == ConnectivityState::Online
            && catalog.pending_count().await > 0
        {
            match catalog.sync_pending_operations().await {
                Ok(report) => info!(
                    "Reconnect replay: {} replayed, {} dropped",
                    report.replayed, report.failed
                ),
                Err(e) => error!("Reconnect replay failed: {}", e),
            }
        }

        status
    }
}
