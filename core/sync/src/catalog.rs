//! Movie access facade: remote first, local fallback while disconnected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use moviesync_common::{Error, Movie, MovieId, MovieQuery, Result};
use moviesync_storage::{LocalStore, MovieProvider};

use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::mirror::LocalMirror;
use crate::pending::{OperationKind, OperationPayload, PendingOperation, PendingOperationLog};
use crate::stats::MovieStatistics;

/// Outcome of one replay pass over the pending log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Entries the service accepted.
    pub replayed: usize,
    /// Entries that failed and were dropped.
    pub failed: usize,
    pub duration: Duration,
}

/// Offline state. Mirror and log sit behind one lock so every
/// read-modify-write, and every replay pass, is serialized.
struct OfflineState {
    mirror: LocalMirror,
    pending: PendingOperationLog,
}

impl OfflineState {
    /// Queue a change already applied to the mirror. If the log cannot take
    /// it, the mirror is put back to `before`.
    async fn enqueue(
        &mut self,
        kind: OperationKind,
        payload: OperationPayload,
        before: Vec<Movie>,
    ) -> Result<()> {
        if let Err(e) = self.pending.add_pending_operation(kind, payload).await {
            if let Err(restore) = self.mirror.replace_all(before).await {
                warn!("Failed to restore local mirror: {}", restore);
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Single read/write surface over the remote service and the local state.
///
/// Writes go to the service when it is online. If it is not, or the call
/// fails for connectivity reasons, the change is applied to the local mirror
/// and queued in the pending log for replay.
pub struct MovieCatalog<P: MovieProvider + ?Sized> {
    provider: Arc<P>,
    monitor: Arc<ConnectivityMonitor<P>>,
    state: Mutex<OfflineState>,
}

impl<P: MovieProvider + ?Sized> MovieCatalog<P> {
    /// Open the catalog with a fresh connectivity monitor.
    ///
    /// # Postconditions
    /// - Mirror and pending log are loaded from `store` before this returns
    pub async fn open(provider: Arc<P>, store: Arc<dyn LocalStore>) -> Result<Self> {
        let monitor = Arc::new(ConnectivityMonitor::new(provider.clone()));
        Self::with_monitor(provider, monitor, store).await
    }

    /// Open the catalog around an existing monitor.
    pub async fn with_monitor(
        provider: Arc<P>,
        monitor: Arc<ConnectivityMonitor<P>>,
        store: Arc<dyn LocalStore>,
    ) -> Result<Self> {
        let mirror = LocalMirror::open(store.clone()).await?;
        let pending = PendingOperationLog::open(store).await?;
        info!(
            "Loaded local state: {} movies, {} pending operations",
            mirror.len(),
            pending.len()
        );

        Ok(Self {
            provider,
            monitor,
            state: Mutex::new(OfflineState { mirror, pending }),
        })
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor<P>> {
        &self.monitor
    }

    pub fn status(&self) -> ConnectivityState {
        self.monitor.get_status()
    }

    /// Probe the service and update the connectivity state.
    pub async fn check_server_status(&self) -> bool {
        self.monitor.check_server_status().await
    }

    /// Fetch the whole collection.
    ///
    /// Online, a successful fetch overwrites the mirror. Any failure, or any
    /// state other than online, answers from the mirror instead. The
    /// connectivity state is left alone.
    pub async fn get_all_movies(&self) -> Result<Vec<Movie>> {
        self.list_movies(&MovieQuery::all()).await
    }

    /// Fetch a filtered, sorted and optionally paged listing.
    ///
    /// The page window is cut locally from the full result. Only unfiltered
    /// results overwrite the mirror; a filtered listing is a subset and would
    /// drop records.
    pub async fn list_movies(&self, query: &MovieQuery) -> Result<Vec<Movie>> {
        if self.monitor.is_online() {
            match self.provider.list(&query.unpaged()).await {
                Ok(movies) => {
                    if !query.is_filtered() {
                        self.state.lock().await.mirror.replace_all(movies.clone()).await?;
                    }
                    return Ok(query.paginate(movies));
                }
                Err(e) => warn!("Fetch failed, answering from local mirror: {}", e),
            }
        }

        Ok(self.state.lock().await.mirror.query(query))
    }

    /// Fetch one movie, falling back to the mirror like `list_movies`.
    pub async fn get_movie(&self, id: &MovieId) -> Result<Movie> {
        if self.monitor.is_online() {
            match self.provider.get(id).await {
                Ok(movie) => return Ok(movie),
                Err(e) if e.is_connectivity() => {
                    warn!("Fetch of {} failed, answering from local mirror: {}", id, e)
                }
                Err(e) => return Err(e),
            }
        }

        self.state
            .lock()
            .await
            .mirror
            .find(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Movie not found: {}", id)))
    }

    /// Create a movie.
    ///
    /// Created locally, the record gets a generated id that stays in place
    /// until the queued create is replayed.
    ///
    /// # Errors
    /// - Record fails validation
    /// - Service rejected the record
    /// - Local state could not be persisted
    pub async fn add_movie(&self, movie: Movie) -> Result<Movie> {
        movie.validate()?;

        if self.monitor.is_online() {
            match self.provider.create(&movie).await {
                Ok(created) => {
                    self.monitor.set_status(ConnectivityState::Online);
                    self.state.lock().await.mirror.append(created.clone()).await?;
                    return Ok(created);
                }
                Err(e) => self.fall_back_or_fail(e)?,
            }
        }

        let movie = match movie.id {
            Some(_) => movie,
            None => movie.with_id(MovieId::generate()),
        };

        let mut state = self.state.lock().await;
        let before = state.mirror.movies().to_vec();
        state.mirror.append(movie.clone()).await?;
        state
            .enqueue(OperationKind::Create, OperationPayload::Movie(movie.clone()), before)
            .await?;
        debug!("Queued create of {}", movie.name);

        Ok(movie)
    }

    /// Replace an existing movie.
    ///
    /// A record whose create is still queued is only known locally, so the
    /// change is queued behind the create even while online.
    ///
    /// # Errors
    /// - Record has no id, or fails validation
    /// - Service rejected the record
    /// - Local state could not be persisted
    pub async fn update_movie(&self, movie: Movie) -> Result<Movie> {
        let Some(id) = movie.id.clone() else {
            return Err(Error::InvalidInput(
                "Movie ID is required for update".to_string(),
            ));
        };
        movie.validate()?;

        let mut state = self.state.lock().await;
        if self.monitor.is_online() && !state.pending.awaits_create(&id) {
            drop(state);
            match self.provider.update(&movie).await {
                Ok(updated) => {
                    self.monitor.set_status(ConnectivityState::Online);
                    self.state.lock().await.mirror.upsert(updated.clone()).await?;
                    return Ok(updated);
                }
                Err(e) => self.fall_back_or_fail(e)?,
            }
            state = self.state.lock().await;
        }

        let before = state.mirror.movies().to_vec();
        state.mirror.upsert(movie.clone()).await?;
        state
            .enqueue(OperationKind::Update, OperationPayload::Movie(movie.clone()), before)
            .await?;
        debug!("Queued update of {}", movie.name);

        Ok(movie)
    }

    /// Delete a movie.
    ///
    /// Like `update_movie`, a record whose create is still queued is deleted
    /// locally and the delete queued behind the create.
    pub async fn delete_movie(&self, id: &MovieId) -> Result<()> {
        let mut state = self.state.lock().await;
        if self.monitor.is_online() && !state.pending.awaits_create(id) {
            drop(state);
            match self.provider.delete(id).await {
                Ok(()) => {
                    self.monitor.set_status(ConnectivityState::Online);
                    self.state.lock().await.mirror.remove(id).await?;
                    return Ok(());
                }
                Err(e) => self.fall_back_or_fail(e)?,
            }
            state = self.state.lock().await;
        }

        let before = state.mirror.movies().to_vec();
        state.mirror.remove(id).await?;
        state
            .enqueue(OperationKind::Delete, OperationPayload::Id { id: id.clone() }, before)
            .await?;
        debug!("Queued delete of {}", id);

        Ok(())
    }

    /// Replay the pending log against the service.
    ///
    /// Entries are sent strictly in insertion order, each awaited before the
    /// next. A failing entry is logged and dropped, not retried. The log is
    /// cleared once the pass ends, whatever the outcome of each entry. If the
    /// cleared log cannot be written, the entries stay queued.
    ///
    /// Creates come back with a service-assigned id; the mirror record and
    /// later entries that used the local id are rewritten to it.
    ///
    /// # Errors
    /// - Not online
    /// - Clearing the log could not be persisted
    pub async fn sync_pending_operations(&self) -> Result<ReplayReport> {
        let status = self.monitor.get_status();
        if status != ConnectivityState::Online {
            return Err(Error::NotPermitted(format!(
                "Cannot sync pending operations while {}",
                status
            )));
        }

        let start = Instant::now();
        let mut state = self.state.lock().await;
        let operations = state.pending.get_pending_operations().to_vec();

        if operations.is_empty() {
            return Ok(ReplayReport {
                replayed: 0,
                failed: 0,
                duration: start.elapsed(),
            });
        }

        info!("Replaying {} pending operations", operations.len());

        let mut replayed = 0;
        let mut failed = 0;
        let mut remapped: HashMap<MovieId, MovieId> = HashMap::new();

        for (index, operation) in operations.iter().enumerate() {
            let operation = operation.remapped(&remapped);
            debug!("Replaying #{}: {}", index, operation.kind);

            match self.replay(&operation).await {
                Ok(Some((local_id, server_id))) => {
                    replayed += 1;
                    if local_id != server_id {
                        if let Err(e) = state.mirror.rekey(&local_id, &server_id).await {
                            warn!("Failed to rekey {} to {}: {}", local_id, server_id, e);
                        }
                        remapped.insert(local_id, server_id);
                    }
                }
                Ok(None) => replayed += 1,
                Err(e) => {
                    error!("Dropping pending {} #{}: {}", operation.kind, index, e);
                    failed += 1;
                }
            }
        }

        state.pending.clear_pending_operations().await?;

        let duration = start.elapsed();
        info!(
            "Replay completed in {:?}: {} replayed, {} dropped",
            duration, replayed, failed
        );

        Ok(ReplayReport {
            replayed,
            failed,
            duration,
        })
    }

    /// Snapshot of the pending log.
    pub async fn pending_operations(&self) -> Vec<PendingOperation> {
        self.state.lock().await.pending.get_pending_operations().to_vec()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Snapshot of the local mirror.
    pub async fn mirror_snapshot(&self) -> Vec<Movie> {
        self.state.lock().await.mirror.movies().to_vec()
    }

    /// Aggregate figures over the collection `get_all_movies` returns.
    pub async fn statistics(&self) -> Result<MovieStatistics> {
        let movies = self.get_all_movies().await?;
        Ok(MovieStatistics::from_movies(&movies))
    }

    /// Send one pending entry. For a create, returns the local and the
    /// service-assigned id.
    async fn replay(&self, operation: &PendingOperation) -> Result<Option<(MovieId, MovieId)>> {
        match (&operation.kind, &operation.payload) {
            (OperationKind::Create, OperationPayload::Movie(movie)) => {
                let created = self.provider.create(movie).await?;
                Ok(movie.id.clone().zip(created.id))
            }
            (OperationKind::Update, OperationPayload::Movie(movie)) => {
                self.provider.update(movie).await?;
                Ok(None)
            }
            (OperationKind::Delete, payload) => {
                let id = payload.movie_id().ok_or_else(|| {
                    Error::InvalidInput("Delete entry carries no id".to_string())
                })?;
                self.provider.delete(id).await?;
                Ok(None)
            }
            (kind, _) => Err(Error::InvalidInput(format!(
                "Malformed pending {} entry",
                kind
            ))),
        }
    }

    /// Decide what a failed remote write means.
    ///
    /// Connectivity failures update the status and let the caller fall back
    /// to local state. Anything else is the caller's error.
    fn fall_back_or_fail(&self, err: Error) -> Result<()> {
        if !err.is_connectivity() {
            return Err(err);
        }

        warn!("Remote write failed, applying locally: {}", err);
        let status = match err {
            Error::Network(_) => ConnectivityState::Offline,
            _ => ConnectivityState::ServerDown,
        };
        self.monitor.set_status(status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moviesync_common::{PageWindow, SortField};
    use moviesync_storage::{
        Availability, FileStore, MemoryProvider, MemoryStore, RemoteCall, PENDING_SLOT,
    };
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn dune() -> Movie {
        Movie::new("Dune", vec!["Sci-Fi".to_string()], "2021-10-22", 8.0, "")
    }

    fn heat() -> Movie {
        Movie::new("Heat", vec!["Crime".to_string()], "1995-12-15", 8.3, "LA heist")
    }

    async fn catalog(
        provider: &MemoryProvider,
    ) -> MovieCatalog<MemoryProvider> {
        MovieCatalog::open(Arc::new(provider.clone()), Arc::new(MemoryStore::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_offline_add_is_queued() {
        let provider = MemoryProvider::new();
        let catalog = catalog(&provider).await;
        catalog.monitor().set_status(ConnectivityState::Offline);

        let added = catalog.add_movie(dune()).await.unwrap();
        let id = added.id.clone().expect("generated id");

        let mirror = catalog.mirror_snapshot().await;
        assert_eq!(mirror, vec![added.clone()]);

        let pending = catalog.pending_operations().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, OperationKind::Create);
        assert_eq!(pending[0].payload, OperationPayload::Movie(added));
        assert_eq!(pending[0].payload.movie_id(), Some(&id));

        // Offline writes never touch the service.
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_then_read_uses_mirror() {
        let provider = MemoryProvider::with_movies(vec![dune(), heat()]);
        let catalog = catalog(&provider).await;

        let fetched = catalog.get_all_movies().await.unwrap();
        assert_eq!(fetched.len(), 2);

        provider.set_availability(Availability::Unreachable);
        assert!(!catalog.check_server_status().await);
        assert_eq!(catalog.status(), ConnectivityState::Offline);

        let offline = catalog.get_all_movies().await.unwrap();
        assert_eq!(offline, fetched);
    }

    #[tokio::test]
    async fn test_replay_preserves_order_and_clears_log() {
        let heat = heat().with_id(MovieId::new("b").unwrap());
        let provider = MemoryProvider::with_movies(vec![heat.clone()]);
        let catalog = catalog(&provider).await;
        catalog.get_all_movies().await.unwrap();

        catalog.monitor().set_status(ConnectivityState::Offline);
        let a = catalog.add_movie(dune()).await.unwrap();
        catalog.delete_movie(heat.id.as_ref().unwrap()).await.unwrap();

        catalog.monitor().set_status(ConnectivityState::Online);
        let report = catalog.sync_pending_operations().await.unwrap();
        assert_eq!(report.replayed, 2);
        assert_eq!(report.failed, 0);

        let mutations = provider.mutations();
        assert_eq!(mutations.len(), 2);
        assert_eq!(mutations[0], RemoteCall::Create(a));
        assert_eq!(mutations[1], RemoteCall::Delete(heat.id.clone().unwrap()));

        assert_eq!(catalog.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_replay_is_dropped() {
        let provider = MemoryProvider::new();
        let catalog = catalog(&provider).await;

        catalog.monitor().set_status(ConnectivityState::Offline);
        catalog.delete_movie(&MovieId::new("ghost").unwrap()).await.unwrap();
        catalog.add_movie(dune()).await.unwrap();

        catalog.monitor().set_status(ConnectivityState::Online);
        let report = catalog.sync_pending_operations().await.unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(catalog.pending_count().await, 0);
        assert_eq!(provider.movies().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_refused_when_not_online() {
        let provider = MemoryProvider::new();
        let catalog = catalog(&provider).await;
        catalog.monitor().set_status(ConnectivityState::ServerDown);

        let err = catalog.sync_pending_operations().await.unwrap_err();
        assert!(matches!(err, Error::NotPermitted(_)));
    }

    #[tokio::test]
    async fn test_replayed_create_takes_server_id() {
        let provider = MemoryProvider::new();
        let catalog = catalog(&provider).await;

        catalog.monitor().set_status(ConnectivityState::Offline);
        let local = catalog.add_movie(dune()).await.unwrap();
        let mut edited = local.clone();
        edited.rating = 9.0;
        catalog.update_movie(edited).await.unwrap();

        catalog.monitor().set_status(ConnectivityState::Online);
        let report = catalog.sync_pending_operations().await.unwrap();
        assert_eq!(report.failed, 0);

        let remote = provider.movies();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].rating, 9.0);
        assert_ne!(remote[0].id, local.id);

        assert_eq!(catalog.mirror_snapshot().await, remote);
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back_and_marks_offline() {
        let provider = MemoryProvider::new();
        let catalog = catalog(&provider).await;
        provider.set_availability(Availability::Unreachable);

        let added = catalog.add_movie(dune()).await.unwrap();
        assert!(added.id.is_some());
        assert_eq!(catalog.status(), ConnectivityState::Offline);
        assert_eq!(catalog.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_server_error_falls_back_and_marks_server_down() {
        let provider = MemoryProvider::with_movies(vec![dune().with_id(MovieId::new("a").unwrap())]);
        let catalog = catalog(&provider).await;
        catalog.get_all_movies().await.unwrap();
        provider.set_availability(Availability::ServerError(503));

        catalog.delete_movie(&MovieId::new("a").unwrap()).await.unwrap();
        assert_eq!(catalog.status(), ConnectivityState::ServerDown);
        assert!(catalog.mirror_snapshot().await.is_empty());
        assert_eq!(catalog.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_write_propagates() {
        let provider = MemoryProvider::new();
        let catalog = catalog(&provider).await;

        let ghost = dune().with_id(MovieId::new("ghost").unwrap());
        let err = catalog.update_movie(ghost).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(catalog.status(), ConnectivityState::Online);
        assert_eq!(catalog.pending_count().await, 0);
        assert!(catalog.mirror_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_record_never_queued() {
        let provider = MemoryProvider::new();
        let catalog = catalog(&provider).await;
        catalog.monitor().set_status(ConnectivityState::Offline);

        let mut movie = dune();
        movie.genres.clear();
        let err = catalog.add_movie(movie).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(catalog.pending_count().await, 0);

        let err = catalog.update_movie(dune()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_repeated_online_reads_are_stable() {
        let provider = MemoryProvider::with_movies(vec![dune(), heat()]);
        let catalog = catalog(&provider).await;

        let first = catalog.get_all_movies().await.unwrap();
        let second = catalog.get_all_movies().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(catalog.mirror_snapshot().await, second);
    }

    #[tokio::test]
    async fn test_filtered_read_keeps_full_mirror() {
        let provider = MemoryProvider::with_movies(vec![dune(), heat()]);
        let catalog = catalog(&provider).await;
        catalog.get_all_movies().await.unwrap();

        let query = MovieQuery {
            filter: Some("heist".to_string()),
            ..Default::default()
        };
        assert_eq!(catalog.list_movies(&query).await.unwrap().len(), 1);
        assert_eq!(catalog.mirror_snapshot().await.len(), 2);

        catalog.monitor().set_status(ConnectivityState::Offline);
        let offline = catalog.list_movies(&query).await.unwrap();
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].name, "Heat");
    }

    #[tokio::test]
    async fn test_get_movie_falls_back_to_mirror() {
        let id = MovieId::new("a").unwrap();
        let provider = MemoryProvider::with_movies(vec![dune().with_id(id.clone())]);
        let catalog = catalog(&provider).await;
        catalog.get_all_movies().await.unwrap();

        provider.set_availability(Availability::Unreachable);
        assert_eq!(catalog.get_movie(&id).await.unwrap().name, "Dune");

        let missing = MovieId::new("nope").unwrap();
        assert!(matches!(catalog.get_movie(&missing).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let temp = TempDir::new().unwrap();
        let provider = MemoryProvider::new();

        let queued = {
            let store = Arc::new(FileStore::open(temp.path()).await.unwrap());
            let catalog = MovieCatalog::open(Arc::new(provider.clone()), store).await.unwrap();
            catalog.monitor().set_status(ConnectivityState::Offline);
            catalog.add_movie(dune()).await.unwrap();
            catalog.pending_operations().await
        };

        let store = Arc::new(FileStore::open(temp.path()).await.unwrap());
        let catalog = MovieCatalog::open(Arc::new(provider.clone()), store).await.unwrap();
        assert_eq!(catalog.pending_operations().await, queued);
        assert_eq!(catalog.mirror_snapshot().await.len(), 1);

        catalog.sync_pending_operations().await.unwrap();
        assert_eq!(provider.movies().len(), 1);
    }

    #[tokio::test]
    async fn test_statistics_offline() {
        let provider = MemoryProvider::with_movies(vec![dune(), heat()]);
        let catalog = catalog(&provider).await;
        catalog.get_all_movies().await.unwrap();
        provider.set_availability(Availability::Unreachable);
        catalog.check_server_status().await;

        let stats = catalog.statistics().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_genre["Crime"], 1);
    }

    async fn catalog_on(
        provider: &MemoryProvider,
        store: &Arc<MemoryStore>,
    ) -> MovieCatalog<MemoryProvider> {
        MovieCatalog::open(Arc::new(provider.clone()), store.clone())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_delete_of_unsynced_record_waits_for_its_create() {
        let provider = MemoryProvider::new();
        let catalog = catalog(&provider).await;

        catalog.monitor().set_status(ConnectivityState::Offline);
        let local = catalog.add_movie(dune()).await.unwrap();
        catalog.monitor().set_status(ConnectivityState::Online);

        catalog.delete_movie(local.id.as_ref().unwrap()).await.unwrap();
        assert!(provider.calls().is_empty());
        assert!(catalog.mirror_snapshot().await.is_empty());
        assert_eq!(catalog.pending_count().await, 2);

        let report = catalog.sync_pending_operations().await.unwrap();
        assert_eq!(report.replayed, 2);
        assert_eq!(report.failed, 0);
        assert!(provider.movies().is_empty());
        assert!(catalog.mirror_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_of_unsynced_record_waits_for_its_create() {
        let provider = MemoryProvider::new();
        let catalog = catalog(&provider).await;

        catalog.monitor().set_status(ConnectivityState::Offline);
        let local = catalog.add_movie(dune()).await.unwrap();
        catalog.monitor().set_status(ConnectivityState::Online);

        let mut edited = local.clone();
        edited.rating = 9.0;
        let updated = catalog.update_movie(edited).await.unwrap();
        assert_eq!(updated.id, local.id);
        assert!(provider.calls().is_empty());

        catalog.sync_pending_operations().await.unwrap();
        let remote = provider.movies();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].rating, 9.0);
        assert_eq!(catalog.mirror_snapshot().await, remote);

        // Once synced, the record is edited remotely again.
        let mut again = remote[0].clone();
        again.rating = 7.0;
        catalog.update_movie(again).await.unwrap();
        assert_eq!(provider.movies()[0].rating, 7.0);
        assert_eq!(catalog.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_unqueued_change_is_rolled_back() {
        let provider = MemoryProvider::new();
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog_on(&provider, &store).await;
        catalog.monitor().set_status(ConnectivityState::Offline);

        store.fail_writes(PENDING_SLOT, true).await;
        assert!(catalog.add_movie(dune()).await.is_err());
        assert!(catalog.mirror_snapshot().await.is_empty());
        assert_eq!(catalog.pending_count().await, 0);

        let reopened = catalog_on(&provider, &store).await;
        assert!(reopened.mirror_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_clear_keeps_log_in_step_with_disk() {
        let provider = MemoryProvider::new();
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog_on(&provider, &store).await;

        catalog.monitor().set_status(ConnectivityState::Offline);
        catalog.delete_movie(&MovieId::new("x").unwrap()).await.unwrap();
        catalog.monitor().set_status(ConnectivityState::Online);

        store.fail_writes(PENDING_SLOT, true).await;
        assert!(catalog.sync_pending_operations().await.is_err());
        assert_eq!(catalog.pending_count().await, 1);

        let reopened = catalog_on(&provider, &store).await;
        assert_eq!(reopened.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_successful_write_reports_online() {
        let provider = MemoryProvider::new();
        let catalog = catalog(&provider).await;
        let mut changes = catalog.monitor().subscribe();

        catalog.add_movie(dune()).await.unwrap();
        assert_eq!(changes.try_recv().unwrap().status, ConnectivityState::Online);
    }

    #[tokio::test]
    async fn test_paged_listing() {
        let movies: Vec<Movie> = (1..=12)
            .map(|i| {
                Movie::new(format!("Movie {:02}", i), vec!["Drama".to_string()], "2000-01-01", 6.0, "")
            })
            .collect();
        let provider = MemoryProvider::with_movies(movies);
        let catalog = catalog(&provider).await;

        let query = MovieQuery {
            sort: Some(SortField::Name),
            page: Some(PageWindow::new(2, 5).unwrap()),
            ..Default::default()
        };
        let online: Vec<_> = catalog
            .list_movies(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(online, vec!["Movie 06", "Movie 07", "Movie 08", "Movie 09", "Movie 10"]);
        assert_eq!(catalog.mirror_snapshot().await.len(), 12);

        catalog.monitor().set_status(ConnectivityState::Offline);
        let offline: Vec<_> = catalog
            .list_movies(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(offline, online);
    }

    /// One user action performed while offline.
    #[derive(Debug, Clone)]
    enum OfflineWrite {
        Add(u8),
        Update { target: usize, rating: u8 },
        Delete { target: usize },
    }

    fn offline_write() -> impl Strategy<Value = OfflineWrite> {
        prop_oneof![
            (1u8..=10).prop_map(OfflineWrite::Add),
            (0usize..8, 1u8..=10).prop_map(|(target, rating)| OfflineWrite::Update { target, rating }),
            (0usize..8).prop_map(|target| OfflineWrite::Delete { target }),
        ]
    }

    fn sorted_by_id(mut movies: Vec<Movie>) -> Vec<Movie> {
        movies.sort_by(|a, b| a.id.cmp(&b.id));
        movies
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_offline_writes_converge_after_sync(writes in prop::collection::vec(offline_write(), 0..12)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let provider = MemoryProvider::with_movies(vec![dune(), heat()]);
                let catalog = catalog(&provider).await;
                catalog.get_all_movies().await.unwrap();
                catalog.monitor().set_status(ConnectivityState::Offline);

                // Last write per record, as the user saw it.
                let mut expected = catalog.mirror_snapshot().await;
                for write in writes {
                    match write {
                        OfflineWrite::Add(rating) => {
                            let movie = Movie::new(
                                format!("Movie {}", rating),
                                vec!["Drama".to_string()],
                                "2001-01-01",
                                f64::from(rating),
                                "",
                            );
                            expected.push(catalog.add_movie(movie).await.unwrap());
                        }
                        OfflineWrite::Update { target, rating } if !expected.is_empty() => {
                            let index = target % expected.len();
                            let mut movie = expected[index].clone();
                            movie.rating = f64::from(rating);
                            expected[index] = catalog.update_movie(movie).await.unwrap();
                        }
                        OfflineWrite::Delete { target } if !expected.is_empty() => {
                            let index = target % expected.len();
                            let removed = expected.remove(index);
                            catalog.delete_movie(removed.id.as_ref().unwrap()).await.unwrap();
                        }
                        _ => {}
                    }
                }
                assert_eq!(catalog.mirror_snapshot().await, expected);

                catalog.monitor().set_status(ConnectivityState::Online);
                let report = catalog.sync_pending_operations().await.unwrap();
                assert_eq!(report.failed, 0);
                assert_eq!(catalog.pending_count().await, 0);

                let mirror = catalog.mirror_snapshot().await;
                assert_eq!(mirror.len(), expected.len());
                assert_eq!(sorted_by_id(mirror), sorted_by_id(provider.movies()));
            });
        }
    }
}
