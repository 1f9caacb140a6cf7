//! In-memory movie provider for testing.

use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};

use moviesync_common::{Error, Movie, MovieId, MovieQuery, Result};

use crate::provider::{MovieProvider, ProbeOutcome};

/// How the in-memory service currently behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Requests are served normally.
    Available,
    /// Every request fails as if the host could not be reached.
    Unreachable,
    /// Every request is answered with this HTTP status.
    ServerError(u16),
}

/// A remote call as observed by the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    List,
    Get(MovieId),
    Create(Movie),
    Update(Movie),
    Delete(MovieId),
}

#[derive(Debug)]
struct Inner {
    movies: Vec<Movie>,
    availability: Availability,
    calls: Vec<RemoteCall>,
}

/// In-memory movie provider.
///
/// Useful for testing and development. Availability can be switched at
/// runtime, and every mutating call is journaled so replay order can be
/// checked.
#[derive(Clone)]
pub struct MemoryProvider {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryProvider {
    /// Create a new empty provider.
    pub fn new() -> Self {
        Self::with_movies(Vec::new())
    }

    /// Create a provider pre-populated with records.
    ///
    /// Records without an id are given one.
    pub fn with_movies(movies: Vec<Movie>) -> Self {
        let mut inner = Inner {
            movies: Vec::new(),
            availability: Availability::Available,
            calls: Vec::new(),
        };
        for movie in movies {
            let movie = match movie.id {
                Some(_) => movie,
                None => movie.with_id(MovieId::generate()),
            };
            inner.movies.push(movie);
        }

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Switch how subsequent requests behave.
    pub fn set_availability(&self, availability: Availability) {
        self.write().availability = availability;
    }

    /// Current contents of the service.
    pub fn movies(&self) -> Vec<Movie> {
        self.read().movies.clone()
    }

    /// Mutating calls received so far, in arrival order.
    pub fn mutations(&self) -> Vec<RemoteCall> {
        self.read()
            .calls
            .iter()
            .filter(|c| !matches!(c, RemoteCall::List | RemoteCall::Get(_)))
            .cloned()
            .collect()
    }

    /// All calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.read().calls.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and fail it if the service is not available.
    fn admit(&self, call: RemoteCall) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        let mut inner = self.write();
        let availability = inner.availability;
        match availability {
            Availability::Available => {
                inner.calls.push(call);
                Ok(inner)
            }
            Availability::Unreachable => {
                Err(Error::Network("Connection refused".to_string()))
            }
            Availability::ServerError(status) => Err(Error::Remote {
                status,
                message: "Service unavailable".to_string(),
            }),
        }
    }
}

impl Inner {
    fn position(&self, id: &MovieId) -> Option<usize> {
        self.movies.iter().position(|m| m.id.as_ref() == Some(id))
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MovieProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn probe(&self) -> ProbeOutcome {
        let availability = self.read().availability;
        match availability {
            Availability::Available => ProbeOutcome::Reachable,
            Availability::Unreachable => ProbeOutcome::Unreachable("Connection refused".to_string()),
            Availability::ServerError(status) => ProbeOutcome::HttpError(status),
        }
    }

    async fn list(&self, query: &MovieQuery) -> Result<Vec<Movie>> {
        let inner = self.admit(RemoteCall::List)?;
        Ok(query.apply(&inner.movies))
    }

    async fn get(&self, id: &MovieId) -> Result<Movie> {
        let inner = self.admit(RemoteCall::Get(id.clone()))?;
        inner
            .position(id)
            .map(|i| inner.movies[i].clone())
            .ok_or_else(|| Error::NotFound(format!("Movie not found: {}", id)))
    }

    async fn create(&self, movie: &Movie) -> Result<Movie> {
        let mut inner = self.admit(RemoteCall::Create(movie.clone()))?;
        movie.validate().map_err(|e| Error::Remote {
            status: 400,
            message: e.to_string(),
        })?;

        // The service assigns its own identifiers.
        let stored = movie.clone().with_id(MovieId::generate());
        inner.movies.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, movie: &Movie) -> Result<Movie> {
        let mut inner = self.admit(RemoteCall::Update(movie.clone()))?;
        let id = movie.id.clone().ok_or_else(|| Error::Remote {
            status: 400,
            message: "Movie ID is required for update".to_string(),
        })?;
        movie.validate().map_err(|e| Error::Remote {
            status: 400,
            message: e.to_string(),
        })?;

        let index = inner
            .position(&id)
            .ok_or_else(|| Error::NotFound(format!("Movie not found: {}", id)))?;
        inner.movies[index] = movie.clone();
        Ok(movie.clone())
    }

    async fn delete(&self, id: &MovieId) -> Result<()> {
        let mut inner = self.admit(RemoteCall::Delete(id.clone()))?;
        let index = inner
            .position(id)
            .ok_or_else(|| Error::NotFound(format!("Movie not found: {}", id)))?;
        inner.movies.remove(index);
        Ok(())
    }
}
