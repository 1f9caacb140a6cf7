//! Remote movie provider trait definition.

use async_trait::async_trait;

use moviesync_common::{Movie, MovieId, MovieQuery, Result};

/// Outcome of a lightweight reachability probe.
///
/// A probe never fails with an error value; every failure path resolves to
/// one of these outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The service answered with a success status.
    Reachable,
    /// The service answered, but with a non-success HTTP status.
    HttpError(u16),
    /// The host could not be reached at all.
    Unreachable(String),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }
}

/// Remote movie service.
///
/// Implementations must report transport failures as `Error::Network` and
/// non-success responses as `Error::Remote`, so callers can tell an
/// unavailable service apart from a rejected request.
#[async_trait]
pub trait MovieProvider: Send + Sync {
    /// Get the provider name (e.g., "http", "memory").
    fn name(&self) -> &str;

    /// Check whether the service is reachable.
    async fn probe(&self) -> ProbeOutcome;

    /// List movies matching a query.
    async fn list(&self, query: &MovieQuery) -> Result<Vec<Movie>>;

    /// Fetch a single movie.
    ///
    /// # Errors
    /// - Movie not found
    /// - Network errors
    async fn get(&self, id: &MovieId) -> Result<Movie>;

    /// Create a movie.
    ///
    /// # Postconditions
    /// - Returns the stored record, carrying the id assigned by the service
    async fn create(&self, movie: &Movie) -> Result<Movie>;

    /// Replace an existing movie.
    ///
    /// # Preconditions
    /// - `movie.id` is set
    async fn update(&self, movie: &Movie) -> Result<Movie>;

    /// Delete a movie by id.
    async fn delete(&self, id: &MovieId) -> Result<()>;
}
