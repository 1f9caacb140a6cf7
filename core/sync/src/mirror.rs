//! Local mirror of the last known movie collection.

use std::sync::Arc;
use tracing::warn;

use moviesync_common::{Movie, MovieId, MovieQuery, Result};
use moviesync_storage::{LocalStore, MIRROR_SLOT};

/// Full copy of the collection, used as the read fallback while the service
/// is unreachable.
///
/// Overwritten wholesale after a successful fetch, mutated in place by
/// local writes. Every change is written to the `movies` slot before the
/// call returns.
pub struct LocalMirror {
    movies: Vec<Movie>,
    store: Arc<dyn LocalStore>,
}

impl LocalMirror {
    /// Open the mirror, loading whatever was persisted.
    ///
    /// An unreadable slot is treated as an empty collection.
    pub async fn open(store: Arc<dyn LocalStore>) -> Result<Self> {
        let movies = match store.read_slot(MIRROR_SLOT).await? {
            Some(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Discarding unreadable local mirror: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        Ok(Self { movies, store })
    }

    pub fn movies(&self) -> &[Movie] {
        &self.movies
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    pub fn find(&self, id: &MovieId) -> Option<&Movie> {
        self.movies.iter().find(|m| m.id.as_ref() == Some(id))
    }

    /// Evaluate a listing query against the mirror.
    pub fn query(&self, query: &MovieQuery) -> Vec<Movie> {
        query.apply(&self.movies)
    }

    /// Replace the whole collection.
    pub async fn replace_all(&mut self, movies: Vec<Movie>) -> Result<()> {
        self.commit(movies).await
    }

    pub async fn append(&mut self, movie: Movie) -> Result<()> {
        let mut movies = self.movies.clone();
        movies.push(movie);
        self.commit(movies).await
    }

    /// Replace the record with the same id, or append it if absent.
    pub async fn upsert(&mut self, movie: Movie) -> Result<()> {
        let mut movies = self.movies.clone();
        match movie.id.as_ref().and_then(|id| self.position(id)) {
            Some(index) => movies[index] = movie,
            None => movies.push(movie),
        }
        self.commit(movies).await
    }

    /// Remove a record. Returns whether it was present.
    pub async fn remove(&mut self, id: &MovieId) -> Result<bool> {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };
        let mut movies = self.movies.clone();
        movies.remove(index);
        self.commit(movies).await?;
        Ok(true)
    }

    /// Give a record a new id, keeping its contents. Returns whether it was
    /// present.
    pub async fn rekey(&mut self, from: &MovieId, to: &MovieId) -> Result<bool> {
        let Some(index) = self.position(from) else {
            return Ok(false);
        };
        let mut movies = self.movies.clone();
        movies[index].id = Some(to.clone());
        self.commit(movies).await?;
        Ok(true)
    }

    fn position(&self, id: &MovieId) -> Option<usize> {
        self.movies.iter().position(|m| m.id.as_ref() == Some(id))
    }

    /// Persist `movies`, then adopt them. A failed write leaves the mirror
    /// as it was.
    async fn commit(&mut self, movies: Vec<Movie>) -> Result<()> {
        let json = serde_json::to_string(&movies)?;
        self.store.write_slot(MIRROR_SLOT, &json).await?;
        self.movies = movies;
        Ok(())
    }
}
