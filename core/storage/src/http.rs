//! HTTP client for the hosted movie service.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use moviesync_common::{Error, Movie, MovieId, MovieQuery, Result};

use crate::provider::{MovieProvider, ProbeOutcome};

/// Collection endpoint, relative to the service base URL.
const MOVIES_PATH: &str = "movies";

/// Error body returned by the service on non-success responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: serde_json::Value,
}

/// Movie provider backed by the service's REST surface.
///
/// Consumes `GET /movies`, `POST /movies`, `PATCH /movies` and
/// `DELETE /movies?id=...`, all with JSON bodies.
pub struct HttpProvider {
    http: Client,
    movies_url: Url,
}

impl HttpProvider {
    /// Create a provider for the service rooted at `base_url`.
    ///
    /// # Errors
    /// - `base_url` is not an absolute URL
    /// - HTTP client could not be built
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid base URL {}: {}", base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let movies_url = base
            .join(MOVIES_PATH)
            .map_err(|e| Error::InvalidInput(format!("Invalid base URL {}: {}", base_url, e)))?;

        let http = Client::builder()
            .user_agent("MovieSync/0.1")
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, movies_url })
    }

    /// URL of the movie collection endpoint.
    pub fn movies_url(&self) -> &Url {
        &self.movies_url
    }

    /// Map a non-success response to an error, or pass a success through.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| match b.error {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .unwrap_or(body);

        if status == StatusCode::NOT_FOUND {
            Err(Error::NotFound(message))
        } else {
            Err(Error::Remote {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn handle_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl MovieProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn probe(&self) -> ProbeOutcome {
        match self.http.get(self.movies_url.clone()).send().await {
            Ok(response) if response.status().is_success() => ProbeOutcome::Reachable,
            Ok(response) => ProbeOutcome::HttpError(response.status().as_u16()),
            Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        }
    }

    async fn list(&self, query: &MovieQuery) -> Result<Vec<Movie>> {
        let response = self
            .http
            .get(self.movies_url.clone())
            .query(&query.to_query_pairs())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to fetch movies: {}", e)))?;

        let movies = Self::handle_json(response).await?;
        Ok(query.paginate(movies))
    }

    async fn get(&self, id: &MovieId) -> Result<Movie> {
        // The service has no per-record route; select from the listing.
        self.list(&MovieQuery::all())
            .await?
            .into_iter()
            .find(|m| m.id.as_ref() == Some(id))
            .ok_or_else(|| Error::NotFound(format!("Movie not found: {}", id)))
    }

    async fn create(&self, movie: &Movie) -> Result<Movie> {
        debug!("POST {} ({})", self.movies_url, movie.name);
        let response = self
            .http
            .post(self.movies_url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(movie)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to add movie: {}", e)))?;

        Self::handle_json(response).await
    }

    async fn update(&self, movie: &Movie) -> Result<Movie> {
        if movie.id.is_none() {
            return Err(Error::InvalidInput(
                "Movie ID is required for update".to_string(),
            ));
        }

        let response = self
            .http
            .patch(self.movies_url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(movie)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to update movie: {}", e)))?;

        Self::handle_json(response).await
    }

    async fn delete(&self, id: &MovieId) -> Result<()> {
        let response = self
            .http
            .delete(self.movies_url.clone())
            .query(&[("id", id.as_str())])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to delete movie: {}", e)))?;

        Self::check_status(response).await?;
        Ok(())
    }
}
