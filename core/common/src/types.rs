//! Common types used throughout MovieSync.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Lowest accepted rating.
pub const MIN_RATING: f64 = 1.0;
/// Highest accepted rating.
pub const MAX_RATING: f64 = 10.0;

/// Identifier of a movie record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(String);

impl MovieId {
    /// Create a MovieId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("MovieId cannot be empty".to_string()));
        }
        Ok(Self(id))
    }

    /// Generate a fresh identifier for a record created locally.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MovieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A movie record as exchanged with the remote service.
///
/// The wire shape is `{id, name, genres[], releaseDate, rating, description}`.
/// `id` is absent on records that have not been created yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MovieId>,
    pub name: String,
    pub genres: Vec<String>,
    /// ISO calendar date, e.g. `2021-10-22`.
    pub release_date: String,
    pub rating: f64,
    #[serde(default)]
    pub description: String,
}

impl Movie {
    /// Create a movie without an identifier.
    pub fn new(
        name: impl Into<String>,
        genres: Vec<String>,
        release_date: impl Into<String>,
        rating: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            genres,
            release_date: release_date.into(),
            rating,
            description: description.into(),
        }
    }

    /// Return a copy carrying the given identifier.
    pub fn with_id(mut self, id: MovieId) -> Self {
        self.id = Some(id);
        self
    }

    /// Parsed release date.
    pub fn release_day(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.release_date, "%Y-%m-%d").ok()
    }

    /// Check the record against the catalog's schema.
    ///
    /// # Errors
    /// - Name is blank
    /// - No genre given, or a blank genre
    /// - Release date is not a `YYYY-MM-DD` calendar date
    /// - Rating outside 1..=10
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Name is required".to_string()));
        }
        if self.genres.is_empty() {
            return Err(Error::Validation(
                "At least one genre is required".to_string(),
            ));
        }
        if self.genres.iter().any(|g| g.trim().is_empty()) {
            return Err(Error::Validation("Genres cannot be blank".to_string()));
        }
        if self.release_day().is_none() {
            return Err(Error::Validation(format!(
                "Invalid date: {}",
                self.release_date
            )));
        }
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(Error::Validation(
                "Rating must be between 1 and 10".to_string(),
            ));
        }
        Ok(())
    }
}

/// Field a movie listing can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Name,
    ReleaseDate,
    Rating,
}

impl SortField {
    /// Name used in the `sort` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::ReleaseDate => "releaseDate",
            SortField::Rating => "rating",
        }
    }
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(SortField::Name),
            "releaseDate" | "release-date" | "release_date" => Ok(SortField::ReleaseDate),
            "rating" => Ok(SortField::Rating),
            other => Err(Error::InvalidInput(format!("Unknown sort field: {}", other))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(Error::InvalidInput(format!("Unknown sort order: {}", other))),
        }
    }
}

/// Movies per page when a listing is paged without an explicit size.
pub const DEFAULT_PER_PAGE: usize = 10;

/// One page of a listing, counted from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageWindow {
    pub page: usize,
    pub per_page: usize,
}

impl PageWindow {
    /// # Errors
    /// - `page` or `per_page` is zero
    pub fn new(page: usize, per_page: usize) -> Result<Self> {
        if page == 0 {
            return Err(Error::InvalidInput("Pages are numbered from 1".to_string()));
        }
        if per_page == 0 {
            return Err(Error::InvalidInput(
                "Page size must be at least 1".to_string(),
            ));
        }
        Ok(Self { page, per_page })
    }

    /// Number of pages needed for `total` records; at least one.
    pub fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.per_page).max(1)
    }

    /// Keep only the records on this page. Past the last page this is empty.
    pub fn slice(&self, movies: Vec<Movie>) -> Vec<Movie> {
        let start = (self.page - 1).saturating_mul(self.per_page);
        movies.into_iter().skip(start).take(self.per_page).collect()
    }
}

/// Filter, ordering and paging for a movie listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieQuery {
    /// Case-insensitive substring matched against name and description.
    pub filter: Option<String>,
    pub sort: Option<SortField>,
    pub order: SortOrder,
    /// Applied after filtering and sorting. The service has no paging of its
    /// own, so this never reaches the query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageWindow>,
}

impl MovieQuery {
    /// Query returning the whole collection in service order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether this query can return a subset of the collection.
    pub fn is_filtered(&self) -> bool {
        self.filter.as_deref().is_some_and(|f| !f.is_empty())
    }

    /// The same query over the whole result set.
    pub fn unpaged(&self) -> Self {
        Self {
            page: None,
            ..self.clone()
        }
    }

    /// Apply the page window, if any, to an already filtered and sorted
    /// listing.
    pub fn paginate(&self, movies: Vec<Movie>) -> Vec<Movie> {
        match self.page {
            Some(window) => window.slice(movies),
            None => movies,
        }
    }

    /// Query parameters for `GET /movies`.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.is_empty()) {
            pairs.push(("filter", filter.to_string()));
        }
        if let Some(sort) = self.sort {
            pairs.push(("sort", sort.as_str().to_string()));
            pairs.push(("order", self.order.as_str().to_string()));
        }
        pairs
    }

    /// Evaluate the query against an in-memory collection.
    pub fn apply(&self, movies: &[Movie]) -> Vec<Movie> {
        let needle = self
            .filter
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase);

        let mut result: Vec<Movie> = movies
            .iter()
            .filter(|m| match &needle {
                Some(n) => {
                    m.name.to_lowercase().contains(n) || m.description.to_lowercase().contains(n)
                }
                None => true,
            })
            .cloned()
            .collect();

        if let Some(sort) = self.sort {
            result.sort_by(|a, b| {
                let ord = compare_by(sort, a, b);
                match self.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        self.paginate(result)
    }
}

fn compare_by(field: SortField, a: &Movie, b: &Movie) -> Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::ReleaseDate => a.release_date.cmp(&b.release_date),
        SortField::Rating => a.rating.total_cmp(&b.rating),
    }
}
