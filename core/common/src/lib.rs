//! Common utilities and types shared across MovieSync modules.
//!
//! This module provides the movie record, listing queries and the error type
//! used by the storage, sync and CLI crates.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    Movie, MovieId, MovieQuery, PageWindow, SortField, SortOrder, DEFAULT_PER_PAGE, MAX_RATING,
    MIN_RATING,
};
