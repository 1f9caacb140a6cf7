//! Aggregate figures over a movie collection.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use moviesync_common::{Movie, MAX_RATING, MIN_RATING};

/// Summary of a collection, as shown by the charts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieStatistics {
    pub total: usize,
    /// `None` for an empty collection.
    pub average_rating: Option<f64>,
    /// A movie with several genres counts once for each.
    pub by_genre: BTreeMap<String, usize>,
    /// Records whose release date does not parse are left out.
    pub by_year: BTreeMap<i32, usize>,
    /// Count per rating rounded to the nearest whole point.
    pub rating_histogram: BTreeMap<u8, usize>,
}

impl MovieStatistics {
    pub fn from_movies(movies: &[Movie]) -> Self {
        let mut stats = Self {
            total: movies.len(),
            ..Default::default()
        };

        if movies.is_empty() {
            return stats;
        }

        let sum: f64 = movies.iter().map(|m| m.rating).sum();
        stats.average_rating = Some(sum / movies.len() as f64);

        for movie in movies {
            for genre in &movie.genres {
                *stats.by_genre.entry(genre.clone()).or_insert(0) += 1;
            }
            if let Some(day) = movie.release_day() {
                *stats.by_year.entry(day.year()).or_insert(0) += 1;
            }
            let bucket = movie.rating.round().clamp(MIN_RATING, MAX_RATING) as u8;
            *stats.rating_histogram.entry(bucket).or_insert(0) += 1;
        }

        stats
    }
}
