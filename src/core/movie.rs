//! The resource served behind the gatekeeping chain.
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::core::validator::{self, Validator};

pub type MovieId = i64;

/// Earliest year a film can have been released.
pub const FIRST_FILM_YEAR: i32 = 1888;
pub const MAX_TITLE_BYTES: usize = 500;
pub const MAX_GENRES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    #[serde(skip)]
    pub created_at: Option<DateTime<Utc>>,
    pub title: String,
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub year: i32,
    /// Running time in minutes.
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub runtime: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    pub version: i32,
}

fn is_zero_i32(value: &i32) -> bool {
    *value == 0
}

impl Movie {
    pub fn new(title: impl Into<String>, year: i32, runtime: i32, genres: Vec<String>) -> Self {
        Self {
            id: 0,
            created_at: None,
            title: title.into(),
            year,
            runtime,
            genres,
            version: 0,
        }
    }
}

pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(
        movie.title.len() <= MAX_TITLE_BYTES,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(movie.year != 0, "year", "must be provided");
    v.check(
        movie.year >= FIRST_FILM_YEAR,
        "year",
        "must be greater than 1888",
    );
    v.check(
        movie.year <= Utc::now().year(),
        "year",
        "must not be in the future",
    );

    v.check(movie.runtime != 0, "runtime", "must be provided");
    v.check(movie.runtime > 0, "runtime", "must be a positive integer");

    v.check(!movie.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(
        movie.genres.len() <= MAX_GENRES,
        "genres",
        "must not contain more than 5 genres",
    );
    v.check(
        validator::unique(&movie.genres),
        "genres",
        "must not contain duplicate values",
    );
}
