//! Filtering, sorting and pagination for the movie listing.
use std::cmp::Ordering;

use serde::Serialize;

use crate::core::{
    movie::Movie,
    validator::{self, Validator},
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Accepted `sort` values. A leading `-` sorts descending.
pub const SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    Year,
    Runtime,
}

/// Listing criteria taken from the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieFilters {
    /// Every word must appear in the title, ignoring case. Empty matches all.
    pub title: String,
    /// Movies must carry all of these genres.
    pub genres: Vec<String>,
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
}

impl Default for MovieFilters {
    fn default() -> Self {
        Self {
            title: String::new(),
            genres: Vec::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: "id".to_string(),
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

impl MovieFilters {
    /// Column named by `sort`. Values outside the safelist are rejected by
    /// [`validate_filters`] and fall back to `id` here.
    pub fn sort_column(&self) -> SortColumn {
        match self.sort.trim_start_matches('-') {
            "title" => SortColumn::Title,
            "year" => SortColumn::Year,
            "runtime" => SortColumn::Runtime,
            _ => SortColumn::Id,
        }
    }

    pub fn sort_descending(&self) -> bool {
        self.sort.starts_with('-')
    }

    pub fn limit(&self) -> usize {
        usize::try_from(self.page_size).unwrap_or(0)
    }

    pub fn offset(&self) -> usize {
        usize::try_from((self.page - 1).saturating_mul(self.page_size)).unwrap_or(0)
    }

    pub fn matches(&self, movie: &Movie) -> bool {
        let title_words: Vec<String> = words(&movie.title).collect();
        words(&self.title).all(|word| title_words.contains(&word))
            && self.genres.iter().all(|genre| movie.genres.contains(genre))
    }

    /// Ordering for the listing; ties are broken by ascending id.
    pub fn compare(&self, a: &Movie, b: &Movie) -> Ordering {
        let ordering = match self.sort_column() {
            SortColumn::Id => a.id.cmp(&b.id),
            SortColumn::Title => a.title.cmp(&b.title),
            SortColumn::Year => a.year.cmp(&b.year),
            SortColumn::Runtime => a.runtime.cmp(&b.runtime),
        };
        let ordering = if self.sort_descending() {
            ordering.reverse()
        } else {
            ordering
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    }
}

pub fn validate_filters(v: &mut Validator, filters: &MovieFilters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(
        filters.page <= MAX_PAGE,
        "page",
        "must be a maximum of 10 million",
    );
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(
        filters.page_size <= MAX_PAGE_SIZE,
        "page_size",
        "must be a maximum of 100",
    );
    v.check(
        validator::permitted_value(&filters.sort.as_str(), SORT_SAFELIST),
        "sort",
        "invalid sort value",
    );
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Pagination summary returned next to a page of results. Empty when
/// nothing matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total_records: usize, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size <= 0 {
            return Self::default();
        }
        let total_records = i64::try_from(total_records).unwrap_or(i64::MAX);
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(id: i64, title: &str, year: i32, genres: &[&str]) -> Movie {
        let mut movie = Movie::new(
            title,
            year,
            100,
            genres.iter().map(|g| g.to_string()).collect(),
        );
        movie.id = id;
        movie
    }

    #[test]
    fn test_validation_messages() {
        let filters = MovieFilters {
            page: 0,
            page_size: 101,
            sort: "rating".to_string(),
            ..MovieFilters::default()
        };
        let mut v = Validator::new();
        validate_filters(&mut v, &filters);
        assert_eq!(v.errors()["page"], "must be greater than zero");
        assert_eq!(v.errors()["page_size"], "must be a maximum of 100");
        assert_eq!(v.errors()["sort"], "invalid sort value");

        let mut v = Validator::new();
        validate_filters(&mut v, &MovieFilters::default());
        assert!(v.valid());
    }

    #[test]
    fn test_title_and_genre_matching() {
        let filters = MovieFilters {
            title: "the CLUB".to_string(),
            genres: vec!["drama".to_string()],
            ..MovieFilters::default()
        };
        assert!(filters.matches(&movie(1, "The Breakfast Club", 1985, &["comedy", "drama"])));
        assert!(!filters.matches(&movie(2, "The Breakfast Club", 1985, &["comedy"])));
        assert!(!filters.matches(&movie(3, "Clubhouse", 1985, &["drama"])));
        assert!(MovieFilters::default().matches(&movie(4, "Anything", 2000, &[])));
    }

    #[test]
    fn test_descending_sort_breaks_ties_by_id() {
        let filters = MovieFilters {
            sort: "-year".to_string(),
            ..MovieFilters::default()
        };
        let mut movies = vec![
            movie(1, "a", 1990, &[]),
            movie(2, "b", 2000, &[]),
            movie(3, "c", 1990, &[]),
        ];
        movies.sort_by(|a, b| filters.compare(a, b));
        let ids: Vec<_> = movies.iter().map(|m| m.id).collect();
        assert_eq!(ids, [2, 1, 3]);
    }

    #[test]
    fn test_metadata() {
        let metadata = Metadata::calculate(45, 2, 20);
        assert_eq!(metadata.last_page, 3);
        assert_eq!(metadata.first_page, 1);
        assert_eq!(metadata.total_records, 45);

        let empty = serde_json::to_value(Metadata::calculate(0, 1, 20)).unwrap();
        assert_eq!(empty, serde_json::json!({}));
    }
}
