//! In-memory movie store with optimistic concurrency.
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::{
    config::models::SeedMovie,
    core::{
        filters::{Metadata, MovieFilters},
        movie::{Movie, MovieId},
    },
    ports::{
        movie_store::MovieStore,
        store::{StoreError, StoreResult},
    },
};

pub struct InMemoryMovieStore {
    movies: DashMap<MovieId, Movie>,
    next_id: AtomicI64,
}

impl Default for InMemoryMovieStore {
    fn default() -> Self {
        Self {
            movies: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryMovieStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: &[SeedMovie]) -> Self {
        let store = Self::new();
        for movie in seed {
            store.store_new(Movie::new(
                &movie.title,
                movie.year,
                movie.runtime,
                movie.genres.clone(),
            ));
        }
        tracing::info!(movies = store.movies.len(), "Seeded movie store");
        store
    }

    fn store_new(&self, mut movie: Movie) -> Movie {
        movie.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        movie.created_at = Some(Utc::now());
        movie.version = 1;
        self.movies.insert(movie.id, movie.clone());
        movie
    }
}

#[async_trait]
impl MovieStore for InMemoryMovieStore {
    async fn insert(&self, movie: Movie) -> StoreResult<Movie> {
        Ok(self.store_new(movie))
    }

    async fn get(&self, id: MovieId) -> StoreResult<Movie> {
        self.movies
            .get(&id)
            .map(|m| m.clone())
            .ok_or(StoreError::RecordNotFound)
    }

    async fn update(&self, movie: Movie) -> StoreResult<Movie> {
        let mut stored = self
            .movies
            .get_mut(&movie.id)
            .ok_or(StoreError::RecordNotFound)?;
        if stored.version != movie.version {
            return Err(StoreError::EditConflict);
        }

        let mut updated = movie;
        updated.created_at = stored.created_at;
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: MovieId) -> StoreResult<()> {
        self.movies
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::RecordNotFound)
    }

    async fn list(&self, filters: &MovieFilters) -> StoreResult<(Vec<Movie>, Metadata)> {
        let mut movies: Vec<Movie> = self
            .movies
            .iter()
            .filter(|m| filters.matches(m.value()))
            .map(|m| m.value().clone())
            .collect();
        movies.sort_by(|a, b| filters.compare(a, b));

        let metadata = Metadata::calculate(movies.len(), filters.page, filters.page_size);
        let page = movies
            .into_iter()
            .skip(filters.offset())
            .take(filters.limit())
            .collect();
        Ok((page, metadata))
    }
}
