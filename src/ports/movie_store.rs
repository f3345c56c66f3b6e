use async_trait::async_trait;

use crate::{
    core::{
        filters::{Metadata, MovieFilters},
        movie::{Movie, MovieId},
    },
    ports::store::StoreResult,
};

/// MovieStore defines the port for the resource data layer
#[async_trait]
pub trait MovieStore: Send + Sync + 'static {
    /// Store a new movie, assigning its id, creation time and version 1
    async fn insert(&self, movie: Movie) -> StoreResult<Movie>;

    async fn get(&self, id: MovieId) -> StoreResult<Movie>;

    /// Replace a movie if its stored version equals `movie.version`.
    ///
    /// # Returns
    /// The stored movie with its version incremented, or
    /// `StoreError::EditConflict` when the versions differ
    async fn update(&self, movie: Movie) -> StoreResult<Movie>;

    async fn delete(&self, id: MovieId) -> StoreResult<()>;

    /// One page of the movies matching `filters`, in the requested order,
    /// with the pagination metadata for the whole match set
    async fn list(&self, filters: &MovieFilters) -> StoreResult<(Vec<Movie>, Metadata)>;
}
