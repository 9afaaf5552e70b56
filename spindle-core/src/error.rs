use spindle_common::model::{
    Id, ModelValidationError,
    post::{InvalidPostTextError, PostMarker},
    user::UserMarker,
};
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store is unreachable: {0}")]
    Unreachable(#[source] BoxError),
    #[error("{kind} with id {id} does not exist")]
    Missing { kind: &'static str, id: u64 },
    #[error("A stored record was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("{0}")]
    Backend(#[source] BoxError),
}

impl StoreError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }

    pub fn unreachable(err: impl Into<BoxError>) -> Self {
        Self::Unreachable(err.into())
    }
}

pub type Result<T, E = ThreadError> = std::result::Result<T, E>;

/// Errors surfaced by [`ThreadService`](crate::ThreadService). None of them
/// imply that earlier writes of the same operation were rolled back.
#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("Error connecting to the store: {0}")]
    Connection(#[source] StoreError),
    #[error("Error querying posts: {0}")]
    Query(#[source] StoreError),
    #[error("Error creating thread: {0}")]
    Create(#[source] StoreError),
    #[error("Error adding comment to thread: {0}")]
    Reply(#[source] StoreError),
    #[error("Error fetching thread: {0}")]
    Fetch(#[source] StoreError),
    #[error("Error repairing links: {0}")]
    Repair(#[source] StoreError),
    #[error("Post with id {0} was not found.")]
    NotFound(Id<PostMarker>),
    #[error("User with id {0} was not found.")]
    UserNotFound(Id<UserMarker>),
    #[error("Store call did not finish within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    InvalidText(#[from] InvalidPostTextError),
}
