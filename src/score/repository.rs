use async_trait::async_trait;
use thiserror::Error;

use super::models::{ScoreRecord, ScoreUpdate};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("no score record with court_id {court_id}")]
    NotFound { court_id: u64 },

    /// The store answered but refused the write (constraint violation, bad column, ...)
    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The store could not be reached or did not answer in time
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected store response: {0}")]
    Decode(String),

    #[error("store is not configured")]
    NotConfigured,
}

/// Remote table of court scores.
///
/// Each call is a single round trip; implementations never retry.
#[async_trait]
pub trait ScoreRepository: Send + Sync {
    /// Insert one row and return it as stored.
    async fn create(&self, record: &ScoreRecord) -> Result<ScoreRecord, RepositoryError>;

    /// Apply the present fields of `fields` to the row keyed by `court_id`.
    async fn update_by_key(
        &self,
        court_id: u64,
        fields: &ScoreUpdate,
    ) -> Result<ScoreRecord, RepositoryError>;
}

/// Repository used when no store credentials are configured; every call fails.
pub struct UnconfiguredRepository;

#[async_trait]
impl ScoreRepository for UnconfiguredRepository {
    async fn create(&self, _record: &ScoreRecord) -> Result<ScoreRecord, RepositoryError> {
        Err(RepositoryError::NotConfigured)
    }

    async fn update_by_key(
        &self,
        _court_id: u64,
        _fields: &ScoreUpdate,
    ) -> Result<ScoreRecord, RepositoryError> {
        Err(RepositoryError::NotConfigured)
    }
}
