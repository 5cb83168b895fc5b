use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use super::models::{CreateScoreRequest, ScoreRecord, SuccessResponse, UpdateScoreRequest};
use super::repository::{RepositoryError, ScoreRepository};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No score record found for court_id {court_id}")]
    NotFound { court_id: u64 },

    /// Store failure; `message` is safe to show callers, `source` is not.
    #[error("{message}")]
    Repository {
        message: &'static str,
        #[source]
        source: RepositoryError,
    },
}

/// Stateless pass-through from validated requests to the score repository.
#[derive(Clone)]
pub struct ScoreService {
    repo: Arc<dyn ScoreRepository>,
}

impl ScoreService {
    pub fn new(repo: Arc<dyn ScoreRepository>) -> Self {
        ScoreService { repo }
    }

    pub async fn create_score(
        &self,
        req: CreateScoreRequest,
    ) -> Result<SuccessResponse<ScoreRecord>, ServiceError> {
        let record = req.into_record();
        info!(
            "Creating score for court {}: {}-{}",
            record.court_id, record.team_a_score, record.team_b_score
        );
        match self.repo.create(&record).await {
            Ok(stored) => Ok(SuccessResponse::new("Score created successfully", stored)),
            Err(e) => {
                error!("Failed to create score for court {}: {}", record.court_id, e);
                Err(ServiceError::Repository {
                    message: "Failed to create score",
                    source: e,
                })
            }
        }
    }

    pub async fn update_score(
        &self,
        req: UpdateScoreRequest,
    ) -> Result<SuccessResponse<ScoreRecord>, ServiceError> {
        let (court_id, fields) = req.into_parts();
        info!("Updating score for court {}: {:?}", court_id, fields);
        match self.repo.update_by_key(court_id, &fields).await {
            Ok(stored) => Ok(SuccessResponse::new("Score updated successfully", stored)),
            Err(RepositoryError::NotFound { court_id }) => {
                info!("Score update for unknown court {}", court_id);
                Err(ServiceError::NotFound { court_id })
            }
            Err(e) => {
                error!("Failed to update score for court {}: {}", court_id, e);
                Err(ServiceError::Repository {
                    message: "Failed to update score",
                    source: e,
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::score::models::ScoreUpdate;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory stand-in for the remote table.
    #[derive(Default)]
    pub(crate) struct MemoryRepository {
        rows: Mutex<HashMap<u64, ScoreRecord>>,
        pub calls: AtomicUsize,
        pub fail_with_status: Option<u16>,
    }

    impl MemoryRepository {
        pub fn failing(status: u16) -> Self {
            MemoryRepository {
                fail_with_status: Some(status),
                ..Default::default()
            }
        }

        pub fn with_row(record: ScoreRecord) -> Self {
            let repo = MemoryRepository::default();
            repo.rows.lock().unwrap().insert(record.court_id, record);
            repo
        }

        fn check_failure(&self) -> Result<(), RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with_status {
                Some(status) => Err(RepositoryError::Rejected {
                    status,
                    message: "duplicate key value violates unique constraint".into(),
                }),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ScoreRepository for MemoryRepository {
        async fn create(&self, record: &ScoreRecord) -> Result<ScoreRecord, RepositoryError> {
            self.check_failure()?;
            self.rows
                .lock()
                .unwrap()
                .insert(record.court_id, record.clone());
            Ok(record.clone())
        }

        async fn update_by_key(
            &self,
            court_id: u64,
            fields: &ScoreUpdate,
        ) -> Result<ScoreRecord, RepositoryError> {
            self.check_failure()?;
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .get_mut(&court_id)
                .ok_or(RepositoryError::NotFound { court_id })?;
            if let Some(a) = &fields.team_a_score {
                row.team_a_score = a.clone();
            }
            if let Some(b) = &fields.team_b_score {
                row.team_b_score = b.clone();
            }
            Ok(row.clone())
        }
    }

    fn record(court_id: u64, a: &str, b: &str) -> ScoreRecord {
        ScoreRecord {
            court_id,
            team_a_score: a.into(),
            team_b_score: b.into(),
        }
    }

    #[tokio::test]
    async fn test_create_score_echoes_stored_record() {
        let service = ScoreService::new(Arc::new(MemoryRepository::default()));
        let resp = service
            .create_score(CreateScoreRequest {
                court_id: 3,
                team_a_score: "21".into(),
                team_b_score: "18".into(),
            })
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.message, "Score created successfully");
        assert_eq!(resp.data, record(3, "21", "18"));
    }

    #[tokio::test]
    async fn test_update_score_patches_present_fields() {
        let service = ScoreService::new(Arc::new(MemoryRepository::with_row(record(3, "20", "18"))));
        let resp = service
            .update_score(UpdateScoreRequest {
                court_id: 3,
                team_a_score: None,
                team_b_score: Some("19".into()),
            })
            .await
            .unwrap();
        assert_eq!(resp.message, "Score updated successfully");
        assert_eq!(resp.data, record(3, "20", "19"));
    }

    #[tokio::test]
    async fn test_update_unknown_court_is_not_found() {
        let service = ScoreService::new(Arc::new(MemoryRepository::default()));
        let err = service
            .update_score(UpdateScoreRequest {
                court_id: 9,
                team_a_score: Some("1".into()),
                team_b_score: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { court_id: 9 }));
    }

    #[tokio::test]
    async fn test_repository_failure_hides_details() {
        let service = ScoreService::new(Arc::new(MemoryRepository::failing(409)));
        let err = service
            .create_score(CreateScoreRequest {
                court_id: 3,
                team_a_score: "21".into(),
                team_b_score: "18".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to create score");
        assert!(matches!(
            err,
            ServiceError::Repository {
                source: RepositoryError::Rejected { status: 409, .. },
                ..
            }
        ));
    }
}
