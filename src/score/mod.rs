pub mod models;
pub mod repository;
pub mod service;
pub mod validation;

pub use models::{
    CreateScoreRequest, ScoreRecord, ScoreSnapshot, ScoreUpdate, UpdateScoreRequest, SCORE_TABLE,
};
pub use repository::{RepositoryError, ScoreRepository, UnconfiguredRepository};
pub use service::{ScoreService, ServiceError};
pub use validation::{validate, ValidationError, ValidationErrors};
