use serde::{Deserialize, Serialize};

use super::validation::{FieldKind, FieldRule, Schema};

/// Name of the remote table holding one row per court.
pub const SCORE_TABLE: &str = "score_board";

pub const AT_LEAST_ONE_SCORE: &str =
    "At least one score (team_A_score or team_B_score) must be provided";

/// A row of the `score_board` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Court number, unique key of the table
    pub court_id: u64,
    #[serde(rename = "team_A_score")]
    pub team_a_score: String,
    #[serde(rename = "team_B_score")]
    pub team_b_score: String,
}

/// Body of `POST /score`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateScoreRequest {
    pub court_id: u64,
    #[serde(rename = "team_A_score")]
    pub team_a_score: String,
    #[serde(rename = "team_B_score")]
    pub team_b_score: String,
}

impl CreateScoreRequest {
    pub const SCHEMA: Schema = Schema {
        fields: &[
            FieldRule::required("court_id", FieldKind::PositiveInt),
            FieldRule::required("team_A_score", FieldKind::String),
            FieldRule::required("team_B_score", FieldKind::String),
        ],
        at_least_one_of: None,
    };

    pub fn into_record(self) -> ScoreRecord {
        ScoreRecord {
            court_id: self.court_id,
            team_a_score: self.team_a_score,
            team_b_score: self.team_b_score,
        }
    }
}

/// Body of `PUT /score`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateScoreRequest {
    pub court_id: u64,
    #[serde(rename = "team_A_score", default)]
    pub team_a_score: Option<String>,
    #[serde(rename = "team_B_score", default)]
    pub team_b_score: Option<String>,
}

impl UpdateScoreRequest {
    pub const SCHEMA: Schema = Schema {
        fields: &[
            FieldRule::required("court_id", FieldKind::PositiveInt),
            FieldRule::optional("team_A_score", FieldKind::String),
            FieldRule::optional("team_B_score", FieldKind::String),
        ],
        at_least_one_of: Some((&["team_A_score", "team_B_score"], AT_LEAST_ONE_SCORE)),
    };

    /// Split into the row key and the fields to patch.
    pub fn into_parts(self) -> (u64, ScoreUpdate) {
        (
            self.court_id,
            ScoreUpdate {
                team_a_score: self.team_a_score,
                team_b_score: self.team_b_score,
            },
        )
    }
}

/// Partial column set applied by an update; absent fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreUpdate {
    #[serde(rename = "team_A_score", skip_serializing_if = "Option::is_none")]
    pub team_a_score: Option<String>,
    #[serde(rename = "team_B_score", skip_serializing_if = "Option::is_none")]
    pub team_b_score: Option<String>,
}

/// Row snapshot delivered by realtime change notifications.
///
/// Delete notifications only carry the primary key unless the table uses
/// `REPLICA IDENTITY FULL`, so the score columns are optional here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub court_id: u64,
    #[serde(rename = "team_A_score", default)]
    pub team_a_score: Option<String>,
    #[serde(rename = "team_B_score", default)]
    pub team_b_score: Option<String>,
}

/// Envelope returned by successful score writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        SuccessResponse {
            success: true,
            message: message.into(),
            data,
        }
    }
}
