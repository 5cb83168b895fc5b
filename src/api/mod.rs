use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub mod error;

use crate::score::{validate, CreateScoreRequest, ScoreService, UpdateScoreRequest};
use error::ApiResult;

#[derive(Clone)]
pub struct AppState {
    pub scores: ScoreService,
}

/// Build the Axum router for the score API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/score", post(create_score_handler).put(update_score_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// POST /score
async fn create_score_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(payload) = body?;
    let req: CreateScoreRequest = validate(&CreateScoreRequest::SCHEMA, &payload)?;
    let resp = state.scores.create_score(req).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// PUT /score
async fn update_score_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(payload) = body?;
    let req: UpdateScoreRequest = validate(&UpdateScoreRequest::SCHEMA, &payload)?;
    let resp = state.scores.update_score(req).await?;
    Ok((StatusCode::OK, Json(resp)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::service::tests::MemoryRepository;
    use crate::score::{ScoreRecord, ScoreRepository};
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    fn app(repo: Arc<MemoryRepository>) -> Router {
        let repo: Arc<dyn ScoreRepository> = repo;
        router(AppState {
            scores: ScoreService::new(repo),
        })
    }

    async fn send(router: &Router, method: Method, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri("/score")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_create_score_returns_201_with_stored_row() {
        let router = app(Arc::new(MemoryRepository::default()));
        let (status, body) = send(
            &router,
            Method::POST,
            r#"{"court_id": 3, "team_A_score": "21", "team_B_score": "18"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            body,
            json!({
                "success": true,
                "message": "Score created successfully",
                "data": {"court_id": 3, "team_A_score": "21", "team_B_score": "18"}
            })
        );
    }

    #[tokio::test]
    async fn test_update_without_scores_is_400_and_skips_repository() {
        let repo = Arc::new(MemoryRepository::default());
        let router = app(Arc::clone(&repo));
        let (status, body) = send(&router, Method::PUT, r#"{"court_id": 3}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(
            body["details"][0]["message"],
            "At least one score (team_A_score or team_B_score) must be provided"
        );
        assert_eq!(body["details"][0]["field"], Value::Null);
        assert_eq!(repo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_missing_field_names_it() {
        let router = app(Arc::new(MemoryRepository::default()));
        let (status, body) = send(&router, Method::POST, r#"{"court_id": 3, "team_A_score": "21"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0], json!({"field": "team_B_score", "message": "Required"}));
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_failure() {
        let router = app(Arc::new(MemoryRepository::default()));
        let (status, body) = send(&router, Method::POST, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation failed");
    }

    #[tokio::test]
    async fn test_update_existing_court() {
        let repo = Arc::new(MemoryRepository::with_row(ScoreRecord {
            court_id: 3,
            team_a_score: "20".into(),
            team_b_score: "18".into(),
        }));
        let router = app(repo);
        let (status, body) = send(&router, Method::PUT, r#"{"court_id": 3, "team_A_score": "21"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Score updated successfully");
        assert_eq!(body["data"]["team_A_score"], "21");
        assert_eq!(body["data"]["team_B_score"], "18");
    }

    #[tokio::test]
    async fn test_update_unknown_court_is_404() {
        let router = app(Arc::new(MemoryRepository::default()));
        let (status, body) = send(&router, Method::PUT, r#"{"court_id": 8, "team_B_score": "2"}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "No score record found for court_id 8");
    }

    #[tokio::test]
    async fn test_repository_failure_is_500_with_generic_message() {
        let router = app(Arc::new(MemoryRepository::failing(409)));
        let (status, body) = send(
            &router,
            Method::POST,
            r#"{"court_id": 3, "team_A_score": "21", "team_B_score": "18"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"success": false, "message": "Failed to create score"})
        );
    }
}
