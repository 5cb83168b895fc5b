use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::StoreSettings;
use crate::score::{RepositoryError, ScoreRecord, ScoreRepository, ScoreUpdate, SCORE_TABLE};

/// Client for a Supabase project's PostgREST endpoint (`/rest/v1`).
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct PostgrestClient {
    http: Client,
    rest_url: Url,
    api_key: String,
}

impl PostgrestClient {
    pub fn new(settings: &StoreSettings, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        let rest_url = settings
            .url
            .join("rest/v1/")
            .map_err(|e| anyhow::anyhow!("Invalid Supabase URL: {}", e))?;
        Ok(PostgrestClient {
            http,
            rest_url,
            api_key: settings.write_key().to_string(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, RepositoryError> {
        self.rest_url
            .join(table)
            .map_err(|e| RepositoryError::Decode(format!("bad table url: {}", e)))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "return=representation")
    }

    /// Send a request and decode the returned row array.
    async fn send_rows<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, RepositoryError> {
        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RepositoryError::Unavailable(format!("request timed out: {}", e))
            } else {
                RepositoryError::Unavailable(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(error_from_response(status, &body));
        }

        resp.json::<Vec<T>>()
            .await
            .map_err(|e| RepositoryError::Decode(e.to_string()))
    }
}

/// Map a non-2xx PostgREST response onto the repository taxonomy.
fn error_from_response(status: StatusCode, body: &str) -> RepositoryError {
    // PostgREST errors look like {"code":"23505","message":"duplicate key ...","details":...}
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    if status.is_server_error() {
        RepositoryError::Unavailable(format!("{}: {}", status, message))
    } else {
        RepositoryError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ScoreRepository for PostgrestClient {
    async fn create(&self, record: &ScoreRecord) -> Result<ScoreRecord, RepositoryError> {
        let url = self.table_url(SCORE_TABLE)?;
        debug!("POST {}", url);
        let rows: Vec<ScoreRecord> = self
            .send_rows(self.request(reqwest::Method::POST, url).json(record))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RepositoryError::Decode("insert returned no rows".into()))
    }

    async fn update_by_key(
        &self,
        court_id: u64,
        fields: &ScoreUpdate,
    ) -> Result<ScoreRecord, RepositoryError> {
        let mut url = self.table_url(SCORE_TABLE)?;
        url.query_pairs_mut()
            .append_pair("court_id", &format!("eq.{}", court_id));
        debug!("PATCH {}", url);
        let rows: Vec<ScoreRecord> = self
            .send_rows(self.request(reqwest::Method::PATCH, url).json(fields))
            .await?;
        rows.into_iter()
            .next()
            .ok_or(RepositoryError::NotFound { court_id })
    }
}
