use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::retry::{RetryPolicy, Sleeper, TokioSleeper, retry_with_backoff};
use crate::{BackgroundRemover, RemovalError, RemovalRequest};

pub const REMOVE_BG_URL: &str = "https://api.remove.bg/v1.0/removebg";

/// remove.bg API client with bounded retries.
pub struct RemoveBgClient {
    api_key: String,
    client: Client,
    base_url: String,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RemoveBgClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoveBgClient")
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Error body returned by remove.bg.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    title: String,
    #[serde(default)]
    detail: Option<String>,
}

impl RemoveBgClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, RemovalError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RemovalError::Config("REMOVE_BG_API_KEY is empty".into()));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            api_key,
            client,
            base_url: REMOVE_BG_URL.to_string(),
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Point the client at a custom endpoint (useful for testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Remove the background of one image.
    ///
    /// WebP input is transcoded to PNG first; that step is not retried.
    pub async fn remove_background(&self, request: RemovalRequest) -> Result<Bytes, RemovalError> {
        let RemovalRequest {
            bytes,
            filename,
            mime_type,
        } = request;

        let normalized = tokio::task::spawn_blocking(move || {
            imaging::normalize_for_removal(&bytes, &filename, &mime_type)
        })
        .await
        .map_err(|e| RemovalError::Task(e.to_string()))??;

        let image = Bytes::from(normalized.bytes);
        let filename = normalized.filename.as_str();
        let mime_type = normalized.mime_type.as_str();

        retry_with_backoff(&self.policy, self.sleeper.as_ref(), |attempt| {
            tracing::debug!("remove.bg attempt {} for {}", attempt + 1, filename);
            self.send_once(image.clone(), filename, mime_type)
        })
        .await
    }

    async fn send_once(
        &self,
        image: Bytes,
        filename: &str,
        mime_type: &str,
    ) -> Result<Bytes, RemovalError> {
        // The form is consumed by the request, so it is rebuilt per attempt.
        let part = Part::stream(image)
            .file_name(filename.to_string())
            .mime_str(mime_type)?;
        let form = Form::new().part("image_file", part).text("size", "auto");

        let response = self
            .client
            .post(&self.base_url)
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RemovalError::Status {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        Ok(response.bytes().await?)
    }
}

/// Readable message from an error response body.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body)
        && !parsed.errors.is_empty()
    {
        return parsed
            .errors
            .iter()
            .map(|e| match &e.detail {
                Some(detail) => format!("{}: {}", e.title, detail),
                None => e.title.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.to_string()
    } else {
        trimmed.to_string()
    }
}

impl BackgroundRemover for RemoveBgClient {
    fn remove_background(
        &self,
        request: RemovalRequest,
    ) -> BoxFuture<'_, Result<Bytes, RemovalError>> {
        RemoveBgClient::remove_background(self, request).boxed()
    }
}
