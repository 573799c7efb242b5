//! reqwest implementation of the task services.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{ApiError, Envelope, InstructionRequest, TaskApi};
use crate::normalize::error_message;
use crate::task::{TaskId, TaskRecord};

/// HTTP client for the task-status and instruction endpoints.
///
/// - `GET  {base}/tasks/{id}`
/// - `POST {base}/tasks/{id}/instructions`
#[derive(Clone)]
pub struct HttpTaskApi {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpTaskApi {
    pub fn new(base_url: &Url, api_token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("taskwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut base_url = base_url.to_string();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn task_url(&self, task_id: &TaskId) -> String {
        format!("{}/tasks/{}", self.base_url, urlencoding::encode(task_id.as_str()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Send a request and decode the response envelope.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Envelope<T>, ApiError> {
        let response = match self.authorize(request).send().await {
            Ok(r) => r,
            Err(e) => {
                if e.is_timeout() {
                    return Err(ApiError::network_error(format!("Request timeout: {}", e)));
                } else if e.is_connect() {
                    return Err(ApiError::network_error(format!("Connection failed: {}", e)));
                } else {
                    return Err(ApiError::network_error(format!("Request failed: {}", e)));
                }
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ApiError::http(status.as_u16(), error_text(&body)));
        }

        serde_json::from_str(&body).map_err(|e| {
            ApiError::parse_error(format!("Failed to parse response: {}, body: {}", e, body))
        })
    }
}

/// Prefer the envelope's `error` field over the raw body.
fn error_text(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| error_message(v.get("error")?))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn task_status(&self, task_id: &TaskId) -> Result<TaskRecord, ApiError> {
        tracing::debug!("Fetching task status: {}", task_id);
        let envelope: Envelope<TaskRecord> =
            self.execute(self.client.get(self.task_url(task_id))).await?;
        envelope.into_data()
    }

    async fn submit_instruction(&self, request: &InstructionRequest) -> Result<(), ApiError> {
        let url = format!("{}/instructions", self.task_url(&request.task_id));
        tracing::debug!("Submitting instruction for task {}", request.task_id);
        let envelope: Envelope<Value> = self.execute(self.client.post(url).json(request)).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(ApiError::rejected(
                envelope
                    .error_message()
                    .unwrap_or_else(|| "instruction was not accepted".to_string()),
            ))
        }
    }
}
