use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use crate::error::PipelineError;
use crate::pipeline::StatusReport;
use crate::server::StartResponse;
use crate::service::JobService;

/// Erros que podem ocorrer ao falar com o serviço de pipelines.
///
/// Qualquer uma destas variantes, vinda de uma consulta de status, é tratada
/// pelo poller como falha do pipeline.
#[derive(Debug, Error)]
pub enum ClientError {
    /// O servidor respondeu com um status HTTP de erro (4xx/5xx).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Erro devolvido pelo motor quando usado no mesmo processo.
    #[error(transparent)]
    Engine(#[from] PipelineError),
}

/// The three operations a client can invoke on the pipeline service.
#[allow(async_fn_in_trait)]
pub trait PipelineApi {
    async fn start(&self, theme: &str) -> Result<String, ClientError>;
    async fn status(&self, pipeline_id: &str) -> Result<StatusReport, ClientError>;
    async fn cancel(&self, pipeline_id: &str) -> Result<(), ClientError>;
}

/// In-process access, used by the demo command.
impl PipelineApi for JobService {
    async fn start(&self, theme: &str) -> Result<String, ClientError> {
        Ok(self.submit(theme)?)
    }

    async fn status(&self, pipeline_id: &str) -> Result<StatusReport, ClientError> {
        Ok(JobService::status(self, pipeline_id)?)
    }

    async fn cancel(&self, pipeline_id: &str) -> Result<(), ClientError> {
        Ok(JobService::cancel(self, pipeline_id)?)
    }
}

/// HTTP client for a running pipeline server.
pub struct PipelineClient {
    client: Client,
    base_url: String,
}

impl PipelineClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(text);
        Err(ClientError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}

impl PipelineApi for PipelineClient {
    async fn start(&self, theme: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .post(self.url("/api/start"))
            .json(&serde_json::json!({ "theme": theme }))
            .send()
            .await?;
        let body = Self::check(response).await?.json::<StartResponse>().await?;
        Ok(body.pipeline_id)
    }

    async fn status(&self, pipeline_id: &str) -> Result<StatusReport, ClientError> {
        let response = self
            .client
            .get(self.url("/api/status"))
            .query(&[("pipelineId", pipeline_id)])
            .send()
            .await?;
        let report = Self::check(response).await?.json::<StatusReport>().await?;
        Ok(report)
    }

    async fn cancel(&self, pipeline_id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/api/cancel"))
            .json(&serde_json::json!({ "pipelineId": pipeline_id }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
