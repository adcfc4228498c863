//! HTTP/JSON surface over [`JobService`].
//!
//! ```text
//! POST /api/start    {theme}       -> 201 {pipelineId}
//! GET  /api/status?pipelineId=...  -> 200 {stages, isComplete, hasFailed}
//! POST /api/cancel   {pipelineId}  -> 204
//! GET  /api/stages                 -> 200 [StageDefinition]
//! GET  /health                     -> 200 {status: "ok"}
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::{StageDefinition, StatusReport};
use crate::registry::JobRegistry;
use crate::service::JobService;

/// Wraps [`PipelineError`] so handlers can return it directly.
#[derive(Debug)]
pub struct AppError(PipelineError);

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            PipelineError::InvalidArgument(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", msg.clone())
            }
            PipelineError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("pipeline {id} not found"),
            ),
            other => {
                tracing::error!(error = %other, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub theme: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub pipeline_id: String,
}

/// Body of `/api/cancel` and query of `/api/status`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRef {
    #[serde(default)]
    pub pipeline_id: String,
}

async fn start(
    State(service): State<JobService>,
    Json(req): Json<StartRequest>,
) -> AppResult<impl IntoResponse> {
    let pipeline_id = service.submit(&req.theme)?;
    Ok((StatusCode::CREATED, Json(StartResponse { pipeline_id })))
}

async fn status(
    State(service): State<JobService>,
    Query(query): Query<PipelineRef>,
) -> AppResult<Json<StatusReport>> {
    Ok(Json(service.status(&query.pipeline_id)?))
}

async fn cancel(
    State(service): State<JobService>,
    Json(req): Json<PipelineRef>,
) -> AppResult<StatusCode> {
    service.cancel(&req.pipeline_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stages(State(service): State<JobService>) -> Json<Vec<StageDefinition>> {
    Json(service.stages().to_vec())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Routes plus CORS and request tracing.
pub fn router(service: JobService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/start", post(start))
        .route("/api/status", get(status))
        .route("/api/cancel", post(cancel))
        .route("/api/stages", get(stages))
        .with_state(service)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Periodically drop settled jobs older than the registry's retention window.
///
/// Runs until `cancel` is triggered.
pub async fn run_retention_sweeper(
    registry: Arc<JobRegistry>,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = every.as_secs(), "Retention sweeper started");
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                let removed = registry.prune(Utc::now());
                if removed == 0 {
                    tracing::debug!("Retention sweep: nothing to prune");
                }
            }
        }
    }
}

/// Bind `config.bind_addr` and serve until `shutdown` fires.
pub async fn serve(
    config: &PipelineConfig,
    service: JobService,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let sweeper = service.registry().retention().max_age.map(|_| {
        tokio::spawn(run_retention_sweeper(
            Arc::clone(service.registry()),
            config.sweep_interval(),
            shutdown.clone(),
        ))
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Pipeline server listening");

    let token = shutdown.clone();
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    tracing::info!("Pipeline server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::pipeline::{StageStatus, TransitionRejected, catalog};
    use crate::registry::RetentionPolicy;
    use crate::runner::{StageRunner, StageTiming, ThreadRandom};

    fn test_service() -> JobService {
        let runner = StageRunner::new(
            StageTiming {
                base_duration: Duration::from_secs(60),
                duration_variance: Duration::ZERO,
                failure_probability: 0.0,
            },
            Arc::new(ThreadRandom),
        );
        JobService::new(Arc::new(JobRegistry::default()), Arc::new(runner))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_ok() {
        let (status, body) = send(router(test_service()), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn start_then_status() {
        let service = test_service();
        let (status, body) = send(
            router(service.clone()),
            post_json("/api/start", json!({ "theme": "space opera" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["pipelineId"].as_str().unwrap().to_string();

        let (status, body) = send(
            router(service),
            get_req(&format!("/api/status?pipelineId={id}")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isComplete"], false);
        assert_eq!(body["hasFailed"], false);
        let stages = body["stages"].as_array().unwrap();
        assert_eq!(stages.len(), 5);
        assert_eq!(stages[0]["title"], catalog()[0].title);
        assert!(stages[0]["inputs"].is_array());
    }

    #[tokio::test]
    async fn start_with_empty_theme_is_bad_request() {
        let (status, body) = send(
            router(test_service()),
            post_json("/api/start", json!({ "theme": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_ARGUMENT");

        let (status, _) = send(router(test_service()), post_json("/api/start", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_unknown_is_not_found() {
        let (status, body) = send(
            router(test_service()),
            get_req("/api/status?pipelineId=nope"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn status_without_id_is_bad_request() {
        let (status, _) = send(router(test_service()), get_req("/api/status")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancel_semantics() {
        let service = test_service();
        let id = service.submit("noir").unwrap();

        let (status, _) = send(
            router(service.clone()),
            post_json("/api/cancel", json!({ "pipelineId": id })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(service.registry().get(&id).unwrap().cancelled);

        let (status, _) = send(
            router(service.clone()),
            post_json("/api/cancel", json!({ "pipelineId": "unknown" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(router(service), post_json("/api/cancel", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejected_transition_maps_to_internal_error() {
        let err = AppError::from(PipelineError::Transition(TransitionRejected::Halted));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"], "An internal error occurred");
    }

    #[tokio::test]
    async fn stages_lists_catalog() {
        let (status, body) = send(router(test_service()), get_req("/api/stages")).await;
        assert_eq!(status, StatusCode::OK);
        let stages = body.as_array().unwrap();
        assert_eq!(stages.len(), 5);
        assert_eq!(stages[4]["subtitle"], "Checking Our Work");
        assert!(stages[0].get("status").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_prunes_and_stops_on_cancel() {
        let registry = Arc::new(JobRegistry::new(
            catalog().to_vec(),
            RetentionPolicy {
                max_age: Some(Duration::ZERO),
            },
        ));
        let id = registry.create("old");
        registry.mark_cancelled(&id);
        let keep = registry.create("running");
        registry
            .update(&keep, |job| job.advance(0, StageStatus::Running))
            .unwrap()
            .unwrap();

        // `updated_at` is wall-clock time; let it age past the zero window.
        std::thread::sleep(std::time::Duration::from_millis(5));

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_retention_sweeper(
            Arc::clone(&registry),
            Duration::from_secs(1),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(2)).await;

        token.cancel();
        handle.await.unwrap();
        assert!(!registry.contains(&id));
        assert!(registry.contains(&keep));
    }
}
