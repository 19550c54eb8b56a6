//! HTTP surface: task routes, ZIP download, CORS and request logging.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::archiver::Archiver;
use crate::error::ZiplineError;

#[derive(Clone)]
pub struct AppState {
    pub archiver: Arc<Archiver>,
    /// Allowed filename extensions, without the leading dot. `None`
    /// disables extension filtering.
    pub valid_extensions: Option<HashSet<String>>,
    pub zip_dir: PathBuf,
}

impl AppState {
    pub fn new(archiver: Arc<Archiver>, valid_extensions: &[String], zip_dir: PathBuf) -> Self {
        let valid_extensions = if valid_extensions.is_empty() {
            None
        } else {
            Some(
                valid_extensions
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_string())
                    .collect(),
            )
        };

        Self {
            archiver,
            valid_extensions,
            zip_dir,
        }
    }
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/task/new", get(new_task_handler))
        .route("/task/:id/add", post(add_objects_handler))
        .route("/task/:id/status", get(get_status_handler))
        .route("/zips/:filename", get(download_zip_handler))
        .layer(middleware::from_fn(log_request))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_body(msg: &str) -> Json<ErrorResponse> {
    Json(ErrorResponse {
        error: msg.to_string(),
    })
}

fn internal_error() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_body("Internal Server Error"),
    )
}

#[derive(Serialize)]
struct NewTaskResponse {
    id: String,
}

#[derive(Deserialize)]
struct AddObjectsRequest {
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Serialize)]
struct AddObjectsResponse {
    added: usize,
    urls: Vec<UrlReport>,
}

#[derive(Serialize)]
struct UrlReport {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    objects: Vec<ObjectReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct ObjectReport {
    src: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn new_task_handler(State(state): State<AppState>) -> Response {
    match state.archiver.new_task().await {
        Ok(id) => {
            tracing::info!(task_id = %id, "new task started");
            (StatusCode::OK, Json(NewTaskResponse { id })).into_response()
        }
        Err(ZiplineError::ServiceStopped) => (
            StatusCode::SERVICE_UNAVAILABLE,
            error_body("Archiver service is stopped"),
        )
            .into_response(),
        Err(ZiplineError::MaxTasksExceeded) => {
            tracing::warn!("maximum number of tasks exceeded");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                error_body("Max tasks exceeded"),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "new task failed");
            internal_error().into_response()
        }
    }
}

pub async fn add_objects_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<AddObjectsRequest>>,
) -> Response {
    let Some(Json(req)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            error_body("request body is not valid"),
        )
            .into_response();
    };

    if req.urls.is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("urls is empty")).into_response();
    }

    let mut reports = Vec::with_capacity(req.urls.len());
    let mut forward = Vec::with_capacity(req.urls.len());

    for url in &req.urls {
        match validate_url(url, state.valid_extensions.as_ref()) {
            Ok(()) => {
                reports.push(UrlReport {
                    url: url.clone(),
                    error: None,
                });
                forward.push(url.clone());
            }
            Err(reason) => reports.push(UrlReport {
                url: url.clone(),
                error: Some(reason),
            }),
        }
    }

    if forward.is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("no valid urls")).into_response();
    }

    let added = match state.archiver.add_objects(&id, &forward).await {
        Ok(added) => added,
        Err(ZiplineError::ServiceStopped) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                error_body("Archiver service is stopped"),
            )
                .into_response();
        }
        Err(ZiplineError::TaskNotFound) => {
            tracing::warn!(task_id = %id, "task not found");
            return (StatusCode::NOT_FOUND, error_body("Task not found")).into_response();
        }
        Err(ZiplineError::TaskInProgress) => {
            return (StatusCode::BAD_REQUEST, error_body("Task is in progress")).into_response();
        }
        Err(ZiplineError::TaskCompleted) => {
            return (StatusCode::BAD_REQUEST, error_body("Task is completed")).into_response();
        }
        Err(err) => {
            tracing::error!(task_id = %id, error = %err, "add objects failed");
            return internal_error().into_response();
        }
    };

    // The task ran out of slots partway through the list; annotate the
    // trailing entries that passed validation but were refused.
    if added < forward.len() {
        let mut accepted_seen = 0;
        for report in reports.iter_mut() {
            if report.error.is_none() {
                accepted_seen += 1;
                if accepted_seen > added {
                    report.error = Some("no more places available".to_string());
                }
            }
        }
    }

    tracing::info!(task_id = %id, added, "urls added to task");

    (
        StatusCode::OK,
        Json(AddObjectsResponse {
            added,
            urls: reports,
        }),
    )
        .into_response()
}

pub async fn get_status_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.archiver.get_status(&id).await {
        Ok(info) => {
            let objects = info
                .objects
                .iter()
                .map(|o| ObjectReport {
                    src: o.src.clone(),
                    error: o.err.as_ref().map(|e| e.to_string()),
                })
                .collect();

            (
                StatusCode::OK,
                Json(StatusResponse {
                    status: info.status.to_string(),
                    objects,
                    zip: info.zip,
                    error: info.err.map(|e| e.to_string()),
                }),
            )
                .into_response()
        }
        Err(ZiplineError::ServiceStopped) => (
            StatusCode::SERVICE_UNAVAILABLE,
            error_body("Archiver service is stopped"),
        )
            .into_response(),
        Err(ZiplineError::TaskNotFound) => {
            tracing::warn!(task_id = %id, "task not found");
            (StatusCode::NOT_FOUND, error_body("Task not found")).into_response()
        }
        Err(err) => {
            tracing::error!(task_id = %id, error = %err, "get status failed");
            internal_error().into_response()
        }
    }
}

pub async fn download_zip_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    // The path segment must stay inside the storage dir.
    if filename.contains(['/', '\\']) || filename.contains("..") {
        return (StatusCode::NOT_FOUND, error_body("File not found")).into_response();
    }

    match tokio::fs::read(state.zip_dir.join(&filename)).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, error_body("File not found")).into_response(),
    }
}

/// Tags every request with a fresh request ID and logs its outcome.
async fn log_request(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let span = tracing::info_span!("request", %request_id);
    let response = next.run(req).instrument(span).await;

    tracing::info!(
        %request_id,
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}

fn validate_url(raw: &str, valid: Option<&HashSet<String>>) -> std::result::Result<(), String> {
    let parsed = match Url::parse(raw) {
        Ok(parsed) => parsed,
        Err(_) => return Err("incorrect url".to_string()),
    };

    if !parsed.has_host() {
        return Err("incorrect url".to_string());
    }

    if let Some(valid) = valid {
        let ext = std::path::Path::new(parsed.path())
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        if !valid.contains(ext) {
            return Err("invalid extension".to_string());
        }
    }

    Ok(())
}
