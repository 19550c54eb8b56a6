//! Route-level tests of the HTTP surface.

mod support;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use zipline::archiver::{Archiver, TaskStatus};
use zipline::http::{self, AppState};

use support::{new_archiver, urls, wait_for_status};

fn test_app(max_tasks: u32, max_objects: usize) -> (Router, Arc<Archiver>, TempDir) {
    let (archiver, _saver) = new_archiver(max_tasks, max_objects);
    let zip_dir = TempDir::new().unwrap();

    let state = AppState::new(
        Arc::clone(&archiver),
        &urls(&[".pdf", ".jpeg", ".txt"]),
        zip_dir.path().to_path_buf(),
    );

    (
        http::router(state, Duration::from_secs(5)),
        archiver,
        zip_dir,
    )
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_new_task_returns_id() {
    let (app, _archiver, _dir) = test_app(3, 3);

    let response = app.oneshot(get("/task/new")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(!json["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_new_task_admission_refused() {
    let (app, archiver, _dir) = test_app(1, 3);

    archiver.new_task().await.unwrap();

    let response = app.oneshot(get("/task/new")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = body_json(response).await;
    assert_eq!(json["error"], "Max tasks exceeded");
}

#[tokio::test]
async fn test_add_objects_accepts_valid_urls() {
    let (app, archiver, _dir) = test_app(3, 3);
    let id = archiver.new_task().await.unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/task/{id}/add"),
            json!({"urls": ["http://files.test/a.pdf", "http://files.test/b.jpeg"]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["added"], 2);
    assert_eq!(json["urls"][0]["url"], "http://files.test/a.pdf");
    assert!(json["urls"][0].get("error").is_none());
}

#[tokio::test]
async fn test_add_objects_annotates_rejected_urls() {
    let (app, archiver, _dir) = test_app(3, 3);
    let id = archiver.new_task().await.unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/task/{id}/add"),
            json!({"urls": [
                "http://files.test/a.pdf",
                "http://files.test/run.exe",
                "not a url",
            ]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["added"], 1);
    assert!(json["urls"][0].get("error").is_none());
    assert_eq!(json["urls"][1]["error"], "invalid extension");
    assert_eq!(json["urls"][2]["error"], "incorrect url");
}

#[tokio::test]
async fn test_add_objects_oversupply_annotated() {
    let (app, archiver, _dir) = test_app(3, 2);
    let id = archiver.new_task().await.unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/task/{id}/add"),
            json!({"urls": [
                "http://files.test/a.pdf",
                "http://files.test/b.pdf",
                "http://files.test/c.pdf",
            ]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["added"], 2);
    assert!(json["urls"][0].get("error").is_none());
    assert!(json["urls"][1].get("error").is_none());
    assert_eq!(json["urls"][2]["error"], "no more places available");
}

#[tokio::test]
async fn test_add_objects_empty_list() {
    let (app, archiver, _dir) = test_app(3, 3);
    let id = archiver.new_task().await.unwrap();

    let response = app
        .oneshot(post_json(&format!("/task/{id}/add"), json!({"urls": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "urls is empty");
}

#[tokio::test]
async fn test_add_objects_no_valid_urls() {
    let (app, archiver, _dir) = test_app(3, 3);
    let id = archiver.new_task().await.unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/task/{id}/add"),
            json!({"urls": ["nonsense", "http://files.test/run.exe"]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "no valid urls");
}

#[tokio::test]
async fn test_add_objects_rejects_bad_body() {
    let (app, archiver, _dir) = test_app(3, 3);
    let id = archiver.new_task().await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri(format!("/task/{id}/add"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "request body is not valid");
}

#[tokio::test]
async fn test_add_objects_unknown_task() {
    let (app, _archiver, _dir) = test_app(3, 3);

    let response = app
        .oneshot(post_json(
            "/task/bogus/add",
            json!({"urls": ["http://files.test/a.pdf"]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"], "Task not found");
}

#[tokio::test]
async fn test_status_of_fresh_task() {
    let (app, archiver, _dir) = test_app(3, 3);
    let id = archiver.new_task().await.unwrap();

    let response = app
        .oneshot(get(&format!("/task/{id}/status")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "Waiting for objects");
    assert_eq!(json["objects"].as_array().unwrap().len(), 0);
    assert!(json.get("zip").is_none());
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn test_status_of_completed_task() {
    let (app, archiver, _dir) = test_app(3, 2);
    let id = archiver.new_task().await.unwrap();

    archiver
        .add_objects(&id, &urls(&["http://files.test/a.pdf", "http://files.test/b.pdf"]))
        .await
        .unwrap();
    wait_for_status(&archiver, &id, TaskStatus::Done).await;

    let response = app
        .oneshot(get(&format!("/task/{id}/status")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "Done");
    assert_eq!(json["objects"].as_array().unwrap().len(), 2);
    assert!(json["zip"].as_str().unwrap().contains(".zip"));
}

#[tokio::test]
async fn test_status_unknown_task() {
    let (app, _archiver, _dir) = test_app(3, 3);

    let response = app.oneshot(get("/task/bogus/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stopped_service_returns_unavailable() {
    let (app, archiver, _dir) = test_app(3, 3);

    archiver.stop(Duration::from_secs(1)).await.unwrap();

    let response = app.clone().oneshot(get("/task/new")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Archiver service is stopped");

    let response = app.oneshot(get("/task/any/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_zip_download() {
    let (app, _archiver, dir) = test_app(3, 3);

    std::fs::write(dir.path().join("bundle.zip"), b"zip-bytes").unwrap();

    let response = app.oneshot(get("/zips/bundle.zip")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/zip"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"bundle.zip\""
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"zip-bytes");
}

#[tokio::test]
async fn test_zip_download_missing_file() {
    let (app, _archiver, _dir) = test_app(3, 3);

    let response = app.oneshot(get("/zips/absent.zip")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_zip_download_rejects_traversal() {
    let (app, _archiver, _dir) = test_app(3, 3);

    let response = app.oneshot(get("/zips/..%2Fsecret.zip")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
