//! End-to-end HTTP tests against the router, without a socket.

mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use common::{Harness, harness};
use file_store::{BackendKind, handlers::AppState};
use serde_json::Value;
use tower::util::ServiceExt;

const BOUNDARY: &str = "file-store-test-boundary";

fn app(h: &Harness) -> Router {
    file_store::app(AppState::new(h.files.clone(), &h.storage_dir))
}

fn multipart_body(filename: &str, content_type: &str, data: &[u8], tags: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(tags) = tags {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"tags\"\r\n\r\n{tags}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn upload(app: &Router, filename: &str, data: &[u8]) -> Value {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/files")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(filename, "text/plain", data, Some("a, b"))))
        .unwrap();
    let (status, _, body) = send(app, request).await;
    assert_eq!(status, StatusCode::CREATED, "{}", String::from_utf8_lossy(&body));
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn healthz_and_readyz_report_ok() {
    let h = harness(BackendKind::Filesystem).await;
    let app = app(&h);

    let (status, _, body) = send(&app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");

    let (status, _, body) = send(&app, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["checks"]["sqlite"]["ok"], true);
    assert_eq!(json["checks"]["disk"]["ok"], true);
}

#[tokio::test]
async fn upload_then_download_with_integrity_headers() {
    let h = harness(BackendKind::Filesystem).await;
    let app = app(&h);

    let receipt = upload(&app, "hello.txt", b"hello world!").await;
    assert_eq!(receipt["backend"], "filesystem");
    assert_eq!(receipt["record"]["tags"], serde_json::json!(["a", "b"]));
    let id = receipt["id"].as_str().unwrap().to_string();

    let (status, headers, body) = send(&app, get(&format!("/files/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"hello world!");
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(headers[header::CONTENT_LENGTH], "12");
    assert_eq!(
        headers[header::ETAG],
        "\"7509e5bda0c762d2bac7f90d758b5b2263fa01ccbc542ab5e3df163be08e6ca9\""
    );
    assert_eq!(
        headers["repr-digest"],
        "sha-256=:dQnlvaDHYtK6x/kNdYtbImP6Acy8VCq1498WO+CObKk=:"
    );
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "inline; filename=\"hello.txt\""
    );

    let head = Request::builder()
        .method(Method::HEAD)
        .uri(format!("/files/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, head).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(headers[header::CONTENT_LENGTH], "12");
}

#[tokio::test]
async fn missing_files_return_json_errors() {
    let h = harness(BackendKind::Filesystem).await;
    let app = app(&h);

    let (status, _, body) = send(
        &app,
        get("/files/00000000-0000-4000-8000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["reason"], "not_found");
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let h = harness(BackendKind::Filesystem).await;
    let app = app(&h);

    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"tags\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/files")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["reason"], "validation");
}

#[tokio::test]
async fn migrate_delete_and_admin_endpoints() {
    let h = harness(BackendKind::Filesystem).await;
    let app = app(&h);
    let receipt = upload(&app, "m.txt", b"migrate me").await;
    let id = receipt["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/files/{id}/migrate?target=database"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(report["migrated"], true);
    assert_eq!(report["to"], "database");

    let (_, _, body) = send(&app, get(&format!("/files/{id}/meta"))).await;
    let record: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(record["storage_kind"], "database");

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/admin/backend?backend=database")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let switched: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(switched["previous"], "filesystem");

    let (status, _, body) = send(&app, get("/admin/stats")).await;
    assert_eq!(status, StatusCode::OK);
    let stats: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["default_backend"], "database");
    assert_eq!(stats["records"]["database"], 1);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/admin/backup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({"backend": "database", "destination": "/tmp/unused"}).to_string(),
        ))
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/files/{id}?hard=true"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let deleted: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(deleted["freed_bytes"], 10);

    let (status, _, _) = send(&app, get(&format!("/files/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/admin/cleanup?backend=filesystem")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let cleanup: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(cleanup["reclaimed"], 0);
}
