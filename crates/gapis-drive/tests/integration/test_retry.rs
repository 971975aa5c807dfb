//! Throttling and retry behavior of the client

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use gapis_drive::files;
use gapis_drive::rate_limit::Category;
use gapis_drive::DriveError;

use crate::common::{self, error_json, file_json, id};

fn ok_file() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(file_json("f1", "a.txt", "text/plain", None, Some(0), "p1"))
}

#[tokio::test]
async fn test_429_is_retried_and_throttles() {
    let server = wiremock::MockServer::start().await;
    let (client, limiter) = common::limited_client(&server, 3);
    let before = limiter.effective_capacity(Category::Metadata).unwrap();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(ok_file())
        .expect(1)
        .mount(&server)
        .await;

    let meta = files::get(&client, &id("f1")).await.unwrap();
    assert_eq!(meta.name.as_deref(), Some("a.txt"));
    assert_eq!(
        limiter.effective_capacity(Category::Metadata),
        Some(before / 2)
    );
}

#[tokio::test]
async fn test_403_rate_limit_reason_is_retried() {
    let server = wiremock::MockServer::start().await;
    let (client, _) = common::limited_client(&server, 3);

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("Retry-After", "0")
                .set_body_json(error_json(403, "userRateLimitExceeded", "User Rate Limit Exceeded")),
        )
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(ok_file())
        .expect(1)
        .mount(&server)
        .await;

    files::get(&client, &id("f1")).await.unwrap();
}

#[tokio::test]
async fn test_403_permission_is_not_retried() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(error_json(
            403,
            "insufficientFilePermissions",
            "The user does not have sufficient permissions for this file.",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let err = files::get(&client, &id("f1")).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DriveError>(),
        Some(DriveError::Forbidden(msg)) if msg.contains("sufficient permissions")
    ));
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = wiremock::MockServer::start().await;
    let (client, _) = common::limited_client(&server, 2);

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let err = files::get(&client, &id("f1")).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DriveError>(),
        Some(DriveError::ServerError(_))
    ));
}

#[tokio::test]
async fn test_throttling_exhausts_retries() {
    let server = wiremock::MockServer::start().await;
    let (client, _) = common::limited_client(&server, 1);

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(2)
        .mount(&server)
        .await;

    let err = files::get(&client, &id("f1")).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DriveError>(),
        Some(DriveError::RateLimited { retry_after }) if *retry_after == Duration::ZERO
    ));
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let (server, client) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(error_json(
            401,
            "authError",
            "Invalid Credentials",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let err = files::get(&client, &id("f1")).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DriveError>(),
        Some(DriveError::Unauthorized(msg)) if msg == "Invalid Credentials"
    ));
}

#[tokio::test]
async fn test_list_retries_mid_pagination() {
    let server = wiremock::MockServer::start().await;
    let (client, _) = common::limited_client(&server, 2);

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(wiremock::matchers::query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(500).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(wiremock::matchers::query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [file_json("f2", "b", "text/plain", None, Some(0), "root")]
        })))
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nextPageToken": "p2",
            "files": [file_json("f1", "a", "text/plain", None, Some(0), "root")]
        })))
        .mount(&server)
        .await;

    let all = files::list_children(&client, &id("root"), true).await.unwrap();
    assert_eq!(all.len(), 2);
}
