//! Creates, content updates and resumable sessions

use serde_json::json;
use wiremock::matchers::{body_bytes, body_json, body_string_contains, header, header_regex, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use gapis_core::ports::remote_store::IRemoteStore;
use gapis_drive::upload::{UploadSettings, CHUNK_GRANULARITY};

use crate::common::{self, file_json, folder_json, id};

const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

fn small_uploads() -> UploadSettings {
    UploadSettings {
        resumable_threshold: 1024 * 1024,
        chunk_size: CHUNK_GRANULARITY,
    }
}

// ============================================================================
// Single-request uploads
// ============================================================================

#[tokio::test]
async fn test_create_file_multipart() {
    let (server, _) = common::setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(header_regex("content-type", "^multipart/related; boundary=.+"))
        .and(body_string_contains(r#""name":"hello.txt""#))
        .and(body_string_contains(r#""parents":["p1"]"#))
        .and(body_string_contains("Content-Type: text/plain\r\n\r\nhello\r\n"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
            "f1",
            "hello.txt",
            "text/plain",
            Some(HELLO_MD5),
            Some(5),
            "p1",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let store = common::store(&server, small_uploads());
    let node = store
        .create_file(&id("p1"), "hello.txt", None, Some(b"hello"))
        .await
        .unwrap();

    assert_eq!(node.id().as_str(), "f1");
    assert_eq!(node.content_fingerprint().unwrap().as_str(), HELLO_MD5);
}

#[tokio::test]
async fn test_create_empty_file_is_metadata_only() {
    let (server, _) = common::setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .and(body_json(json!({
            "name": "empty.txt",
            "mimeType": "text/plain",
            "parents": ["p1"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
            "f2",
            "empty.txt",
            "text/plain",
            None,
            Some(0),
            "p1",
        )))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store = common::store(&server, small_uploads());
    let with_empty = store
        .create_file(&id("p1"), "empty.txt", None, Some(b""))
        .await
        .unwrap();
    assert_eq!(with_empty.size(), 0);
    assert!(with_empty.content_fingerprint().is_none());
}

#[tokio::test]
async fn test_create_folder() {
    let (server, _) = common::setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .and(body_json(json!({
            "name": "photos",
            "mimeType": "application/vnd.google-apps.folder",
            "parents": ["root"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(folder_json("d1", "photos", "root")))
        .expect(1)
        .mount(&server)
        .await;

    let store = common::store(&server, small_uploads());
    let folder = store.create_folder(&id("root"), "photos").await.unwrap();
    assert!(folder.is_directory());
}

#[tokio::test]
async fn test_update_content_media() {
    let (server, _) = common::setup_drive_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/f1"))
        .and(query_param("uploadType", "media"))
        .and(body_bytes(b"hello".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
            "f1",
            "a.txt",
            "text/plain",
            Some(HELLO_MD5),
            Some(5),
            "p1",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let store = common::store(&server, small_uploads());
    let node = store.update_content(&id("f1"), b"hello").await.unwrap();
    assert_eq!(node.size(), 5);
}

#[tokio::test]
async fn test_update_content_to_empty() {
    let (server, _) = common::setup_drive_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/f1"))
        .and(query_param("uploadType", "media"))
        .and(body_bytes(Vec::new()))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
            "f1",
            "a.txt",
            "text/plain",
            Some(EMPTY_MD5),
            Some(0),
            "p1",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let store = common::store(&server, small_uploads());
    let node = store.update_content(&id("f1"), b"").await.unwrap();
    assert_eq!(node.size(), 0);
}

// ============================================================================
// Resumable sessions
// ============================================================================

#[tokio::test]
async fn test_create_large_file_in_chunks() {
    let (server, _) = common::setup_drive_mock().await;
    let total = CHUNK_GRANULARITY + 10;
    let data = vec![b'x'; total];

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "resumable"))
        .and(header("X-Upload-Content-Length", total.to_string().as_str()))
        .and(body_json(json!({"name": "big.bin", "parents": ["p1"]})))
        .respond_with(
            // Relative locations are resolved against the base URL.
            ResponseTemplate::new(200).insert_header("Location", "/upload/session/s1"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload/session/s1"))
        .and(header(
            "Content-Range",
            format!("bytes 0-{}/{}", CHUNK_GRANULARITY - 1, total).as_str(),
        ))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-262143"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload/session/s1"))
        .and(header(
            "Content-Range",
            format!("bytes {}-{}/{}", CHUNK_GRANULARITY, total - 1, total).as_str(),
        ))
        .respond_with(ResponseTemplate::new(201).set_body_json(file_json(
            "big1",
            "big.bin",
            "application/octet-stream",
            None,
            Some(total as u64),
            "p1",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let store = common::store(
        &server,
        UploadSettings {
            resumable_threshold: 1024,
            chunk_size: CHUNK_GRANULARITY,
        },
    );
    let node = store
        .create_file(&id("p1"), "big.bin", None, Some(&data))
        .await
        .unwrap();

    assert_eq!(node.id().as_str(), "big1");
    assert_eq!(node.size(), total as u64);
}

#[tokio::test]
async fn test_update_large_file_uses_session() {
    let (server, _) = common::setup_drive_mock().await;
    let data = vec![b'y'; 2048];

    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/f7"))
        .and(query_param("uploadType", "resumable"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Location", format!("{}/upload/session/s7", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload/session/s7"))
        .and(header("Content-Range", "bytes 0-2047/2048"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
            "f7",
            "log.txt",
            "text/plain",
            None,
            Some(2048),
            "p1",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let store = common::store(
        &server,
        UploadSettings {
            resumable_threshold: 1024,
            chunk_size: CHUNK_GRANULARITY,
        },
    );
    let node = store.update_content(&id("f7"), &data).await.unwrap();
    assert_eq!(node.size(), 2048);
}

#[tokio::test]
async fn test_session_without_location_fails() {
    let (server, _) = common::setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "resumable"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = common::store(
        &server,
        UploadSettings {
            resumable_threshold: 1,
            chunk_size: CHUNK_GRANULARITY,
        },
    );
    let err = store
        .create_file(&id("p1"), "a.bin", None, Some(b"abc"))
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("Location"));
}
