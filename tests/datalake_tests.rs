//! Data Lake path listing and management against a mock endpoint.

use std::collections::HashMap;

use azsdk::pipeline::{ClientOptions, RetryOptions};
use azsdk::storage::datalake::{CreatePathOptions, FileSystemClient, GetPathsOptions, PathKind};
use azsdk::storage::StorageCredential;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn file_system(server: &MockServer) -> FileSystemClient {
    let options = ClientOptions {
        retry: RetryOptions {
            max_retries: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    FileSystemClient::new(&server.uri(), "fs", StorageCredential::Anonymous, &options).unwrap()
}

#[tokio::test]
async fn test_get_paths_follows_continuation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fs"))
        .and(query_param("continuation", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paths": [{"name": "logs/b.txt", "contentLength": "3", "owner": "$superuser"}]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fs"))
        .and(query_param("resource", "filesystem"))
        .and(query_param("recursive", "false"))
        .and(query_param("directory", "logs"))
        .and(query_param("maxResults", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ms-continuation", "page2")
                .set_body_json(json!({
                    "paths": [
                        {"name": "logs/2026", "isDirectory": "true", "contentLength": "0"},
                        {"name": "logs/a.txt", "contentLength": 12, "permissions": "rw-r-----"}
                    ]
                })),
        )
        .mount(&server)
        .await;

    let options = GetPathsOptions {
        path: Some("/logs/".into()),
        recursive: false,
        results_per_page: Some(2),
        upn: None,
    };
    let paths = file_system(&server)
        .get_paths(options)
        .collect_items()
        .await
        .unwrap();
    let names: Vec<&str> = paths.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["logs/2026", "logs/a.txt", "logs/b.txt"]);
    assert!(paths[0].is_directory);
    assert_eq!(paths[1].content_length, 12);
    assert_eq!(paths[1].permissions.as_deref(), Some("rw-r-----"));
    assert_eq!(paths[2].owner.as_deref(), Some("$superuser"));
}

#[tokio::test]
async fn test_create_file_sends_encoded_properties() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/fs/logs/a.txt"))
        .and(query_param("resource", "file"))
        .and(header("x-ms-properties", "team=b3Bz"))
        .and(header("x-ms-permissions", "0640"))
        .and(header("if-none-match", "*"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let options = CreatePathOptions {
        metadata: HashMap::from([("team".to_string(), "ops".to_string())]),
        permissions: Some("0640".into()),
        overwrite: Some(false),
        ..Default::default()
    };
    let file = file_system(&server)
        .create_file("/logs/a.txt", &options)
        .await
        .unwrap();
    assert_eq!(file.path(), "logs/a.txt");
    assert_eq!(file.kind(), PathKind::File);
}

#[tokio::test]
async fn test_directory_delete_repeats_until_done() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/fs/logs"))
        .and(query_param("recursive", "true"))
        .and(query_param("continuation", "batch2"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/fs/logs"))
        .and(query_param("recursive", "true"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-ms-continuation", "batch2"))
        .expect(1)
        .mount(&server)
        .await;

    file_system(&server).delete_directory("logs").await.unwrap();
}

#[tokio::test]
async fn test_path_properties_from_headers() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/fs/logs"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ms-resource-type", "directory")
                .insert_header("x-ms-owner", "alice")
                .insert_header("x-ms-properties", "team=b3Bz"),
        )
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/fs/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fs = file_system(&server);
    let props = fs.get_directory_client("logs").get_properties().await.unwrap();
    assert!(props.is_directory);
    assert_eq!(props.owner.as_deref(), Some("alice"));
    assert_eq!(props.metadata.get("team").map(String::as_str), Some("ops"));
    assert!(!fs.get_directory_client("gone").exists().await.unwrap());
}
