//! Schema Registry client and Avro encoder against a mock namespace.

use std::sync::Arc;

use azsdk::auth::StaticTokenCredential;
use azsdk::pipeline::{ClientOptions, RetryOptions};
use azsdk::schema_registry::{AvroEncoder, MessageContent, SchemaFormat, SchemaRegistryClient};
use serde::{Deserialize, Serialize};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_SCHEMA: &str = r#"{"namespace":"example.avro","type":"record","name":"User","fields":[{"name":"name","type":"string"},{"name":"favorite_number","type":"int"}]}"#;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
    favorite_number: i32,
}

fn client(server: &MockServer) -> SchemaRegistryClient {
    let options = ClientOptions {
        retry: RetryOptions {
            max_retries: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    SchemaRegistryClient::new(
        &server.uri(),
        Arc::new(StaticTokenCredential::new("sr-token")),
        &options,
    )
    .unwrap()
}

fn schema_headers(template: ResponseTemplate, version: &str) -> ResponseTemplate {
    template
        .insert_header("schema-id", "abc123")
        .insert_header("schema-group-name", "group")
        .insert_header("schema-name", "example.avro.User")
        .insert_header("schema-version", version)
        .insert_header("content-type", "application/json;serialization=Avro")
}

#[tokio::test]
async fn test_register_and_fetch_schema() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/$schemaGroups/group/schemas/example.avro.User"))
        .and(query_param("api-version", "2021-10"))
        .and(header("content-type", "application/json; serialization=Avro"))
        .and(header("authorization", "Bearer sr-token"))
        .and(body_string(USER_SCHEMA))
        .respond_with(schema_headers(ResponseTemplate::new(204), "1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/$schemaGroups/group/schemas/example.avro.User/versions/2"))
        .respond_with(schema_headers(
            ResponseTemplate::new(200).set_body_string(USER_SCHEMA),
            "2",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/$schemaGroups/$schemas/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string(
            r#"{"error":{"code":"ItemNotFound","message":"Schema id missing does not exist"}}"#,
        ))
        .mount(&server)
        .await;

    let client = client(&server);
    let properties = client
        .register_schema("group", "example.avro.User", USER_SCHEMA, &SchemaFormat::Avro)
        .await
        .unwrap();
    assert_eq!(properties.id, "abc123");
    assert_eq!(properties.version, 1);
    assert_eq!(properties.format, SchemaFormat::Avro);

    let schema = client
        .get_schema_by_version("group", "example.avro.User", 2)
        .await
        .unwrap();
    assert_eq!(schema.definition, USER_SCHEMA);
    assert_eq!(schema.properties.version, 2);

    let err = client.get_schema("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_avro_round_trip_caches_schema_lookups() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/$schemaGroups/group/schemas/example.avro.User"))
        .respond_with(schema_headers(ResponseTemplate::new(204), "1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/$schemaGroups/$schemas/abc123"))
        .respond_with(schema_headers(
            ResponseTemplate::new(200).set_body_string(USER_SCHEMA),
            "1",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let encoder = AvroEncoder::new(client(&server), Some("group".into()), true);
    let user = User {
        name: "Ben".into(),
        favorite_number: 7,
    };
    let first = encoder.encode(&user, USER_SCHEMA).await.unwrap();
    let second = encoder.encode(&user, USER_SCHEMA).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.content_type, "avro/binary+abc123");
    assert_eq!(&first.content[..], b"\x06Ben\x0e");

    for _ in 0..2 {
        let decoded: User = encoder.decode(&first, None).await.unwrap();
        assert_eq!(decoded, user);
    }

    let unknown = MessageContent {
        content: first.content.clone(),
        content_type: "avro/binary+missing".into(),
    };
    assert!(encoder.decode::<User, _>(&unknown, None).await.is_err());
}
