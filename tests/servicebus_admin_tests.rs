//! Service Bus queue management against a mock ATOM endpoint.

use azsdk::auth::ServiceBusSasCredential;
use azsdk::pipeline::{ClientOptions, RetryOptions};
use azsdk::servicebus::admin::ServiceBusCredential;
use azsdk::servicebus::{QueueOptions, ServiceBusAdministrationClient};
use chrono::Duration as ChronoDuration;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ServiceBusAdministrationClient {
    let options = ClientOptions {
        retry: RetryOptions {
            max_retries: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    ServiceBusAdministrationClient::new(
        &server.uri(),
        ServiceBusCredential::Sas(ServiceBusSasCredential::new("RootManageSharedAccessKey", "c2VjcmV0")),
        &options,
    )
    .unwrap()
}

fn queue_entry(name: &str, message_count: u32) -> String {
    format!(
        r#"<entry xmlns="http://www.w3.org/2005/Atom">
  <id>https://myns.servicebus.windows.net/{name}</id>
  <title type="text">{name}</title>
  <content type="application/xml">
    <QueueDescription xmlns="http://schemas.microsoft.com/netservices/2010/10/servicebus/connect" xmlns:i="http://www.w3.org/2001/XMLSchema-instance">
      <LockDuration>PT30S</LockDuration>
      <MaxSizeInMegabytes>1024</MaxSizeInMegabytes>
      <RequiresDuplicateDetection>false</RequiresDuplicateDetection>
      <RequiresSession>false</RequiresSession>
      <DefaultMessageTimeToLive>P14D</DefaultMessageTimeToLive>
      <DeadLetteringOnMessageExpiration>false</DeadLetteringOnMessageExpiration>
      <DuplicateDetectionHistoryTimeWindow>PT10M</DuplicateDetectionHistoryTimeWindow>
      <MaxDeliveryCount>5</MaxDeliveryCount>
      <EnableBatchedOperations>true</EnableBatchedOperations>
      <SizeInBytes>0</SizeInBytes>
      <MessageCount>{message_count}</MessageCount>
      <Status>Active</Status>
      <CreatedAt>2022-05-01T10:00:00Z</CreatedAt>
      <CountDetails xmlns:d2p1="http://schemas.microsoft.com/netservices/2011/06/servicebus">
        <d2p1:ActiveMessageCount>{message_count}</d2p1:ActiveMessageCount>
        <d2p1:DeadLetterMessageCount>0</d2p1:DeadLetterMessageCount>
        <d2p1:ScheduledMessageCount>0</d2p1:ScheduledMessageCount>
        <d2p1:TransferMessageCount>0</d2p1:TransferMessageCount>
        <d2p1:TransferDeadLetterMessageCount>0</d2p1:TransferDeadLetterMessageCount>
      </CountDetails>
      <AutoDeleteOnIdle>P10675199DT2H48M5.4775807S</AutoDeleteOnIdle>
      <EnablePartitioning>false</EnablePartitioning>
      <EnableExpress>false</EnableExpress>
    </QueueDescription>
  </content>
</entry>"#
    )
}

fn feed(entries: &[String]) -> String {
    format!(
        r#"<feed xmlns="http://www.w3.org/2005/Atom"><title type="text">Queues</title>{}</feed>"#,
        entries.join("")
    )
}

fn atom(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/atom+xml;type=entry;charset=utf-8")
        .set_body_string(body)
}

#[tokio::test]
async fn test_create_queue_with_forwarding() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/orders"))
        .and(query_param("api-version", "2021-05"))
        .and(header_exists("authorization"))
        .and(header_exists("ServiceBusSupplementaryAuthorization"))
        .and(body_string_contains("<MaxDeliveryCount>5</MaxDeliveryCount>"))
        .and(body_string_contains("/archive</ForwardTo>"))
        .respond_with(ResponseTemplate::new(201).set_body_string(queue_entry("orders", 0)))
        .expect(1)
        .mount(&server)
        .await;

    let options = QueueOptions {
        max_delivery_count: Some(5),
        lock_duration: Some(ChronoDuration::seconds(30)),
        forward_to: Some("archive".into()),
        ..Default::default()
    };
    let queue = client(&server).create_queue("orders", options).await.unwrap();
    assert_eq!(queue.name, "orders");
    assert_eq!(queue.max_delivery_count, 5);
    assert_eq!(queue.lock_duration, ChronoDuration::seconds(30));
    assert_eq!(queue.default_message_time_to_live, ChronoDuration::days(14));
}

#[tokio::test]
async fn test_get_update_delete_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("enrich", "false"))
        .respond_with(atom(queue_entry("orders", 3)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(atom(feed(&[])))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/orders"))
        .and(header("if-match", "*"))
        .and(body_string_contains("<MaxDeliveryCount>9</MaxDeliveryCount>"))
        .respond_with(atom(queue_entry("orders", 3)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let runtime = client.get_queue_runtime_properties("orders").await.unwrap();
    assert_eq!(runtime.active_message_count, 3);
    assert_eq!(runtime.total_message_count, 3);

    let mut queue = client.get_queue("orders").await.unwrap();
    queue.max_delivery_count = 9;
    client.update_queue(&queue).await.unwrap();

    let err = client.get_queue("missing").await.unwrap_err();
    assert!(err.is_not_found());

    client.delete_queue("orders").await.unwrap();
}

#[tokio::test]
async fn test_list_queues_pages_by_skip() {
    let server = MockServer::start().await;
    let first: Vec<String> = (0..100).map(|i| queue_entry(&format!("q{:03}", i), 0)).collect();
    Mock::given(method("GET"))
        .and(path("/$Resources/queues"))
        .and(query_param("$skip", "0"))
        .and(query_param("$top", "100"))
        .respond_with(atom(feed(&first)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/$Resources/queues"))
        .and(query_param("$skip", "100"))
        .respond_with(atom(feed(&[queue_entry("q100", 0)])))
        .mount(&server)
        .await;

    let queues = client(&server).list_queues().collect_items().await.unwrap();
    assert_eq!(queues.len(), 101);
    assert_eq!(queues[0].name, "q000");
    assert_eq!(queues[100].name, "q100");
}
