use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;

use super::{ClientError, ProducerClient};
use crate::broker::{Broker, LogBroker};
use crate::publisher::Publisher;
use crate::transport::websocket::serve;

const WAIT: Duration = Duration::from_secs(2);

async fn start_producer() -> (LogBroker, String) {
    let broker = LogBroker::in_memory(2).unwrap();
    let publisher = Publisher::new(Arc::new(broker.clone()), "mensagens");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, publisher));
    (broker, format!("ws://{addr}"))
}

#[tokio::test]
async fn test_health() {
    let (_broker, url) = start_producer().await;
    let mut client = ProducerClient::connect(&url).await.unwrap();
    assert_eq!(client.health().await.unwrap(), "Producer");
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_publish_reaches_broker() {
    let (broker, url) = start_producer().await;
    let mut client = ProducerClient::connect(&url).await.unwrap();

    let id = client.publish("hello", "alice", Some("LOW")).await.unwrap();
    assert!(!id.is_empty());

    let mut sub = broker.subscribe("mensagens", "check").await.unwrap();
    let record = timeout(WAIT, sub.next()).await.unwrap().unwrap();
    assert_eq!(record.key, id);
}

#[tokio::test]
async fn test_blank_content_is_rejected() {
    let (_broker, url) = start_producer().await;
    let mut client = ProducerClient::connect(&url).await.unwrap();

    let err = client.publish("", "alice", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(_)));

    // The connection stays usable after a rejected request.
    assert_eq!(client.health().await.unwrap(), "Producer");
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = ProducerClient::connect(&format!("ws://{addr}")).await;
    assert!(matches!(result, Err(ClientError::WebSocket(_))));
}
