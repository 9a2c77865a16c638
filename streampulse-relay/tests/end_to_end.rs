//! Emitter → hub → network → relay, over both transports.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use streampulse_relay::{MetricsRelay, Relay, RelayError, StreamMessage, Subscription};
use streampulse_relay::transport::NetConnector;
use streampulse_sim::{server, Emitter, Hub, IngestWorker, MetricsSnapshot, Output};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn collect(relay: &Relay<StreamMessage>) -> (Arc<Mutex<Vec<StreamMessage>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = relay.subscribe(move |m| sink.lock().push(m.clone()));
    (seen, subscription)
}

/// Talks to loopback directly even when a proxy is configured.
fn local_connector() -> NetConnector {
    let client = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("http client");
    NetConnector::with_client(client)
}

fn metrics_count(seen: &Mutex<Vec<StreamMessage>>) -> usize {
    seen.lock().iter().filter(|m| m.kind() == "metrics").count()
}

#[tokio::test]
async fn relay_receives_emitter_over_ndjson() {
    let hub = Arc::new(Hub::new(64));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(server::serve_ndjson(hub.clone(), listener));

    let relay = Relay::<StreamMessage>::new();
    let (seen, _subscription) = collect(&relay);
    relay.connect(&format!("tcp://{}", addr));
    eventually(|| hub.active_connections() == 1).await;

    let emission = Emitter::builder()
        .output(Output::hub(hub.clone()))
        .interval(Duration::from_millis(20))
        .seed(42)
        .build()
        .start();

    eventually(|| metrics_count(&seen) >= 3).await;
    emission.stop();

    let seen = seen.lock();
    assert_eq!(seen[0].kind(), "connected");
    assert!(relay.last_error().is_none());
    server.abort();
}

#[tokio::test]
async fn relay_receives_emitter_over_sse() {
    let hub = Arc::new(Hub::new(64));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let worker = Arc::new(IngestWorker::new(hub.clone()));
    let server = tokio::spawn(server::serve_http(
        hub.clone(),
        worker,
        listener,
        server::HttpConfig::default(),
    ));

    let relay = Relay::<StreamMessage>::with_connector(local_connector());
    let (seen, _subscription) = collect(&relay);
    relay.connect(&format!("http://{}/events", addr));
    eventually(|| hub.active_connections() == 1).await;

    let mut emitter = Emitter::builder()
        .output(Output::hub(hub.clone()))
        .seed(7)
        .build();
    emitter.emit_now().await;
    emitter.emit_now().await;

    eventually(|| metrics_count(&seen) == 2).await;
    assert_eq!(seen.lock()[0].kind(), "connected");

    relay.disconnect();
    // The server notices the closed socket on its next write
    for ts in 0..400 {
        if hub.active_connections() == 0 {
            break;
        }
        hub.publish(MetricsSnapshot::with_timestamp(ts).into());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.active_connections(), 0);
    assert_eq!(metrics_count(&seen), 2);
    server.abort();
}

#[tokio::test]
async fn metrics_relay_reads_snapshots_from_ndjson_server() {
    let hub = Arc::new(Hub::new(64));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(server::serve_ndjson(hub.clone(), listener));

    let relay = MetricsRelay::new();
    let seen: Arc<Mutex<Vec<MetricsSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = relay.subscribe(move |s| sink.lock().push(s.clone()));
    relay.connect(&format!("tcp://{}", addr));
    eventually(|| hub.active_connections() == 1).await;

    hub.publish(
        MetricsSnapshot::builder()
            .timestamp(1000)
            .response_time(42.0)
            .build()
            .into(),
    );
    eventually(|| !seen.lock().is_empty()).await;

    // The greeting never shows up as a snapshot
    tokio::time::sleep(Duration::from_millis(50)).await;
    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].timestamp, 1000);
        assert_eq!(seen[0].response_time, 42.0);
    }
    assert_eq!(relay.messages_delivered(), 1);
    assert!(relay.last_error().is_none());
    server.abort();
}

#[tokio::test]
async fn raw_snapshots_with_malformed_line() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let relay = MetricsRelay::new();
    let seen: Arc<Mutex<Vec<MetricsSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = relay.subscribe(move |s| sink.lock().push(s.clone()));
    relay.connect(&addr.to_string());

    let (mut socket, _) = listener.accept().await.unwrap();
    socket
        .write_all(b"{\"timestamp\":1000,\"responseTime\":42}\nnot json\n\n{\"timestamp\":2000}\n")
        .await
        .unwrap();

    eventually(|| seen.lock().len() == 2).await;
    {
        let seen = seen.lock();
        assert_eq!(seen[0].timestamp, 1000);
        assert_eq!(seen[0].response_time, 42.0);
        assert_eq!(seen[1].timestamp, 2000);
    }
    assert!(matches!(relay.last_error(), Some(RelayError::Parse(_))));

    drop(socket);
    eventually(|| relay.last_error() == Some(RelayError::Closed)).await;
    assert!(relay.is_connected());
}

#[tokio::test]
async fn http_error_status_is_recorded() {
    let hub = Arc::new(Hub::new(8));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let worker = Arc::new(IngestWorker::new(hub.clone()));
    let server = tokio::spawn(server::serve_http(
        hub,
        worker,
        listener,
        server::HttpConfig::default(),
    ));

    let relay = MetricsRelay::with_connector(local_connector());
    relay.connect(&format!("http://{}/missing", addr));
    eventually(|| relay.last_error().is_some()).await;

    assert!(matches!(
        relay.last_error(),
        Some(RelayError::HttpStatus { status: 404, .. })
    ));
    server.abort();
}

#[tokio::test]
async fn ingested_outlier_reaches_relay_as_alert() {
    let hub = Arc::new(Hub::new(64));
    let worker = Arc::new(IngestWorker::new(hub.clone()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(server::serve_http(
        hub.clone(),
        worker.clone(),
        listener,
        server::HttpConfig::default(),
    ));

    let relay = Relay::<StreamMessage>::with_connector(local_connector());
    let (seen, _subscription) = collect(&relay);
    relay.connect(&format!("http://{}/events", addr));
    eventually(|| hub.active_connections() == 1).await;

    let mut events: Vec<String> = (0..50)
        .map(|i| {
            format!(
                r#"{{"timestamp":"2024-01-30T10:45:{:02}Z","type":"latency","value":{}}}"#,
                i % 60,
                100 + i % 5
            )
        })
        .collect();
    events.push(
        r#"{"timestamp":"2024-01-30T10:46:00Z","type":"latency","value":900,"metadata":{"location":"us-east"}}"#
            .to_string(),
    );
    let body = format!(r#"{{"events":[{}]}}"#, events.join(","));

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let response = client
        .post(format!("http://{}/ingest", addr))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    eventually(|| {
        seen.lock()
            .iter()
            .any(|m| matches!(m, StreamMessage::AnomalyAlert(e) if e.location == "us-east"))
    })
    .await;
    assert_eq!(worker.stats().processed_count, 51);
    server.abort();
}
