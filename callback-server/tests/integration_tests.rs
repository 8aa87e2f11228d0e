//! Integration tests for the dispatch server.
//!
//! These tests start a real HTTP server, send actual HTTP requests,
//! and verify end-to-end functionality.

use callback_server::{
    CallbackServerConfig, DispatchFailure, DispatchServer, EventNotification, FailureKind,
    ServerState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

const LAST_CHANGE_BODY: &str = r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
    <e:property>
        <LastChange>&lt;Event xmlns=&quot;urn:schemas-upnp-org:metadata-1-0/RCS/&quot;&gt;&lt;InstanceID val=&quot;0&quot;&gt;&lt;Volume channel=&quot;Master&quot; val=&quot;24&quot;/&gt;&lt;Mute channel=&quot;Master&quot; val=&quot;0&quot;/&gt;&lt;/InstanceID&gt;&lt;/Event&gt;</LastChange>
    </e:property>
</e:propertyset>"#;

fn notify_method() -> reqwest::Method {
    reqwest::Method::from_bytes(b"NOTIFY").expect("valid method")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("callback_server=debug")
        .try_init();
}

async fn started_server(
    range: (u16, u16),
) -> (DispatchServer, mpsc::UnboundedReceiver<DispatchFailure>) {
    init_tracing();
    let (failure_tx, failure_rx) = mpsc::unbounded_channel();
    let config = CallbackServerConfig::loopback().with_port_range(range.0, range.1);
    let mut server = DispatchServer::new(config, failure_tx).expect("Failed to create server");
    server.start().await.expect("Failed to start server");
    (server, failure_rx)
}

/// A notification is parsed and delivered to the handler registered on its path.
#[tokio::test]
async fn test_notification_end_to_end() {
    let (mut server, mut failures) = started_server((51000, 51100)).await;
    let (tx, mut rx) = mpsc::unbounded_channel::<EventNotification>();
    server.register_event_handler("/events/rcs", tx).await;

    let client = reqwest::Client::new();
    let response = client
        .request(notify_method(), server.url_for("/events/rcs"))
        .header("SID", "uuid:sub-rcs")
        .header("SEQ", "4")
        .header("NT", "upnp:event")
        .header("NTS", "upnp:propchange")
        .header("Content-Type", "text/xml")
        .body(LAST_CHANGE_BODY)
        .send()
        .await
        .expect("Failed to send HTTP request");

    assert_eq!(response.status(), 200);

    let notification = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("Timeout waiting for notification")
        .expect("No notification received");

    assert_eq!(notification.path, "/events/rcs");
    assert_eq!(notification.sid, "uuid:sub-rcs");
    assert_eq!(notification.seq, Some(4));
    assert_eq!(notification.changes.len(), 1);
    let instance = &notification.changes[0];
    assert_eq!(instance.instance_id, 0);
    assert_eq!(instance.property("Volume").and_then(|p| p.value()), Some("24"));
    assert_eq!(instance.property("Volume").and_then(|p| p.attribute("channel")), Some("Master"));
    assert!(notification.property_set.get("LastChange").is_some());

    assert!(failures.try_recv().is_err());
    server.stop().await;
}

/// An unregistered path is answered with 404, reported once, and the
/// server keeps serving afterwards.
#[tokio::test]
async fn test_unregistered_path_reports_unhandled() {
    let (mut server, mut failures) = started_server((51100, 51200)).await;
    let (tx, mut rx) = mpsc::unbounded_channel::<EventNotification>();
    server.register_event_handler("/events/known", tx).await;

    let client = reqwest::Client::new();
    let response = client
        .get(server.url_for("/nothing/here"))
        .send()
        .await
        .expect("Failed to connect to server");
    assert_eq!(response.status(), 404);

    let failure = timeout(Duration::from_secs(1), failures.recv())
        .await
        .expect("Timeout waiting for failure")
        .expect("No failure received");
    assert_eq!(failure.kind, FailureKind::Unhandled);
    assert!(!failure.kind.is_listener_level());
    let request = failure.request.expect("request summary");
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/nothing/here");

    let response = client
        .request(notify_method(), server.url_for("/events/known"))
        .header("SID", "uuid:sub-known")
        .body(LAST_CHANGE_BODY)
        .send()
        .await
        .expect("Failed to send HTTP request");
    assert_eq!(response.status(), 200);
    assert!(timeout(Duration::from_secs(1), rx.recv()).await.is_ok());

    assert!(failures.try_recv().is_err(), "exactly one failure expected");
    server.stop().await;
}

/// Invalid GENA headers and unparsable bodies are rejected and reported.
#[tokio::test]
async fn test_malformed_notifications() {
    let (mut server, mut failures) = started_server((51200, 51300)).await;
    let (tx, mut rx) = mpsc::unbounded_channel::<EventNotification>();
    server.register_event_handler("/events/bad", tx).await;
    let url = server.url_for("/events/bad");
    let client = reqwest::Client::new();

    // 1. Missing SID
    let response = client
        .request(notify_method(), &url)
        .body(LAST_CHANGE_BODY)
        .send()
        .await
        .expect("Failed to send request without SID");
    assert_eq!(response.status(), 400);

    // 2. Invalid NT header value
    let response = client
        .request(notify_method(), &url)
        .header("SID", "uuid:x")
        .header("NT", "invalid-value")
        .body(LAST_CHANGE_BODY)
        .send()
        .await
        .expect("Failed to send request with invalid NT");
    assert_eq!(response.status(), 400);

    // 3. Body that is not a property set
    let response = client
        .request(notify_method(), &url)
        .header("SID", "uuid:x")
        .body("<event>test</event>")
        .send()
        .await
        .expect("Failed to send request with bad body");
    assert_eq!(response.status(), 400);

    for _ in 0..3 {
        let failure = timeout(Duration::from_secs(1), failures.recv())
            .await
            .expect("Timeout waiting for failure")
            .expect("No failure received");
        assert_eq!(failure.kind, FailureKind::EventAnalyzeFailed);
    }

    let no_notification = timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(no_notification.is_err(), "Should not receive notifications for malformed requests");

    server.stop().await;
}

/// Open-ended ranges are answered with 206 and the remainder of the file.
#[tokio::test]
async fn test_media_range_requests() {
    let (mut server, mut failures) = started_server((51300, 51400)).await;

    let dir = tempfile::tempdir().expect("temp dir");
    let file = dir.path().join("track.flac");
    let content: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&file, &content).expect("write media file");

    let url = server.add_media(&file).await.expect("publish media");
    assert!(url.starts_with(&format!("{}/media/", server.base_url())));
    assert!(url.ends_with(".flac"));
    assert_eq!(server.add_media(&file).await.expect("publish again"), url);

    let client = reqwest::Client::new();

    let response = client
        .get(&url)
        .header("Range", "bytes=100-")
        .send()
        .await
        .expect("ranged GET");
    assert_eq!(response.status(), 206);
    assert_eq!(response.headers()["content-range"], "bytes 100-999/1000");
    assert_eq!(response.headers()["content-length"], "900");
    assert_eq!(response.headers()["content-type"], "audio/flac");
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert_eq!(response.headers()["transfermode.dlna.org"], "Streaming");
    assert!(response.headers().contains_key("contentfeatures.dlna.org"));
    let body = response.bytes().await.expect("ranged body");
    assert_eq!(body.len(), 900);
    assert_eq!(&body[..], &content[100..]);

    let response = client.get(&url).send().await.expect("full GET");
    assert_eq!(response.status(), 200);
    assert_eq!(response.bytes().await.expect("full body").len(), 1000);

    let response = client
        .get(&url)
        .header("Range", "bytes=1000-")
        .send()
        .await
        .expect("unsatisfiable GET");
    assert_eq!(response.status(), 416);
    assert_eq!(response.headers()["content-range"], "bytes */1000");

    let response = client.head(&url).send().await.expect("HEAD");
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-length"], "1000");

    assert!(failures.try_recv().is_err());

    assert!(server.remove_media(&url).await);
    let response = client.get(&url).send().await.expect("GET after removal");
    assert_eq!(response.status(), 404);

    server.stop().await;
}

#[tokio::test]
async fn test_add_missing_media_fails() {
    let (mut server, _failures) = started_server((51400, 51500)).await;
    assert!(server.add_media("/definitely/not/a/file.mp3").await.is_err());
    server.stop().await;
}

/// Handler N+1 does not start before handler N has returned.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requests_are_handled_one_at_a_time() {
    let (mut server, _failures) = started_server((51500, 51600)).await;

    let spans: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&spans);
    server
        .register_event_handler("/events/slow", move |_n: EventNotification| {
            let started = Instant::now();
            std::thread::sleep(Duration::from_millis(100));
            recorded.lock().unwrap().push((started, Instant::now()));
        })
        .await;

    let client = reqwest::Client::new();
    let url = server.url_for("/events/slow");
    let handles: Vec<_> = (0..3)
        .map(|i| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move {
                client
                    .request(notify_method(), url)
                    .header("SID", format!("uuid:sub-{i}"))
                    .body(LAST_CHANGE_BODY)
                    .send()
                    .await
            })
        })
        .collect();

    for handle in handles {
        let response = handle.await.expect("Task failed").expect("HTTP request failed");
        assert_eq!(response.status(), 200);
    }

    let mut spans = spans.lock().unwrap().clone();
    assert_eq!(spans.len(), 3);
    spans.sort_by_key(|(start, _)| *start);
    for pair in spans.windows(2) {
        assert!(pair[1].0 >= pair[0].1, "handlers overlapped");
    }

    server.stop().await;
}

/// Registration changes take effect for the next request.
#[tokio::test]
async fn test_dynamic_registration() {
    let (mut server, mut failures) = started_server((51600, 51700)).await;
    let client = reqwest::Client::new();
    let url = server.url_for("/events/dynamic");

    let response = client
        .request(notify_method(), &url)
        .header("SID", "uuid:dyn")
        .body(LAST_CHANGE_BODY)
        .send()
        .await
        .expect("Failed to send HTTP request");
    assert_eq!(response.status(), 404);
    assert_eq!(failures.recv().await.expect("failure").kind, FailureKind::Unhandled);

    let (tx, mut rx) = mpsc::unbounded_channel::<EventNotification>();
    server.register_event_handler("/events/dynamic", tx).await;

    let response = client
        .request(notify_method(), &url)
        .header("SID", "uuid:dyn")
        .body(LAST_CHANGE_BODY)
        .send()
        .await
        .expect("Failed to send HTTP request");
    assert_eq!(response.status(), 200);
    assert!(timeout(Duration::from_secs(1), rx.recv()).await.is_ok());

    assert!(server.unregister_event_handler("/events/dynamic").await);
    let response = client
        .request(notify_method(), &url)
        .header("SID", "uuid:dyn")
        .body(LAST_CHANGE_BODY)
        .send()
        .await
        .expect("Failed to send HTTP request");
    assert_eq!(response.status(), 404);

    server.stop().await;
}

/// After stop and abort nothing is listening; a restart serves again.
#[tokio::test]
async fn test_stop_abort_restart() {
    let (mut server, mut failures) = started_server((51700, 51800)).await;
    // No pooled connections may outlive a listener
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .expect("client");
    let url = server.url_for("/anything");

    server.stop().await;
    assert_eq!(server.state(), ServerState::Stopped);
    assert!(client.get(&url).send().await.is_err());

    server.start().await.expect("restart after stop");
    assert_eq!(client.get(&url).send().await.expect("served").status(), 404);

    server.abort();
    assert_eq!(server.state(), ServerState::Aborted);

    server.start().await.expect("restart after abort");
    assert_eq!(client.get(&url).send().await.expect("served").status(), 404);
    server.stop().await;

    while let Ok(failure) = failures.try_recv() {
        assert!(!failure.kind.is_listener_level(), "unexpected {failure}");
    }
}

/// A handler that panics gets a 500 and one failure report; the server keeps
/// dispatching to it afterwards.
#[tokio::test]
async fn test_panicking_handler_reports_failure() {
    let (mut server, mut failures) = started_server((51800, 51900)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    server
        .register_event_handler("/events/fragile", move |n: EventNotification| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("cannot handle {}", n.sid);
            }
        })
        .await;

    let client = reqwest::Client::new();
    let url = server.url_for("/events/fragile");
    let send = |sid: &'static str| {
        client
            .request(notify_method(), &url)
            .header("SID", sid)
            .body(LAST_CHANGE_BODY)
            .send()
    };

    let response = send("uuid:first").await.expect("first NOTIFY");
    assert_eq!(response.status(), 500);

    let failure = timeout(Duration::from_secs(1), failures.recv())
        .await
        .expect("Timeout waiting for failure")
        .expect("No failure received");
    assert_eq!(failure.kind, FailureKind::HandlerFailed);
    assert!(failure.error.contains("cannot handle uuid:first"), "{}", failure.error);
    assert_eq!(failure.request.expect("request summary").path, "/events/fragile");

    let response = send("uuid:second").await.expect("second NOTIFY");
    assert_eq!(response.status(), 200);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(failures.try_recv().is_err(), "exactly one failure expected");

    server.stop().await;
}

/// A request whose body ends early is reported against its path.
#[tokio::test]
async fn test_truncated_body_is_reported() {
    use tokio::io::AsyncWriteExt;

    let (mut server, mut failures) = started_server((51900, 52000)).await;
    let (tx, mut rx) = mpsc::unbounded_channel::<EventNotification>();
    server.register_event_handler("/events/cut", tx).await;

    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", server.port()))
        .await
        .expect("connect");
    let request = "NOTIFY /events/cut HTTP/1.1\r\n\
                   Host: 127.0.0.1\r\n\
                   SID: uuid:cut\r\n\
                   Content-Length: 500\r\n\
                   \r\n\
                   <e:propertyset";
    stream.write_all(request.as_bytes()).await.expect("write request");
    stream.shutdown().await.expect("close write half");

    let failure = timeout(Duration::from_secs(2), failures.recv())
        .await
        .expect("Timeout waiting for failure")
        .expect("No failure received");
    assert_eq!(failure.kind, FailureKind::Unhandled);
    assert!(failure.error.contains("could not be read"), "{}", failure.error);
    let request = failure.request.expect("request summary");
    assert_eq!(request.method, "NOTIFY");
    assert_eq!(request.path, "/events/cut");

    assert!(rx.try_recv().is_err());
    server.stop().await;
}

/// A published file that disappears from disk is answered with 404 and
/// reported once as a media transport failure.
#[tokio::test]
async fn test_deleted_media_reports_transport_failure() {
    let (mut server, mut failures) = started_server((52000, 52100)).await;

    let dir = tempfile::tempdir().expect("temp dir");
    let file = dir.path().join("gone.mp3");
    std::fs::write(&file, vec![1u8; 64]).expect("write media file");
    let url = server.add_media(&file).await.expect("publish media");
    std::fs::remove_file(&file).expect("delete media file");

    let response = reqwest::get(&url).await.expect("GET deleted media");
    assert_eq!(response.status(), 404);

    let failure = timeout(Duration::from_secs(1), failures.recv())
        .await
        .expect("Timeout waiting for failure")
        .expect("No failure received");
    assert_eq!(failure.kind, FailureKind::MediaTransportFailed);
    assert!(failure.error.contains("gone.mp3"), "{}", failure.error);
    assert_eq!(failure.request.expect("request summary").method, "GET");
    assert!(failures.try_recv().is_err(), "exactly one failure expected");

    server.stop().await;
}

/// A NOTIFY arriving while a media body is still streaming is not handled
/// until the media response has been read to the end.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_media_stream_holds_back_notify() {
    let (mut server, mut failures) = started_server((52100, 52200)).await;

    // Larger than the socket buffers, so the stream cannot finish unread
    const LEN: usize = 32 * 1024 * 1024;
    let dir = tempfile::tempdir().expect("temp dir");
    let file = dir.path().join("long.wav");
    std::fs::write(&file, vec![0u8; LEN]).expect("write media file");
    let media_url = server.add_media(&file).await.expect("publish media");

    let (tx, mut rx) = mpsc::unbounded_channel::<EventNotification>();
    server.register_event_handler("/events/waiting", tx).await;

    let mut media = reqwest::get(&media_url).await.expect("GET media");
    assert_eq!(media.status(), 200);
    let mut received = media
        .chunk()
        .await
        .expect("first chunk")
        .map_or(0, |chunk| chunk.len());

    let notify_url = server.url_for("/events/waiting");
    let notify = tokio::spawn(async move {
        reqwest::Client::new()
            .request(notify_method(), notify_url)
            .header("SID", "uuid:waiting")
            .body(LAST_CHANGE_BODY)
            .send()
            .await
    });

    let early = timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(early.is_err(), "NOTIFY handled while media was streaming");

    while let Some(chunk) = media.chunk().await.expect("media chunk") {
        received += chunk.len();
    }
    assert_eq!(received, LEN);

    let notification = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Timeout waiting for notification")
        .expect("No notification received");
    assert_eq!(notification.sid, "uuid:waiting");
    let response = notify.await.expect("Task failed").expect("HTTP request failed");
    assert_eq!(response.status(), 200);

    assert!(failures.try_recv().is_err());
    server.stop().await;
}
