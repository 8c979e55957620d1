//! End-to-end relay tests over real WebSocket connections.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use sync_relay::config::Config;
use sync_relay::{CompactionOutcome, RelayServer, RunningRelay};
use sync_types::PatchBatch;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ADD_G1: &str = r#"[{"op":"add","path":["gifts","g1"],"value":{"id":"g1","description":"Mug","image":"x.png","reservedBy":null}}]"#;

fn add_frame(i: usize) -> String {
    format!(
        r#"[{{"op":"add","path":["gifts","g{i}"],"value":{{"id":"g{i}","description":"Gift {i}","image":"x.png","reservedBy":null}}}}]"#
    )
}

async fn start_relay() -> RunningRelay {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".into();
    config.server.port = 0;
    // Cycles are driven by hand in these tests
    config.compaction.enabled = false;
    RelayServer::start(config).await.unwrap()
}

/// Connect and consume the join snapshot.
async fn join(relay: &RunningRelay) -> (Ws, String) {
    let (mut ws, _) = connect_async(relay.ws_url()).await.unwrap();
    let snapshot = next_text(&mut ws).await.expect("join snapshot");
    (ws, snapshot)
}

async fn next_text(ws: &mut Ws) -> Option<String> {
    loop {
        match timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(text),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

async fn nothing_arrives(ws: &mut Ws) -> bool {
    timeout(Duration::from_millis(200), ws.next()).await.is_err()
}

async fn wait_for_connections(relay: &RunningRelay, n: usize) {
    for _ in 0..100 {
        if relay.relay().connection_count().await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} connections");
}

#[tokio::test]
async fn first_client_gets_empty_snapshot() {
    let relay = start_relay().await;
    let (_ws, snapshot) = join(&relay).await;
    assert_eq!(snapshot, "[]");
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn broadcast_reaches_everyone_but_sender() {
    let relay = start_relay().await;
    let (mut c1, _) = join(&relay).await;
    let (mut c2, _) = join(&relay).await;
    let (mut c3, _) = join(&relay).await;

    c1.send(Message::Text(ADD_G1.to_string())).await.unwrap();

    assert_eq!(next_text(&mut c2).await.as_deref(), Some(ADD_G1));
    assert_eq!(next_text(&mut c3).await.as_deref(), Some(ADD_G1));
    assert!(nothing_arrives(&mut c1).await);
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn closing_one_receiver_does_not_block_others() {
    let relay = start_relay().await;
    let (mut c1, _) = join(&relay).await;
    let (mut c2, _) = join(&relay).await;
    let (mut c3, _) = join(&relay).await;

    c2.close(None).await.unwrap();
    c1.send(Message::Text(ADD_G1.to_string())).await.unwrap();

    assert_eq!(next_text(&mut c3).await.as_deref(), Some(ADD_G1));
    wait_for_connections(&relay, 2).await;
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn receiver_dying_mid_broadcast_does_not_stall_others() {
    let relay = start_relay().await;
    let (mut c1, _) = join(&relay).await;
    let (mut c2, _) = join(&relay).await;
    let (mut c3, _) = join(&relay).await;
    let frames: Vec<String> = (0..50).map(add_frame).collect();

    let sender = {
        let frames = frames.clone();
        tokio::spawn(async move {
            for frame in frames {
                c1.send(Message::Text(frame)).await.unwrap();
            }
            c1
        })
    };

    // c2 vanishes without a close handshake after the first batch
    assert_eq!(next_text(&mut c2).await.as_deref(), Some(frames[0].as_str()));
    drop(c2);

    for expected in &frames {
        assert_eq!(next_text(&mut c3).await.as_deref(), Some(expected.as_str()));
    }
    let _c1 = sender.await.unwrap();
    wait_for_connections(&relay, 2).await;
    assert_eq!(relay.relay().log_size().await, (50, 50));
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn late_joiner_receives_history() {
    let relay = start_relay().await;
    let (mut c1, _) = join(&relay).await;
    let (mut c2, _) = join(&relay).await;

    c1.send(Message::Text(ADD_G1.to_string())).await.unwrap();
    // c2 seeing it means the batch is in the log
    next_text(&mut c2).await.unwrap();

    let (_c3, snapshot) = join(&relay).await;
    let batch = PatchBatch::from_json(&snapshot).unwrap();
    assert_eq!(batch, PatchBatch::from_json(ADD_G1).unwrap());
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_batch_keeps_connection_open() {
    let relay = start_relay().await;
    let (mut c1, _) = join(&relay).await;
    let (mut c2, _) = join(&relay).await;

    c1.send(Message::Text("{not a batch".into())).await.unwrap();
    c1.send(Message::Text("[]".into())).await.unwrap();
    c1.send(Message::Text(ADD_G1.to_string())).await.unwrap();

    // Only the valid batch is relayed, and c1 is still connected
    assert_eq!(next_text(&mut c2).await.as_deref(), Some(ADD_G1));
    assert!(nothing_arrives(&mut c2).await);
    assert_eq!(relay.relay().connection_count().await, 2);
    assert_eq!(relay.relay().log_size().await, (1, 1));
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn binary_frames_are_accepted_as_json() {
    let relay = start_relay().await;
    let (mut c1, _) = join(&relay).await;
    let (mut c2, _) = join(&relay).await;

    c1.send(Message::Binary(ADD_G1.as_bytes().to_vec()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut c2).await.as_deref(), Some(ADD_G1));
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn compacted_log_is_what_joiners_see() {
    let relay = start_relay().await;
    let (mut c1, _) = join(&relay).await;
    let (mut c2, _) = join(&relay).await;

    for i in 0..5 {
        c1.send(Message::Text(add_frame(i))).await.unwrap();
        next_text(&mut c2).await.unwrap();
    }

    let outcome = relay.compactor().compact_now().await.unwrap();
    assert_eq!(outcome, CompactionOutcome::Compacted { before: 5, after: 1 });

    let (_c3, snapshot) = join(&relay).await;
    assert_eq!(PatchBatch::from_json(&snapshot).unwrap().len(), 5);
    relay.stop().await.unwrap();
}

#[tokio::test]
async fn health_endpoint_is_served_on_relay_port() {
    let relay = start_relay().await;
    let (_ws, _) = join(&relay).await;

    let mut stream = TcpStream::connect(relay.local_addr()).await.unwrap();
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"connections\":1"));
    relay.stop().await.unwrap();
}
